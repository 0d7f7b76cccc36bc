//! Subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use raidlog_core::window::EventWindow;
use raidlog_db::DbPool;
use raidlog_dpsreport::permalink::is_http_url;
use raidlog_dpsreport::{LogUploader, Normalizer, Payload};
use raidlog_pipeline::aggregate::aggregate;
use raidlog_pipeline::ingest::{record_upload, upload_with_timeout, UploadSource};
use raidlog_pipeline::session::{is_log_file, scan};
use raidlog_pipeline::{Enricher, PipelineConfig, RetryQueue, WatchSession};
use tokio_util::sync::CancellationToken;

use crate::cli::WatchArgs;

/// Everything the subcommands share.
pub struct Context {
    pub pool: DbPool,
    pub config: PipelineConfig,
    pub uploader: Arc<dyn LogUploader>,
    pub enricher: Arc<Enricher>,
}

impl Context {
    fn retry_queue(&self) -> Arc<RetryQueue> {
        Arc::new(RetryQueue::new(
            self.pool.clone(),
            Arc::clone(&self.uploader),
            Arc::clone(&self.enricher),
            self.config.queue_config(),
        ))
    }
}

pub async fn run(ctx: &Context) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let queue = ctx.retry_queue();
    let queue_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };

    shutdown_signal().await;
    cancel.cancel();
    queue_handle.await.context("Retry queue task failed")?;
    tracing::info!("Shutdown complete");
    Ok(())
}

pub async fn watch(ctx: &Context, args: WatchArgs) -> anyhow::Result<()> {
    let root = args
        .dir
        .or_else(|| ctx.config.log_dir.clone())
        .context("No log directory: pass --dir or set LOG_DIR")?;
    let window = EventWindow::new(args.start, args.end)?;

    let cancel = CancellationToken::new();
    let queue = ctx.retry_queue();
    let queue_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { queue.run(cancel).await })
    };

    let mut session = WatchSession::new(
        args.event.clone(),
        root,
        window,
        ctx.config.session_config(),
        Arc::clone(&ctx.uploader),
        Arc::clone(&ctx.enricher),
    );
    if let Some(channel) = args.channel {
        session = session.with_channel(channel);
    }
    let handle = session.spawn_with_token(cancel.child_token());
    let mut session_task = tokio::spawn(handle.wait());

    let joined = tokio::select! {
        () = shutdown_signal() => {
            cancel.cancel();
            (&mut session_task).await
        }
        joined = &mut session_task => joined,
    };
    let results = joined.context("Watch session task failed")?;

    cancel.cancel();
    queue_handle.await.context("Retry queue task failed")?;

    println!("{}: uploaded {} log(s)", args.event, results.len());
    Ok(())
}

/// One unit of `ingest` work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestItem {
    Permalink(String),
    LogFile(PathBuf),
}

/// Classify the command-line items, expanding directories into the log
/// files below them. Anything else is skipped with a warning.
pub fn expand_items(items: &[String]) -> Vec<IngestItem> {
    let mut expanded = Vec::new();
    for item in items {
        let item = item.trim();
        if is_http_url(item) {
            expanded.push(IngestItem::Permalink(item.to_string()));
            continue;
        }

        let path = Path::new(item);
        if path.is_dir() {
            let mut files: Vec<PathBuf> = scan(path).into_iter().map(|obs| obs.path).collect();
            files.sort();
            expanded.extend(files.into_iter().map(IngestItem::LogFile));
        } else if path.is_file() && is_log_file(path) {
            expanded.push(IngestItem::LogFile(path.to_path_buf()));
        } else {
            tracing::warn!(item, "Not a permalink, log file or directory; skipping");
        }
    }
    expanded
}

pub async fn ingest(ctx: &Context, event: &str, items: &[String]) -> anyhow::Result<()> {
    let work = expand_items(items);
    let normalizer = Normalizer::new(ctx.config.dps_report_base_url.clone())?;
    let mut ingested = 0;

    for item in &work {
        let outcome = match item {
            IngestItem::Permalink(url) => ingest_permalink(ctx, &normalizer, event, url).await,
            IngestItem::LogFile(path) => ingest_file(ctx, event, path).await,
        };
        match outcome {
            Ok(()) => ingested += 1,
            Err(e) => tracing::warn!(event, item = ?item, error = %e, "Ingest failed"),
        }
    }

    println!("{ingested}/{} ingested", work.len());
    Ok(())
}

async fn ingest_permalink(
    ctx: &Context,
    normalizer: &Normalizer,
    event: &str,
    url: &str,
) -> anyhow::Result<()> {
    let report = normalizer.normalize(Payload::Reference(url.to_string())).await?;
    record_upload(
        &ctx.enricher,
        event,
        &UploadSource::Permalink(url.to_string()),
        &report,
    )
    .await?;
    Ok(())
}

async fn ingest_file(ctx: &Context, event: &str, path: &Path) -> anyhow::Result<()> {
    let response =
        upload_with_timeout(ctx.uploader.as_ref(), path, ctx.config.attempt_timeout).await?;
    record_upload(
        &ctx.enricher,
        event,
        &UploadSource::File(path.to_path_buf()),
        &response,
    )
    .await?;
    Ok(())
}

pub async fn recompute(ctx: &Context, event: &str) -> anyhow::Result<()> {
    let (deleted, repaired) = ctx.enricher.recompute_event(event).await?;
    println!("{event}: deleted {deleted} metric row(s), re-enriched {repaired} upload(s)");
    Ok(())
}

pub async fn summary(ctx: &Context, event: &str) -> anyhow::Result<()> {
    ctx.enricher.ensure_enriched(event).await?;
    let summary = aggregate(&ctx.pool, ctx.enricher.registry(), event).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
