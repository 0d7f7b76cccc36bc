use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use raidlog_dpsreport::{DpsReportApi, LogUploader, Normalizer};
use raidlog_pipeline::{Enricher, PipelineConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::{Cli, Command};
use commands::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = raidlog_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    raidlog_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    raidlog_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let registry = Arc::new(config.load_registry()?);
    let normalizer = Normalizer::new(config.dps_report_base_url.clone())?;
    let uploader: Arc<dyn LogUploader> = Arc::new(DpsReportApi::new(
        config.upload_url.clone(),
        config.upload_timeout,
    )?);
    let enricher = Arc::new(Enricher::new(pool.clone(), normalizer, registry));

    let ctx = Context {
        pool,
        config,
        uploader,
        enricher,
    };

    match cli.command {
        Command::Run => commands::run(&ctx).await,
        Command::Watch(args) => commands::watch(&ctx, args).await,
        Command::Ingest { event, items } => commands::ingest(&ctx, &event, &items).await,
        Command::Recompute { event } => commands::recompute(&ctx, &event).await,
        Command::Summary { event } => commands::summary(&ctx, &event).await,
    }
}

/// `RUST_LOG` filters; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "raidlog_worker=info,raidlog_pipeline=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
