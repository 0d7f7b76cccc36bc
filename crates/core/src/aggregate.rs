//! Event-level rollup of stored metric rows.
//!
//! [`summarize`] is pure: the pipeline loads the event's uploads and metric
//! rows and hands them over, which keeps the ordering rules testable without
//! a database.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::registry::{Registry, METRIC_BOSS_DPS, METRIC_DEATHS, METRIC_DOWNS, METRIC_RESURRECTS};
use crate::types::{DbId, Timestamp};

/// The upload columns the rollup needs.
#[derive(Debug, Clone)]
pub struct UploadFact {
    pub id: DbId,
    pub boss_id: i64,
    pub boss_name: String,
    pub success: bool,
    pub created_at: Timestamp,
}

/// One stored metric row.
#[derive(Debug, Clone)]
pub struct MetricFact {
    pub upload_id: DbId,
    pub actor: String,
    pub metric_key: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorTotal {
    pub actor: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopDps {
    pub boss_id: i64,
    pub boss_name: String,
    pub upload_id: DbId,
    pub actor: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MechanicTotals {
    pub metric_key: String,
    pub label: String,
    pub actors: Vec<ActorTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterMechanicTotals {
    pub encounter: String,
    pub mechanics: Vec<MechanicTotals>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub event_name: String,
    pub uploads: usize,
    pub downs: Vec<ActorTotal>,
    pub deaths: Vec<ActorTotal>,
    pub resurrects: Vec<ActorTotal>,
    pub top_dps: Vec<TopDps>,
    pub mechanics: Vec<EncounterMechanicTotals>,
}

/// Roll up an event.
///
/// - Downs, deaths and resurrects are summed over every upload, failed
///   attempts included.
/// - Top DPS comes only from the first successful upload (by creation time)
///   of each `(boss_id, boss_name)`.
/// - Mechanics are summed over every upload whose encounter has registry
///   entries, grouped by encounter, then metric label, then actor.
pub fn summarize(
    event_name: &str,
    uploads: &[UploadFact],
    metrics: &[MetricFact],
    registry: &Registry,
) -> EventSummary {
    let mut ordered: Vec<&UploadFact> = uploads.iter().collect();
    ordered.sort_by_key(|u| (u.created_at, u.id));

    let mut by_upload: HashMap<DbId, Vec<&MetricFact>> = HashMap::new();
    for metric in metrics {
        by_upload.entry(metric.upload_id).or_default().push(metric);
    }
    let rows_of = |id: DbId| by_upload.get(&id).map(Vec::as_slice).unwrap_or(&[]);

    let mut downs = HashMap::new();
    let mut deaths = HashMap::new();
    let mut resurrects = HashMap::new();
    let mut mechanics: BTreeMap<String, BTreeMap<String, HashMap<String, f64>>> = BTreeMap::new();

    for upload in &ordered {
        let wanted: HashSet<&str> = registry
            .specs_for(&upload.boss_name)
            .map(|spec| spec.key.as_str())
            .collect();
        for row in rows_of(upload.id) {
            let totals = match row.metric_key.as_str() {
                METRIC_DOWNS => &mut downs,
                METRIC_DEATHS => &mut deaths,
                METRIC_RESURRECTS => &mut resurrects,
                key if wanted.contains(key) => mechanics
                    .entry(upload.boss_name.clone())
                    .or_default()
                    .entry(row.metric_key.clone())
                    .or_default(),
                _ => continue,
            };
            *totals.entry(row.actor.clone()).or_insert(0.0) += row.value;
        }
    }

    let mut seen_bosses = HashSet::new();
    let mut top_dps = Vec::new();
    for upload in ordered.iter().filter(|u| u.success) {
        if !seen_bosses.insert((upload.boss_id, upload.boss_name.as_str())) {
            continue;
        }
        let best = rows_of(upload.id)
            .iter()
            .filter(|row| row.metric_key == METRIC_BOSS_DPS)
            .min_by(|a, b| by_value_desc(a.value, &a.actor, b.value, &b.actor));
        if let Some(best) = best {
            top_dps.push(TopDps {
                boss_id: upload.boss_id,
                boss_name: upload.boss_name.clone(),
                upload_id: upload.id,
                actor: best.actor.clone(),
                value: best.value,
            });
        }
    }

    let mechanics = mechanics
        .into_iter()
        .map(|(encounter, per_key)| {
            let mut totals: Vec<MechanicTotals> = per_key
                .into_iter()
                .map(|(metric_key, actors)| MechanicTotals {
                    label: registry
                        .label_for(&metric_key)
                        .unwrap_or(&metric_key)
                        .to_string(),
                    metric_key,
                    actors: sorted_totals(actors),
                })
                .collect();
            totals.sort_by(|a, b| {
                let sum = |m: &MechanicTotals| m.actors.iter().map(|t| t.value).sum::<f64>();
                sum(b).total_cmp(&sum(a)).then_with(|| a.label.cmp(&b.label))
            });
            EncounterMechanicTotals {
                encounter,
                mechanics: totals,
            }
        })
        .collect();

    EventSummary {
        event_name: event_name.to_string(),
        uploads: uploads.len(),
        downs: sorted_totals(downs),
        deaths: sorted_totals(deaths),
        resurrects: sorted_totals(resurrects),
        top_dps,
        mechanics,
    }
}

/// Value descending, then actor ascending ignoring case.
fn by_value_desc(a_value: f64, a_actor: &str, b_value: f64, b_actor: &str) -> Ordering {
    b_value
        .total_cmp(&a_value)
        .then_with(|| a_actor.to_lowercase().cmp(&b_actor.to_lowercase()))
}

fn sorted_totals(totals: HashMap<String, f64>) -> Vec<ActorTotal> {
    let mut out: Vec<ActorTotal> = totals
        .into_iter()
        .map(|(actor, value)| ActorTotal { actor, value })
        .collect();
    out.sort_by(|a, b| by_value_desc(a.value, &a.actor, b.value, &b.actor));
    out
}
