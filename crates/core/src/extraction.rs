//! Per-upload metric extraction.
//!
//! [`extract`] turns one structured encounter report into flat
//! `(actor, metric_key, value)` rows: the global per-player metrics for
//! every report, plus the registry mechanics of the matching encounter.
//!
//! A mechanic is counted by the first tier that yields anything, in order:
//! collapsed occurrences (only for [`CountMode::Collapsed`]), per-hit
//! records with cross-entry dedup, aggregated per-player counts, and the
//! legacy top-level log containers.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::matching::{AliasMatcher, MechanicNames};
use crate::registry::{
    CountMode, MechanicSpec, Registry, METRIC_BOSS_DPS, METRIC_DEATHS, METRIC_DOWNS,
    METRIC_RESURRECTS,
};
use crate::report::{as_integer, first_str, timestamp_ms, Report, UNKNOWN_ENCOUNTER};

/// Legacy containers holding a flat list of log records.
const LEGACY_LIST_KEYS: [&str; 5] = [
    "mechanicLogs",
    "mechanicsLogs",
    "mechanicsLog",
    "mechanicsEvents",
    "mechLogs",
];

/// Legacy containers holding a map of record lists.
const LEGACY_MAP_KEYS: [&str; 3] = ["mechanicLogsById", "mechanicsById", "mechData"];

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub actor: String,
    pub metric_key: String,
    pub value: f64,
}

impl MetricRow {
    fn new(actor: &str, metric_key: &str, value: f64) -> Self {
        Self {
            actor: actor.to_string(),
            metric_key: metric_key.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub boss_name: String,
    pub rows: Vec<MetricRow>,
}

/// Which counting strategy produced a mechanic's counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountTier {
    Collapsed,
    PerHit,
    Aggregated,
    LegacyLogs,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MechanicCount {
    pub tier: CountTier,
    pub per_actor: BTreeMap<String, i64>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Extract every metric row for one report.
///
/// Never fails: a value that is not an object, or a report missing whole
/// sections, simply yields fewer rows.
pub fn extract(report: &Value, registry: &Registry) -> Extraction {
    let Some(report) = Report::new(report) else {
        return Extraction {
            boss_name: UNKNOWN_ENCOUNTER.to_string(),
            rows: Vec::new(),
        };
    };

    let boss_name = report.boss_name();
    let mut rows = Vec::new();

    for player in report.players() {
        let actor = player.actor_label();
        rows.push(MetricRow::new(&actor, METRIC_DOWNS, player.downs() as f64));
        rows.push(MetricRow::new(&actor, METRIC_DEATHS, player.deaths() as f64));
        rows.push(MetricRow::new(
            &actor,
            METRIC_RESURRECTS,
            player.resurrects() as f64,
        ));
        rows.push(MetricRow::new(&actor, METRIC_BOSS_DPS, player.boss_dps()));
    }

    let roster = Roster::from_report(&report);
    for spec in registry.specs_for(&boss_name) {
        let Some(count) = count_mechanic(&report, &roster, spec) else {
            continue;
        };
        for (actor, value) in count.per_actor {
            rows.push(MetricRow::new(&actor, &spec.key, value as f64));
        }
    }

    Extraction { boss_name, rows }
}

/// Count one mechanic, trying each tier in priority order.
pub fn count_mechanic(
    report: &Report<'_>,
    roster: &Roster,
    spec: &MechanicSpec,
) -> Option<MechanicCount> {
    let matcher = spec.matcher();
    let matching: Vec<(usize, &Map<String, Value>)> = report
        .mechanics()
        .iter()
        .enumerate()
        .filter_map(|(idx, entry)| entry.as_object().map(|map| (idx, map)))
        .filter(|(_, entry)| matcher.matches_entry(entry))
        .collect();

    if let CountMode::Collapsed { gap_ms } = spec.mode {
        let counted = non_empty(
            CountTier::Collapsed,
            count_collapsed(report, roster, &matching, gap_ms),
        );
        if counted.is_some() {
            return counted;
        }
    }

    non_empty(
        CountTier::PerHit,
        count_per_hit(report, roster, &matching, spec),
    )
    .or_else(|| non_empty(CountTier::Aggregated, count_aggregated(roster, &matching)))
    .or_else(|| {
        non_empty(
            CountTier::LegacyLogs,
            count_legacy(report, roster, &matcher, spec),
        )
    })
}

fn non_empty(tier: CountTier, per_actor: BTreeMap<String, i64>) -> Option<MechanicCount> {
    (!per_actor.is_empty()).then_some(MechanicCount { tier, per_actor })
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// Maps the names a hit record may carry to the player's actor label.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    labels: HashMap<String, String>,
}

impl Roster {
    pub fn from_report(report: &Report<'_>) -> Self {
        let mut labels = HashMap::new();
        for player in report.players() {
            let label = player.actor_label();
            if let Some(account) = player.account() {
                labels.insert(account.to_string(), label.clone());
            }
            if let Some(name) = player.character_name() {
                labels.insert(name.to_string(), label);
            }
        }
        Self { labels }
    }

    /// Actor label for a character name or account; `None` for anyone
    /// outside the player list.
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        self.labels.get(raw.trim()).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Hit collection
// ---------------------------------------------------------------------------

/// One timestamped (or untimed) hit attributed to a resolved actor.
#[derive(Debug, Clone)]
struct Hit {
    actor: String,
    ms: Option<i64>,
}

fn hit_from_record(roster: &Roster, record: &Map<String, Value>, actor_keys: &[&str]) -> Option<Hit> {
    let actor = roster.resolve(first_str(record, actor_keys)?)?;
    Some(Hit {
        actor: actor.to_string(),
        ms: record.get("time").and_then(timestamp_ms),
    })
}

/// Hits of the mechanic entry at `idx`.
///
/// Entry-level `mechanicsData` wins; otherwise the top-level per-actor
/// blocks are scanned for records pointing at `idx`.
fn entry_hits(
    report: &Report<'_>,
    roster: &Roster,
    idx: usize,
    entry: &Map<String, Value>,
) -> Vec<Hit> {
    if let Some(Value::Array(records)) = entry.get("mechanicsData") {
        return records
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|record| hit_from_record(roster, record, &["actor", "name"]))
            .collect();
    }

    let mut hits = Vec::new();
    for block in report.mechanics_data().iter().filter_map(Value::as_object) {
        let Some(actor) = first_str(block, &["actor"]).and_then(|a| roster.resolve(a)) else {
            continue;
        };
        let Some(Value::Array(events)) = block.get("mechanics") else {
            continue;
        };
        for event in events.iter().filter_map(Value::as_object) {
            let points_here = event
                .get("mechanic")
                .and_then(as_integer)
                .is_some_and(|m| m == idx as i64);
            if points_here {
                hits.push(Hit {
                    actor: actor.to_string(),
                    ms: event.get("time").and_then(timestamp_ms),
                });
            }
        }
    }
    hits
}

/// Number of occurrences in sorted hit times, merging consecutive hits no
/// more than `gap_ms` apart.
pub fn collapse_occurrences(sorted_ms: &[i64], gap_ms: i64) -> i64 {
    let Some((first, rest)) = sorted_ms.split_first() else {
        return 0;
    };
    let mut occurrences = 1;
    let mut prev = *first;
    for &t in rest {
        if t.abs_diff(prev) > gap_ms.unsigned_abs() {
            occurrences += 1;
        }
        prev = t;
    }
    occurrences
}

// ---------------------------------------------------------------------------
// Dedup ledger
// ---------------------------------------------------------------------------

/// Identity of the report entry a hit came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryId {
    Mechanic(usize),
    Legacy { container: usize, mechanic: String },
}

/// Counted hits per `(partition, actor)`, remembering the source entry.
///
/// A hit is a duplicate when a counted hit of the same actor from another
/// entry lies within `window_ms`. A zero window means identical timestamps.
struct DedupLedger {
    partition: String,
    window_ms: i64,
    seen: HashMap<(String, String), Vec<(EntryId, i64)>>,
}

impl DedupLedger {
    fn new(spec: &MechanicSpec) -> Self {
        Self {
            partition: spec.canonical_key(),
            window_ms: spec.mode.dedup_window_ms(),
            seen: HashMap::new(),
        }
    }

    /// Record the hit and report whether it counts.
    fn admit(&mut self, hit: &Hit, entry: &EntryId) -> bool {
        let Some(ms) = hit.ms else {
            return true;
        };
        let window = self.window_ms.unsigned_abs();
        let counted = self
            .seen
            .entry((self.partition.clone(), hit.actor.clone()))
            .or_default();
        let duplicate = counted
            .iter()
            .any(|(from, prev)| from != entry && prev.abs_diff(ms) <= window);
        if duplicate {
            return false;
        }
        counted.push((entry.clone(), ms));
        true
    }
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

fn count_collapsed(
    report: &Report<'_>,
    roster: &Roster,
    matching: &[(usize, &Map<String, Value>)],
    gap_ms: i64,
) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for (idx, entry) in matching {
        let mut per_actor: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for hit in entry_hits(report, roster, *idx, entry) {
            if let Some(ms) = hit.ms {
                per_actor.entry(hit.actor).or_default().push(ms);
            }
        }
        for (actor, mut times) in per_actor {
            times.sort_unstable();
            *totals.entry(actor).or_insert(0) += collapse_occurrences(&times, gap_ms);
        }
    }
    totals
}

fn count_per_hit(
    report: &Report<'_>,
    roster: &Roster,
    matching: &[(usize, &Map<String, Value>)],
    spec: &MechanicSpec,
) -> BTreeMap<String, i64> {
    let mut ledger = DedupLedger::new(spec);
    let mut totals = BTreeMap::new();
    for (idx, entry) in matching {
        let source = EntryId::Mechanic(*idx);
        for hit in entry_hits(report, roster, *idx, entry) {
            if ledger.admit(&hit, &source) {
                *totals.entry(hit.actor).or_insert(0) += 1;
            }
        }
    }
    totals
}

fn count_aggregated(
    roster: &Roster,
    matching: &[(usize, &Map<String, Value>)],
) -> BTreeMap<String, i64> {
    let mut totals = BTreeMap::new();
    for (_, entry) in matching {
        let records = ["players", "playerHits"]
            .iter()
            .find_map(|key| match entry.get(*key) {
                Some(Value::Array(items)) if !items.is_empty() => Some(items),
                _ => None,
            });
        let Some(records) = records else {
            continue;
        };
        for record in records.iter().filter_map(Value::as_object) {
            let actor = first_str(record, &["account"])
                .map(|account| roster.resolve(account).unwrap_or(account))
                .or_else(|| {
                    first_str(record, &["name", "actor"]).and_then(|name| roster.resolve(name))
                });
            let Some(actor) = actor else {
                continue;
            };
            let count = ["c", "count"]
                .iter()
                .find_map(|key| record.get(*key))
                .map(|v| as_integer(v).unwrap_or(1))
                .unwrap_or(1);
            if count > 0 {
                *totals.entry(actor.to_string()).or_insert(0) += count;
            }
        }
    }
    totals
}

/// Every legacy record list in container order.
fn legacy_containers<'a>(report: &Report<'a>) -> Vec<&'a [Value]> {
    let mut containers: Vec<&'a [Value]> = LEGACY_LIST_KEYS
        .iter()
        .map(|key| report.list(key))
        .filter(|list| !list.is_empty())
        .collect();
    for key in LEGACY_MAP_KEYS {
        if let Some(Value::Object(map)) = report.get(key) {
            containers.extend(map.values().filter_map(|v| match v {
                Value::Array(items) if !items.is_empty() => Some(items.as_slice()),
                _ => None,
            }));
        }
    }
    containers
}

fn count_legacy(
    report: &Report<'_>,
    roster: &Roster,
    matcher: &AliasMatcher,
    spec: &MechanicSpec,
) -> BTreeMap<String, i64> {
    let mut ledger = DedupLedger::new(spec);
    let mut totals = BTreeMap::new();
    for (container, records) in legacy_containers(report).into_iter().enumerate() {
        for record in records.iter().filter_map(Value::as_object) {
            let names = MechanicNames::from_log_record(record);
            if !matcher.matches(&names) {
                continue;
            }
            let Some(hit) = hit_from_record(roster, record, &["actor", "name", "source"]) else {
                continue;
            };
            let source = EntryId::Legacy {
                container,
                mechanic: names.primary().to_string(),
            };
            if ledger.admit(&hit, &source) {
                *totals.entry(hit.actor).or_insert(0) += 1;
            }
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EncounterMechanics;
    use serde_json::json;

    fn registry_with(spec: MechanicSpec) -> Registry {
        Registry::new(vec![EncounterMechanics {
            encounter: "test boss".into(),
            mechanics: vec![spec],
        }])
    }

    fn mechanic_rows(extraction: &Extraction, key: &str) -> BTreeMap<String, f64> {
        extraction
            .rows
            .iter()
            .filter(|row| row.metric_key == key)
            .map(|row| (row.actor.clone(), row.value))
            .collect()
    }

    fn players() -> Value {
        json!([
            {"account": "Alpha.1111", "name": "Alpha Char"},
            {"account": "Beta.2222", "name": "Beta Char"}
        ])
    }

    #[test]
    fn collapse_merges_close_hits() {
        assert_eq!(collapse_occurrences(&[0, 400, 900, 5000], 500), 2);
        assert_eq!(collapse_occurrences(&[], 500), 0);
        assert_eq!(collapse_occurrences(&[10], 0), 1);
    }

    #[test]
    fn collapse_handles_extreme_times() {
        assert_eq!(collapse_occurrences(&[i64::MIN, i64::MAX], 500), 2);
        assert_eq!(collapse_occurrences(&[i64::MIN, i64::MIN + 1], 500), 1);
    }

    #[test]
    fn global_metrics_for_every_player() {
        let report = json!({
            "fightName": "Sabetha",
            "players": [{
                "account": "Alpha.1111",
                "defenses": [{"downCount": 2, "deadCount": 1}],
                "support": [{"resurrects": 3}],
                "dpsTargets": [[{"powerDps": 10000, "condiDps": 2500}]]
            }]
        });
        let extraction = extract(&report, &Registry::builtin());
        assert_eq!(extraction.boss_name, "Sabetha");
        assert_eq!(
            extraction.rows,
            vec![
                MetricRow::new("Alpha.1111", "downs", 2.0),
                MetricRow::new("Alpha.1111", "deaths", 1.0),
                MetricRow::new("Alpha.1111", "resurrects", 3.0),
                MetricRow::new("Alpha.1111", "boss_dps", 12500.0),
            ]
        );
    }

    #[test]
    fn missing_sections_yield_no_rows() {
        let extraction = extract(&json!({"fightName": "Dhuum"}), &Registry::builtin());
        assert!(extraction.rows.is_empty());
        let extraction = extract(&json!("not a report"), &Registry::builtin());
        assert_eq!(extraction.boss_name, UNKNOWN_ENCOUNTER);
        assert!(extraction.rows.is_empty());
    }

    #[test]
    fn collapsed_mode_counts_occurrences() {
        let spec = MechanicSpec::new("magma", "Magma")
            .exact(&["S.Magma.F"])
            .mode(CountMode::Collapsed { gap_ms: 500 });
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [{
                "name": "S.Magma.F",
                "mechanicsData": [
                    {"actor": "Alpha Char", "time": 0},
                    {"actor": "Alpha Char", "time": 400},
                    {"actor": "Alpha Char", "time": 900},
                    {"actor": "Alpha Char", "time": 5000}
                ]
            }]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert_eq!(
            mechanic_rows(&extraction, "magma"),
            BTreeMap::from([("Alpha.1111".to_string(), 2.0)])
        );
    }

    #[test]
    fn collapsed_mode_reads_top_level_blocks() {
        let spec = MechanicSpec::new("magma", "Magma")
            .exact(&["S.Magma.F"])
            .mode(CountMode::Collapsed { gap_ms: 1000 });
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [{"name": "Other"}, {"name": "S.Magma.F"}],
            "mechanicsData": [
                {"actor": "Beta Char", "mechanics": [
                    {"mechanic": 1, "time": 100},
                    {"mechanic": 1, "time": 600},
                    {"mechanic": 0, "time": 9000},
                    {"mechanic": 1, "time": 8000}
                ]}
            ]
        });
        let roster = Roster::from_report(&Report::new(&report).unwrap());
        let registry = registry_with(spec);
        let spec = registry.specs_for("Test Boss").next().unwrap();
        let count = count_mechanic(&Report::new(&report).unwrap(), &roster, spec).unwrap();
        assert_eq!(count.tier, CountTier::Collapsed);
        assert_eq!(count.per_actor.get("Beta.2222"), Some(&2));
    }

    #[test]
    fn cross_entry_duplicates_are_suppressed() {
        let spec = MechanicSpec::new("dip", "Dip")
            .matching(&["dip"])
            .mode(CountMode::Deduplicated { window_ms: 250 });
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [
                {"name": "Dip", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 1000},
                    {"actor": "Alpha Char", "time": 1100}
                ]},
                {"name": "Dip.H", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 1200},
                    {"actor": "Alpha Char", "time": 4000},
                    {"actor": "Beta Char", "time": 1000}
                ]}
            ]
        });
        let extraction = extract(&report, &registry_with(spec));
        // Same-entry hits at 1000 and 1100 both count; 1200 from the second
        // entry is within 250ms of 1100 and is dropped.
        assert_eq!(
            mechanic_rows(&extraction, "dip"),
            BTreeMap::from([
                ("Alpha.1111".to_string(), 3.0),
                ("Beta.2222".to_string(), 1.0),
            ])
        );
    }

    #[test]
    fn same_entry_identical_timestamps_count_twice() {
        let spec = MechanicSpec::new("dip", "Dip")
            .matching(&["dip"])
            .mode(CountMode::Deduplicated { window_ms: 250 });
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [
                {"name": "Dip", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 3000},
                    {"actor": "Alpha Char", "time": 3000}
                ]},
                {"name": "Dip.H", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 3000}
                ]}
            ]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert_eq!(
            mechanic_rows(&extraction, "dip"),
            BTreeMap::from([("Alpha.1111".to_string(), 2.0)])
        );
    }

    #[test]
    fn extreme_hit_times_are_counted_apart() {
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [
                {"name": "Dip", "mechanicsData": [{"actor": "Alpha Char", "time": i64::MIN}]},
                {"name": "Dip.H", "mechanicsData": [{"actor": "Alpha Char", "time": i64::MAX}]}
            ]
        });
        let dedup = MechanicSpec::new("dip", "Dip")
            .matching(&["dip"])
            .mode(CountMode::Deduplicated { window_ms: 250 });
        let extraction = extract(&report, &registry_with(dedup));
        assert_eq!(
            mechanic_rows(&extraction, "dip"),
            BTreeMap::from([("Alpha.1111".to_string(), 2.0)])
        );

        let collapsed = MechanicSpec::new("dip", "Dip")
            .matching(&["dip"])
            .mode(CountMode::Collapsed { gap_ms: 500 });
        let extraction = extract(&report, &registry_with(collapsed));
        assert_eq!(
            mechanic_rows(&extraction, "dip"),
            BTreeMap::from([("Alpha.1111".to_string(), 2.0)])
        );
    }

    #[test]
    fn hits_mode_only_drops_identical_timestamps() {
        let spec = MechanicSpec::new("knock", "Knock").matching(&["knock"]);
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [
                {"name": "Knock", "mechanicsData": [{"actor": "Alpha Char", "time": 2.5}]},
                {"name": "Knock Back", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 2500},
                    {"actor": "Alpha Char", "time": 2501}
                ]}
            ]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert_eq!(
            mechanic_rows(&extraction, "knock"),
            BTreeMap::from([("Alpha.1111".to_string(), 2.0)])
        );
    }

    #[test]
    fn per_hit_takes_priority_over_aggregated() {
        let spec = MechanicSpec::new("bomb", "Bomb").exact(&["Bomb"]);
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [{
                "name": "Bomb",
                "mechanicsData": [{"actor": "Beta Char", "time": 10}],
                "players": [{"account": "Beta.2222", "c": 7}]
            }]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert_eq!(
            mechanic_rows(&extraction, "bomb"),
            BTreeMap::from([("Beta.2222".to_string(), 1.0)])
        );
    }

    #[test]
    fn aggregated_counts_default_to_one() {
        let spec = MechanicSpec::new("bomb", "Bomb").exact(&["Bomb"]);
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [{
                "name": "Bomb",
                "playerHits": [
                    {"account": "Beta.2222", "count": 3},
                    {"name": "Alpha Char"},
                    {"name": "Stranger", "c": 4},
                    {"account": "Beta.2222", "c": 0}
                ]
            }]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert_eq!(
            mechanic_rows(&extraction, "bomb"),
            BTreeMap::from([
                ("Alpha.1111".to_string(), 1.0),
                ("Beta.2222".to_string(), 3.0),
            ])
        );
    }

    #[test]
    fn legacy_logs_are_the_last_resort() {
        let spec = MechanicSpec::new("lightning", "Lightning").matching(&["lightning"]);
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanicLogs": [
                {"mechanic": "Lightning Hit", "actor": "Alpha Char", "time": 100},
                {"mechanic": "Other", "actor": "Alpha Char", "time": 200}
            ],
            "mechanicsById": {
                "7": [{"mechanic": "Expanding Lightning", "actor": "Alpha Char", "time": 100},
                      {"mechanic": "Expanding Lightning", "source": "Nobody", "time": 300}]
            }
        });
        let registry = registry_with(spec);
        let report_view = Report::new(&report).unwrap();
        let roster = Roster::from_report(&report_view);
        let spec = registry.specs_for("Test Boss").next().unwrap();
        let count = count_mechanic(&report_view, &roster, spec).unwrap();
        assert_eq!(count.tier, CountTier::LegacyLogs);
        // The second container repeats the hit at 100ms for the same actor.
        assert_eq!(count.per_actor, BTreeMap::from([("Alpha.1111".to_string(), 1)]));
    }

    #[test]
    fn unknown_actors_are_ignored() {
        let spec = MechanicSpec::new("dip", "Dip").matching(&["dip"]);
        let report = json!({
            "fightName": "Test Boss",
            "players": players(),
            "mechanics": [{"name": "Dip", "mechanicsData": [{"actor": "Ghost", "time": 1}]}]
        });
        let extraction = extract(&report, &registry_with(spec));
        assert!(mechanic_rows(&extraction, "dip").is_empty());
    }

    #[test]
    fn non_matching_encounter_gets_global_rows_only() {
        let report = json!({
            "fightName": "Vale Guardian",
            "players": players(),
            "mechanics": [{"name": "Dip", "mechanicsData": [{"actor": "Alpha Char", "time": 1}]}]
        });
        let extraction = extract(&report, &Registry::builtin());
        assert_eq!(extraction.rows.len(), 8);
    }

    #[test]
    fn extraction_is_deterministic() {
        let report = json!({
            "encounter": {"boss": "Qadim the Peerless"},
            "players": players(),
            "mechanics": [
                {"name": "Lght.H", "mechanicsData": [
                    {"actor": "Beta Char", "time": 50},
                    {"actor": "Alpha Char", "time": 60}
                ]},
                {"name": "S.Magma.F", "mechanicsData": [
                    {"actor": "Alpha Char", "time": 100},
                    {"actor": "Alpha Char", "time": 900}
                ]}
            ]
        });
        let registry = Registry::builtin();
        let first = extract(&report, &registry);
        let second = extract(&report, &registry);
        assert_eq!(first, second);
        assert_eq!(
            mechanic_rows(&first, "qtp_small_magma"),
            BTreeMap::from([("Alpha.1111".to_string(), 1.0)])
        );
        assert!(mechanic_rows(&first, "qtp_magma").is_empty());
    }
}
