//! Defensive decoding of Elite Insights report JSON.
//!
//! Report layouts drift between parser versions: a section may be a single
//! object or a list of objects, and the same value has lived under several
//! field names over time. [`OneOrMany`] makes the section shape explicit and
//! each [`FieldChain`] names the aliases tried for one value, so extraction
//! code never has to type-check raw JSON itself.

use serde_json::{Map, Value};

/// Boss name used when a report carries none.
pub const UNKNOWN_ENCOUNTER: &str = "Unknown Encounter";

/// Actor label used for a player without account or character name.
pub const UNKNOWN_ACTOR: &str = "Unknown";

/// Boss id stored when the upload response carries none.
pub const UNKNOWN_BOSS_ID: i64 = -1;

/// JSON floats below this value are timestamps in seconds, not milliseconds.
const SECONDS_TIMESTAMP_CEILING: f64 = 1e5;

// ---------------------------------------------------------------------------
// Field chains
// ---------------------------------------------------------------------------

/// A per-player section and the ordered aliases for one value inside it.
#[derive(Debug, Clone, Copy)]
pub struct FieldChain {
    pub section: &'static str,
    pub names: &'static [&'static str],
}

pub const DOWNS: FieldChain = FieldChain {
    section: "defenses",
    names: &["downCount", "downs", "downed", "downedCount"],
};

pub const DEATHS: FieldChain = FieldChain {
    section: "defenses",
    names: &["deadCount", "deaths"],
};

pub const RESURRECTS: FieldChain = FieldChain {
    section: "support",
    names: &["resurrects", "resurrectsPerformed"],
};

/// Keys that may carry the remote report identifier.
pub const PERMALINK_FIELDS: &[&str] = &["permalink", "permaLink", "id"];

// ---------------------------------------------------------------------------
// OneOrMany
// ---------------------------------------------------------------------------

/// A report section that is either one object or a list of objects.
#[derive(Debug, Clone, Copy)]
pub enum OneOrMany<'a> {
    One(&'a Map<String, Value>),
    Many(&'a [Value]),
    Absent,
}

impl<'a> OneOrMany<'a> {
    pub fn decode(value: Option<&'a Value>) -> Self {
        match value {
            Some(Value::Object(map)) => Self::One(map),
            Some(Value::Array(items)) => Self::Many(items),
            _ => Self::Absent,
        }
    }

    /// Read the first usable number for any of `names`.
    ///
    /// For a single object the first present, non-null alias decides the
    /// outcome. For a list, the first object yielding a number wins.
    pub fn first_number(&self, names: &[&str]) -> Option<f64> {
        match self {
            Self::One(map) => number_in(map, names),
            Self::Many(items) => items
                .iter()
                .filter_map(Value::as_object)
                .find_map(|map| number_in(map, names)),
            Self::Absent => None,
        }
    }
}

fn number_in(map: &Map<String, Value>, names: &[&str]) -> Option<f64> {
    names
        .iter()
        .find_map(|name| map.get(*name).filter(|v| !v.is_null()))
        .and_then(as_number)
}

// ---------------------------------------------------------------------------
// Scalar coercion
// ---------------------------------------------------------------------------

/// Coerce a JSON scalar to a number. Numeric strings and booleans count.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Coerce a JSON scalar to a whole number, truncating fractions.
pub fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        other => as_number(other).map(|f| f as i64),
    }
}

/// Loose truthiness: `true`, non-zero numbers and `"1"/"true"/"t"/"yes"/"y"`.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "t" | "yes" | "y"
        ),
        _ => false,
    }
}

/// Decode a hit timestamp into milliseconds.
///
/// JSON integers are milliseconds. Floats (and numeric strings) below
/// 100 000 are seconds; larger ones are already milliseconds.
pub fn timestamp_ms(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(ms) = n.as_i64() {
            return Some(ms);
        }
    }
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    if raw < SECONDS_TIMESTAMP_CEILING {
        Some((raw * 1000.0).round() as i64)
    } else {
        Some(raw.round() as i64)
    }
}

/// First non-empty string among `keys`.
pub fn first_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Read-only view over a structured encounter report.
#[derive(Debug, Clone, Copy)]
pub struct Report<'a> {
    root: &'a Map<String, Value>,
}

impl<'a> Report<'a> {
    /// Wrap a report value. Returns `None` when the value is not an object.
    pub fn new(value: &'a Value) -> Option<Self> {
        value.as_object().map(|root| Self { root })
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.root.get(key)
    }

    fn encounter(&self) -> Option<&'a Map<String, Value>> {
        self.root.get("encounter").and_then(Value::as_object)
    }

    /// Player objects; non-object list items are skipped.
    pub fn players(&self) -> impl Iterator<Item = Player<'a>> + 'a {
        self.list("players")
            .iter()
            .filter_map(Value::as_object)
            .map(|map| Player { map })
    }

    pub fn boss_name(&self) -> String {
        self.encounter()
            .and_then(|enc| first_str(enc, &["boss"]))
            .or_else(|| first_str(self.root, &["boss", "fightName"]))
            .unwrap_or(UNKNOWN_ENCOUNTER)
            .to_string()
    }

    /// The report's mechanic entries (definitions plus per-hit data).
    pub fn mechanics(&self) -> &'a [Value] {
        self.list("mechanics")
    }

    /// Top-level per-actor mechanic blocks referencing entries by index.
    pub fn mechanics_data(&self) -> &'a [Value] {
        self.list("mechanicsData")
    }

    /// A top-level list, or an empty slice when absent or mis-shaped.
    pub fn list(&self, key: &str) -> &'a [Value] {
        match self.root.get(key) {
            Some(Value::Array(items)) => items,
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct Player<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Player<'a> {
    pub fn account(&self) -> Option<&'a str> {
        first_str(self.map, &["account"])
    }

    pub fn character_name(&self) -> Option<&'a str> {
        first_str(self.map, &["name"])
    }

    /// Label metric rows are keyed by: account, else character name.
    pub fn actor_label(&self) -> String {
        self.account()
            .or_else(|| self.character_name())
            .unwrap_or(UNKNOWN_ACTOR)
            .to_string()
    }

    fn chain(&self, chain: FieldChain) -> i64 {
        OneOrMany::decode(self.map.get(chain.section))
            .first_number(chain.names)
            .map(|f| f as i64)
            .unwrap_or(0)
    }

    pub fn downs(&self) -> i64 {
        self.chain(DOWNS)
    }

    pub fn deaths(&self) -> i64 {
        self.chain(DEATHS)
    }

    pub fn resurrects(&self) -> i64 {
        self.chain(RESURRECTS)
    }

    /// Full-fight boss DPS (power + condition).
    ///
    /// Prefers the first phase of the first damage target and falls back to
    /// the overall damage entry. Absent or unparsable data yields 0.
    pub fn boss_dps(&self) -> f64 {
        let first_target = self
            .map
            .get("dpsTargets")
            .and_then(Value::as_array)
            .and_then(|targets| targets.first())
            .and_then(Value::as_array)
            .and_then(|phases| phases.first())
            .and_then(Value::as_object);
        if let Some(entry) = first_target {
            return dps_of(entry);
        }

        self.map
            .get("dpsAll")
            .and_then(Value::as_array)
            .and_then(|all| all.first())
            .and_then(Value::as_object)
            .map(dps_of)
            .unwrap_or(0.0)
    }
}

fn dps_of(entry: &Map<String, Value>) -> f64 {
    let field = |key: &str| entry.get(key).and_then(as_number).unwrap_or(0.0);
    if entry.contains_key("powerDps") || entry.contains_key("condiDps") {
        field("powerDps") + field("condiDps")
    } else {
        field("dps")
    }
}

// ---------------------------------------------------------------------------
// Upload response summary
// ---------------------------------------------------------------------------

/// Encounter identity decoded from an upload response or a full report.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSummary {
    pub boss_id: i64,
    pub boss_name: String,
    pub success: bool,
    pub permalink: Option<String>,
}

impl UploadSummary {
    pub fn from_response(value: &Value) -> Self {
        let Some(root) = value.as_object() else {
            return Self {
                boss_id: UNKNOWN_BOSS_ID,
                boss_name: UNKNOWN_ENCOUNTER.to_string(),
                success: false,
                permalink: None,
            };
        };
        let encounter = root.get("encounter").and_then(Value::as_object);

        let from_encounter = |key: &str| encounter.and_then(|enc| enc.get(key));
        let boss_id = from_encounter("bossId")
            .and_then(as_integer)
            .filter(|id| *id != 0)
            .or_else(|| {
                ["bossId", "triggerID"]
                    .iter()
                    .filter_map(|key| root.get(*key).and_then(as_integer))
                    .find(|id| *id != 0)
            })
            .unwrap_or(UNKNOWN_BOSS_ID);

        let success = from_encounter("success").is_some_and(is_truthy)
            || root.get("success").is_some_and(is_truthy);

        let permalink = first_str(root, &PERMALINK_FIELDS[..2]).map(str::to_string);

        Self {
            boss_id,
            boss_name: Report { root }.boss_name(),
            success,
            permalink,
        }
    }
}
