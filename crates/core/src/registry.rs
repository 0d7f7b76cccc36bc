//! Mechanic registry: which mechanics are counted for which encounter.
//!
//! The registry is plain configuration data. The built-in table lives in
//! [`Registry::builtin`]; operators can replace it with a JSON document of
//! the same shape (see [`Registry::from_json_str`]). Counting logic lives in
//! [`crate::extraction`] and never needs to change when an encounter is
//! added here.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::matching::{encounter_matches, AliasMatcher};

// ---------------------------------------------------------------------------
// Global metrics
// ---------------------------------------------------------------------------

pub const METRIC_DOWNS: &str = "downs";
pub const METRIC_DEATHS: &str = "deaths";
pub const METRIC_RESURRECTS: &str = "resurrects";
pub const METRIC_BOSS_DPS: &str = "boss_dps";

/// Per-player metrics computed for every encounter: `(key, label)`.
pub const GLOBAL_PLAYER_METRICS: [(&str, &str); 4] = [
    (METRIC_DOWNS, "Times downed"),
    (METRIC_DEATHS, "Times died"),
    (METRIC_RESURRECTS, "Resurrects"),
    (METRIC_BOSS_DPS, "Full-fight target DPS (Power+Condi)"),
];

// ---------------------------------------------------------------------------
// MechanicSpec
// ---------------------------------------------------------------------------

/// How hits of a mechanic turn into a per-player count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    /// Every hit counts; identical timestamps reported by two different
    /// report entries count once.
    #[default]
    Hits,
    /// Like `Hits`, but a hit from another entry within `window_ms` of an
    /// already counted hit is a duplicate.
    Deduplicated { window_ms: i64 },
    /// Consecutive hits no more than `gap_ms` apart form one occurrence.
    Collapsed { gap_ms: i64 },
}

impl CountMode {
    /// Cross-entry dedup tolerance for per-hit counting.
    pub fn dedup_window_ms(&self) -> i64 {
        match self {
            CountMode::Deduplicated { window_ms } => *window_ms,
            CountMode::Hits | CountMode::Collapsed { .. } => 0,
        }
    }
}

/// One countable mechanic of an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanicSpec {
    /// Metric key stored on `metrics.metric_key`.
    pub key: String,
    pub label: String,
    /// Aliases compared for equality (after normalization).
    #[serde(default)]
    pub exact: Vec<String>,
    /// Substring aliases used when no exact alias matches.
    #[serde(default)]
    pub matches: Vec<String>,
    /// Dedup partition id; defaults to the alias list.
    #[serde(default)]
    pub canonical: Option<String>,
    #[serde(default)]
    pub mode: CountMode,
}

impl MechanicSpec {
    pub fn new(key: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            exact: Vec::new(),
            matches: Vec::new(),
            canonical: None,
            mode: CountMode::Hits,
        }
    }

    pub fn exact(mut self, aliases: &[&str]) -> Self {
        self.exact = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn matching(mut self, aliases: &[&str]) -> Self {
        self.matches = aliases.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn canonical(mut self, id: &str) -> Self {
        self.canonical = Some(id.to_string());
        self
    }

    pub fn mode(mut self, mode: CountMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn matcher(&self) -> AliasMatcher {
        AliasMatcher::new(self.exact.as_slice(), self.matches.as_slice())
    }

    /// Partition key for cross-entry dedup.
    pub fn canonical_key(&self) -> String {
        if let Some(id) = self.canonical.as_deref().filter(|s| !s.trim().is_empty()) {
            return id.trim().to_lowercase();
        }
        let aliases = if self.exact.is_empty() {
            &self.matches
        } else {
            &self.exact
        };
        if aliases.is_empty() {
            return self.key.to_lowercase();
        }
        aliases.join(",").trim().to_lowercase()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Mechanics tracked for every encounter whose name matches `encounter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterMechanics {
    pub encounter: String,
    pub mechanics: Vec<MechanicSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub encounters: Vec<EncounterMechanics>,
}

impl Registry {
    pub fn new(encounters: Vec<EncounterMechanics>) -> Self {
        Self { encounters }
    }

    /// The registry compiled into the binary.
    pub fn builtin() -> Self {
        Self::new(vec![
            EncounterMechanics {
                encounter: "dhuum".into(),
                mechanics: vec![MechanicSpec::new(
                    "dhuum_dip",
                    "Dip AoE (Lesser Death Mark hits)",
                )
                .matching(&["dip", "lesser death mark"])
                .mode(CountMode::Deduplicated { window_ms: 250 })],
            },
            EncounterMechanics {
                encounter: "qadim the peerless".into(),
                mechanics: vec![
                    MechanicSpec::new("qtp_knckpll", "Knck.Pll (Knocked Back/Pulled)")
                        .exact(&["Knck.Pll"])
                        .matching(&["knock", "pull"]),
                    MechanicSpec::new("qtp_lightning", "Lght.H (Expanding Lightning)")
                        .exact(&["Lght.H"])
                        .matching(&["lightning"]),
                    MechanicSpec::new("qtp_magma", "Magma.F (Magma Field)")
                        .exact(&["Magma.F", "Magma Field"]),
                    MechanicSpec::new("qtp_small_magma", "S.Magma.F (Small Magma Field)")
                        .exact(&["S.Magma.F"])
                        .matching(&["small magma"])
                        .mode(CountMode::Collapsed { gap_ms: 1000 }),
                ],
            },
        ])
    }

    /// Parse and validate a registry document.
    pub fn from_json_str(document: &str) -> Result<Self, CoreError> {
        let registry: Registry = serde_json::from_str(document)
            .map_err(|e| CoreError::Validation(format!("Invalid mechanic registry: {e}")))?;
        registry.validate()?;
        Ok(registry)
    }

    /// Keys must be non-empty, windows non-negative, and metric keys unique
    /// across the whole registry (labels are looked up by key).
    pub fn validate(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::new();
        for encounter in &self.encounters {
            if encounter.encounter.trim().is_empty() {
                return Err(CoreError::Validation(
                    "Encounter key must not be empty".into(),
                ));
            }
            for spec in &encounter.mechanics {
                if spec.key.trim().is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Mechanic key must not be empty (encounter '{}')",
                        encounter.encounter
                    )));
                }
                if !seen.insert(spec.key.as_str()) {
                    return Err(CoreError::Validation(format!(
                        "Duplicate mechanic key '{}'",
                        spec.key
                    )));
                }
                if spec.exact.is_empty() && spec.matches.is_empty() {
                    return Err(CoreError::Validation(format!(
                        "Mechanic '{}' declares no aliases",
                        spec.key
                    )));
                }
                let window = match spec.mode {
                    CountMode::Hits => 0,
                    CountMode::Deduplicated { window_ms } => window_ms,
                    CountMode::Collapsed { gap_ms } => gap_ms,
                };
                if window < 0 {
                    return Err(CoreError::Validation(format!(
                        "Mechanic '{}' has a negative window",
                        spec.key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every spec whose encounter key matches `boss_name`.
    pub fn specs_for<'a>(&'a self, boss_name: &'a str) -> impl Iterator<Item = &'a MechanicSpec> {
        self.encounters
            .iter()
            .filter(move |enc| encounter_matches(boss_name, &enc.encounter))
            .flat_map(|enc| enc.mechanics.iter())
    }

    /// Human label for a metric key, global or encounter-specific.
    pub fn label_for(&self, key: &str) -> Option<&str> {
        GLOBAL_PLAYER_METRICS
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, label)| *label)
            .or_else(|| {
                self.encounters
                    .iter()
                    .flat_map(|enc| enc.mechanics.iter())
                    .find(|spec| spec.key == key)
                    .map(|spec| spec.label.as_str())
            })
    }
}
