//! Name normalization and alias matching for encounters and mechanics.

use serde_json::{Map, Value};

/// Lowercase and strip everything that is not an ASCII letter or digit.
///
/// `"Qadim the Peerless"` and `"qadim-the-peerless"` both become
/// `"qadimthepeerless"`.
pub fn normalize_name(raw: &str) -> String {
    raw.chars()
        .flat_map(char::to_lowercase)
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// Bidirectional substring match between a report's boss name and a
/// registry key, after normalization. Empty names never match.
pub fn encounter_matches(boss_name: &str, key: &str) -> bool {
    let boss = normalize_name(boss_name);
    let key = normalize_name(key);
    if boss.is_empty() || key.is_empty() {
        return false;
    }
    boss.contains(&key) || key.contains(&boss)
}

/// The name-ish fields of one mechanic entry or legacy log record,
/// already normalized.
#[derive(Debug, Clone, Default)]
pub struct MechanicNames {
    name: String,
    short_name: String,
    full_name: String,
    description: String,
    tooltip: String,
}

impl MechanicNames {
    /// Names of a `mechanics[*]` entry.
    pub fn from_entry(entry: &Map<String, Value>) -> Self {
        Self::read(entry, &["name"])
    }

    /// Names of a legacy top-level log record, where the mechanic name may
    /// sit under `mechanic`.
    pub fn from_log_record(record: &Map<String, Value>) -> Self {
        Self::read(record, &["mechanic", "name"])
    }

    fn read(map: &Map<String, Value>, name_keys: &[&str]) -> Self {
        let field = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(normalize_name)
                .unwrap_or_default()
        };
        Self {
            name: field(name_keys),
            short_name: field(&["shortName"]),
            full_name: field(&["fullName"]),
            description: field(&["description"]),
            tooltip: field(&["tooltip"]),
        }
    }

    /// The normalized primary name, used to tell legacy log streams apart.
    pub fn primary(&self) -> &str {
        [&self.name, &self.short_name, &self.full_name]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    fn identity_fields(&self) -> impl Iterator<Item = &str> {
        [&self.name, &self.short_name, &self.full_name]
            .into_iter()
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.identity_fields().chain(
            [&self.description, &self.tooltip]
                .into_iter()
                .map(String::as_str)
                .filter(|s| !s.is_empty()),
        )
    }
}

/// Normalized aliases of one mechanic spec.
///
/// Exact aliases are compared for equality against name, short name and
/// full name. Substring aliases are the fallback and also search the
/// description and tooltip.
#[derive(Debug, Clone, Default)]
pub struct AliasMatcher {
    exact: Vec<String>,
    substrings: Vec<String>,
}

impl AliasMatcher {
    pub fn new<S: AsRef<str>>(exact: &[S], substrings: &[S]) -> Self {
        let normalized = |items: &[S]| {
            items
                .iter()
                .map(|s| normalize_name(s.as_ref()))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            exact: normalized(exact),
            substrings: normalized(substrings),
        }
    }

    pub fn matches(&self, names: &MechanicNames) -> bool {
        let exact_hit = self
            .exact
            .iter()
            .any(|alias| names.identity_fields().any(|field| field == alias.as_str()));
        exact_hit
            || self
                .substrings
                .iter()
                .any(|alias| names.text_fields().any(|field| field.contains(alias.as_str())))
    }

    pub fn matches_entry(&self, entry: &Map<String, Value>) -> bool {
        self.matches(&MechanicNames::from_entry(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_name("S.Magma.F"), "smagmaf");
        assert_eq!(normalize_name("Qadim the Peerless"), "qadimthepeerless");
        assert_eq!(normalize_name("  "), "");
    }

    #[test]
    fn encounter_match_is_bidirectional() {
        assert!(encounter_matches("Gorseval the Multifarious", "gorseval"));
        assert!(encounter_matches("Dhuum", "dhuum cm"));
        assert!(!encounter_matches("Sabetha", "dhuum"));
    }

    #[test]
    fn empty_names_never_match() {
        assert!(!encounter_matches("", "dhuum"));
        assert!(!encounter_matches("---", "dhuum"));
    }

    #[test]
    fn exact_alias_matches_identity_fields_only() {
        let matcher = AliasMatcher::new(&["S.Magma.F"], &[]);
        assert!(matcher.matches_entry(&entry(json!({"name": "S.Magma.F"}))));
        assert!(matcher.matches_entry(&entry(json!({"shortName": "s magma f"}))));
        assert!(!matcher.matches_entry(&entry(json!({"description": "S.Magma.F"}))));
    }

    #[test]
    fn substring_fallback_searches_description_and_tooltip() {
        let matcher = AliasMatcher::new(&[], &["lesser death mark"]);
        assert!(matcher.matches_entry(&entry(json!({
            "name": "Dip",
            "tooltip": "Hit by Lesser Death Mark"
        }))));
        assert!(!matcher.matches_entry(&entry(json!({"name": "Bomb"}))));
    }

    #[test]
    fn substring_applies_when_exact_does_not_match() {
        let matcher = AliasMatcher::new(&["Knck.Pll"], &["pull"]);
        assert!(matcher.matches_entry(&entry(json!({"fullName": "Pulled in"}))));
    }

    #[test]
    fn log_record_reads_mechanic_field() {
        let record = entry(json!({"mechanic": "Magma Field", "actor": "x"}));
        let names = MechanicNames::from_log_record(&record);
        assert_eq!(names.primary(), "magmafield");
    }
}
