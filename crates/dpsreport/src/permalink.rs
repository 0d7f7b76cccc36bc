//! dps.report URL shapes.

use std::sync::LazyLock;

use regex::Regex;

static PERMALINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"dps\.report/([^/?#]+)").expect("valid regex"));

/// Suffixes tried after the permalink itself when looking for the JSON
/// report.
const JSON_SUFFIXES: [&str; 4] = ["/ei.json", "/json", "/report.json", "/index.json"];

pub fn is_http_url(reference: &str) -> bool {
    let lower = reference.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// The report id of a dps.report permalink, e.g. `abcd-20250301-201500_dhuum`.
pub fn permalink_id(url: &str) -> Option<&str> {
    PERMALINK_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Ordered URLs to try when fetching the JSON report behind `url`.
///
/// A URL already ending in `.json` is used as-is. Otherwise the service's
/// `getJson` endpoint comes first (when a permalink id is present),
/// followed by the conventional JSON suffixes.
pub fn candidate_urls(url: &str, base_url: &str) -> Vec<String> {
    let url = url.trim().trim_end_matches('/');
    if url.to_ascii_lowercase().ends_with(".json") {
        return vec![url.to_string()];
    }

    let mut candidates = Vec::with_capacity(JSON_SUFFIXES.len() + 1);
    if let Some(id) = permalink_id(url) {
        candidates.push(format!(
            "{}/getJson?permalink={id}",
            base_url.trim_end_matches('/')
        ));
    }
    candidates.extend(JSON_SUFFIXES.iter().map(|suffix| format!("{url}{suffix}")));
    candidates
}
