//! Technique identifier extraction.
//!
//! Scans free text (log lines, reputation reports, model output) for
//! ATT&CK technique identifiers such as `T1059` or `T1566.001`.

use std::collections::HashSet;
use std::sync::LazyLock;

use mitrelens_shared::TechniqueId;
use regex::Regex;

/// Word-bounded `T####` with an optional `.###` sub-technique suffix.
static TECHNIQUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bT\d{4}(?:\.\d{3})?\b").expect("technique regex")
});

/// Extract the distinct technique identifiers in `text`, in first-seen order.
///
/// Matching is exact: no case folding, so `t1059` is ignored, and a parent id
/// and its sub-technique (`T1059`, `T1059.001`) are separate entries.
pub fn extract_technique_ids(text: &str) -> Vec<TechniqueId> {
    let mut seen = HashSet::new();

    TECHNIQUE_RE
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|id| seen.insert(*id))
        .filter_map(|id| id.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(text: &str) -> Vec<String> {
        extract_technique_ids(text)
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(ids("").is_empty());
        assert!(ids("no identifiers in here").is_empty());
    }

    #[test]
    fn keeps_first_seen_order_and_dedupes() {
        let text = "Predicted MITRE ATT&CK is: T1566.001, T1059\nseen again: T1059, T1566.001, T1204";
        assert_eq!(ids(text), ["T1566.001", "T1059", "T1204"]);
    }

    #[test]
    fn parent_and_sub_technique_are_distinct() {
        assert_eq!(ids("T1059 then T1059.001"), ["T1059", "T1059.001"]);
    }

    #[test]
    fn near_misses_do_not_match() {
        // too few digits, too many digits, lowercase, glued to a word
        assert!(ids("T123 T12345 t1059 XT1059 T1059_x").is_empty());
    }

    #[test]
    fn short_sub_technique_suffix_falls_back_to_parent() {
        assert_eq!(ids("T1059.01"), ["T1059"]);
        assert_eq!(ids("T1059.0012"), ["T1059"]);
    }

    #[test]
    fn matches_inside_punctuation_and_json() {
        let text = r#"{"ids":["T1003","T1071.001"]} (T1105); File Hash: abc MITRE ATT&CK: TA0002, T1003"#;
        assert_eq!(ids(text), ["T1003", "T1071.001", "T1105"]);
    }
}
