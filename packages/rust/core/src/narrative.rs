//! Evidence aggregation: turns gateway payloads into display text.
//!
//! Every string the orchestrator shows for a capability result (or failure)
//! is built here so the wording stays in one place.

use std::fmt::Display;

use mitrelens_extract::extract_technique_ids;
use mitrelens_shared::{
    GeneratedLog, IncidentGrade, PredictedTechniques, ReputationDetail, ReputationVerdict,
    TechniqueDetail, TechniqueFrequency, TechniqueId, join_ids,
};

/// Shown for a graded incident whose prediction carried no usable ids.
const NO_IDS: &str = "unavailable";

/// Compose the narrative for a generated log.
///
/// A no-incident grade never carries a technique claim, whatever `ids` holds.
pub fn compose_narrative(
    log_summary: Option<&str>,
    grade: IncidentGrade,
    ids: &[TechniqueId],
) -> String {
    narrative_with_fallback(log_summary, grade, ids, None)
}

/// Like [`compose_narrative`], but a graded incident without ids shows
/// `fallback` (the generator's own wording) instead of `unavailable`.
fn narrative_with_fallback(
    log_summary: Option<&str>,
    grade: IncidentGrade,
    ids: &[TechniqueId],
    fallback: Option<&str>,
) -> String {
    let mut lines = Vec::with_capacity(3);
    if let Some(summary) = log_summary.filter(|s| !s.trim().is_empty()) {
        lines.push(summary.trim().to_string());
    }
    lines.push(format!("Predicted Incident Grade is: {grade}"));

    if grade.is_no_incident() {
        lines.push("No Prediction for MITRE ATT&CK".to_string());
    } else if ids.is_empty() {
        let shown = fallback.map(str::trim).filter(|f| !f.is_empty()).unwrap_or(NO_IDS);
        lines.push(format!("Predicted MITRE ATT&CK is: {shown}"));
    } else {
        lines.push(format!("Predicted MITRE ATT&CK is: {}", join_ids(ids)));
    }

    lines.join("\n")
}

/// One-line summary of a generated log.
///
/// Built from the structured frame only, and never includes technique ids so
/// the narrative's technique claim stays governed by the grade.
pub fn summarize_log(log: &GeneratedLog) -> String {
    let field = |name: &str| {
        log.data_frame
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty() && extract_technique_ids(s).is_empty())
    };

    let mut summary = format!("Generated log ({} fields)", log.data_frame.len());
    if let Some(category) = field("Category") {
        summary.push_str(&format!(", category {category}"));
    }
    if let Some(timestamp) = field("Timestamp") {
        summary.push_str(&format!(", at {timestamp}"));
    }
    summary
}

/// Technique ids predicted for a generated log.
pub fn predicted_ids(log: &GeneratedLog) -> Vec<TechniqueId> {
    match &log.attack_technique {
        Some(PredictedTechniques::Ids(ids)) => extract_technique_ids(&ids.join(" ")),
        Some(PredictedTechniques::Note(note)) => extract_technique_ids(note),
        None => Vec::new(),
    }
}

/// The generator's prediction as it reported it, when it gave anything.
fn predicted_text(log: &GeneratedLog) -> Option<String> {
    match &log.attack_technique {
        Some(PredictedTechniques::Ids(ids)) => {
            let shown: Vec<&str> = ids
                .iter()
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .collect();
            (!shown.is_empty()).then(|| shown.join(", "))
        }
        Some(PredictedTechniques::Note(note)) => Some(note.clone()),
        None => None,
    }
}

/// Narrative for a generated log, as shown by the single check and stage 1.
pub fn log_narrative(log: &GeneratedLog) -> String {
    let summary = summarize_log(log);
    narrative_with_fallback(
        Some(&summary),
        log.incident_grade,
        &predicted_ids(log),
        predicted_text(log).as_deref(),
    )
}

// ---------------------------------------------------------------------------
// Capability fragments
// ---------------------------------------------------------------------------

pub fn log_error(err: &impl Display) -> String {
    format!("Failed to fetch log data: {err}")
}

pub fn frequency_fragment(freq: &TechniqueFrequency) -> String {
    let ids: Vec<&str> = freq.ids().collect();
    format!(
        "MITRE ATT&CK Data: {} techniques found:\n{}",
        freq.len(),
        ids.join(", ")
    )
}

pub fn frequency_error(err: &impl Display) -> String {
    format!("Failed to fetch MITRE ATT&CK data: {err}")
}

pub fn file_fragment(name: &str, detail: &ReputationDetail) -> String {
    format!(
        "File Name: {name}\nFile Hash: {}\nMITRE ATT&CK: {}",
        detail.subject,
        detail.technique_ids.join(", ")
    )
}

pub fn file_error(name: &str, err: &impl Display) -> String {
    format!("Error processing file {name}: {err}")
}

pub fn domain_fragment(verdict: &ReputationVerdict) -> String {
    if verdict.is_safe {
        format!("{} is safe", verdict.subject)
    } else {
        format!("{} is not safe", verdict.subject)
    }
}

pub fn domain_error(err: &impl Display) -> String {
    format!("Error checking URL: {err}")
}

/// `ID: .., Name: .., Description: .., Kill Chain Phases: chain - phase, ..`
pub fn technique_line(detail: &TechniqueDetail) -> String {
    let phases: Vec<String> = detail
        .kill_chain_phases
        .iter()
        .map(|p| format!("{} - {}", p.kill_chain_name, p.phase_name))
        .collect();
    let phases = if phases.is_empty() {
        "N/A".to_string()
    } else {
        phases.join(", ")
    };

    format!(
        "ID: {}, Name: {}, Description: {}, Kill Chain Phases: {phases}",
        detail.attack_id,
        detail.name,
        detail.description.trim()
    )
}
