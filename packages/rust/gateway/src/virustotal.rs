//! Reputation database client: file behaviour trees and domain verdicts.

use std::sync::LazyLock;

use mitrelens_shared::{
    Capability, GatewayConfig, MitreLensError, RemoteErrorKind, ReputationDetail,
    ReputationVerdict, Result,
};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::http::{endpoint, require_key, send_json};

/// Placeholder for a tactic or technique node without an identifier.
pub const MISSING_ID: &str = "N/A";

static SCHEME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("scheme regex"));

/// Strip a leading `http://` or `https://` (and any trailing slash) so the
/// reputation database sees a bare domain.
pub fn strip_scheme(input: &str) -> &str {
    let trimmed = input.trim();
    let without_scheme = match SCHEME_RE.find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    without_scheme.trim_end_matches('/')
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MitreTreesResponse {
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SandboxTree {
    #[serde(default)]
    tactics: Vec<TacticNode>,
}

#[derive(Debug, Deserialize)]
struct TacticNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    techniques: Vec<TechniqueNode>,
}

#[derive(Debug, Deserialize)]
struct TechniqueNode {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomainResponse {
    data: DomainData,
}

#[derive(Debug, Deserialize)]
struct DomainData {
    attributes: DomainAttributes,
}

#[derive(Debug, Deserialize)]
struct DomainAttributes {
    last_analysis_stats: AnalysisStats,
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisStats {
    #[serde(default)]
    malicious: u64,
    #[serde(default)]
    suspicious: u64,
    #[serde(default)]
    harmless: u64,
    #[serde(default)]
    undetected: u64,
    #[serde(default)]
    timeout: u64,
}

impl AnalysisStats {
    fn total(&self) -> u64 {
        self.malicious + self.suspicious + self.harmless + self.undetected + self.timeout
    }
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

pub(crate) async fn lookup_file(
    client: &Client,
    config: &GatewayConfig,
    hash: &str,
) -> Result<ReputationDetail> {
    let hash = hash.trim();
    if hash.is_empty() || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MitreLensError::invalid_input(format!(
            "not a hex content hash: {hash:?}"
        )));
    }

    let key = require_key(Capability::FileReputation, config.virustotal_api_key.as_deref())?;
    let url = endpoint(
        &config.virustotal_url,
        &format!("files/{hash}/behaviour_mitre_trees"),
    );
    debug!(%url, "querying file behaviour");

    let body: MitreTreesResponse = send_json(
        Capability::FileReputation,
        client
            .get(&url)
            .header("x-apikey", key)
            .header("accept", "application/json"),
    )
    .await?;

    let technique_ids = flatten_tree(body, &config.sandbox)?;
    Ok(ReputationDetail {
        subject: hash.to_string(),
        technique_ids,
    })
}

/// Flatten `data.{sandbox}.tactics[].techniques[]` into one id list, each
/// tactic followed by its techniques.
fn flatten_tree(mut body: MitreTreesResponse, sandbox: &str) -> Result<Vec<String>> {
    let Some(section) = body.data.remove(sandbox) else {
        debug!(sandbox, "no behaviour report for sandbox");
        return Ok(Vec::new());
    };

    let tree: SandboxTree = serde_json::from_value(section).map_err(|e| {
        MitreLensError::remote(
            Capability::FileReputation,
            RemoteErrorKind::MalformedResponse,
            format!("{sandbox} section: {e}"),
        )
    })?;

    let mut ids = Vec::new();
    for tactic in tree.tactics {
        ids.push(id_or_missing(tactic.id));
        ids.extend(tactic.techniques.into_iter().map(|t| id_or_missing(t.id)));
    }
    Ok(ids)
}

fn id_or_missing(id: Option<String>) -> String {
    id.filter(|s| !s.is_empty())
        .unwrap_or_else(|| MISSING_ID.to_string())
}

pub(crate) async fn lookup_domain(
    client: &Client,
    config: &GatewayConfig,
    domain: &str,
) -> Result<ReputationVerdict> {
    let bare = strip_scheme(domain);
    if bare.is_empty() {
        return Err(MitreLensError::invalid_input("empty domain"));
    }

    let key = require_key(Capability::DomainReputation, config.virustotal_api_key.as_deref())?;
    let url = endpoint(&config.virustotal_url, &format!("domains/{bare}"));
    debug!(%url, "querying domain reputation");

    let body: DomainResponse = send_json(
        Capability::DomainReputation,
        client
            .get(&url)
            .header("x-apikey", key)
            .header("accept", "application/json"),
    )
    .await?;

    let stats = body.data.attributes.last_analysis_stats;
    Ok(ReputationVerdict::new(
        bare,
        stats.malicious,
        stats.total(),
        config.malicious_threshold,
    ))
}
