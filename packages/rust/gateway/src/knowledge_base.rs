//! Technique knowledge base service: synthetic logs, technique frequency,
//! technique details, and defensive suggestions.

use std::collections::HashMap;

use mitrelens_shared::{
    Capability, GatewayConfig, GeneratedLog, MitreLensError, RemoteErrorKind, Result,
    TechniqueDetail, TechniqueFrequency, TechniqueId, join_ids,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{endpoint, send_json};

#[derive(Debug, Serialize)]
struct SearchAttackIdRequest {
    /// Comma-separated ids, e.g. `"T1059, T1566.001"`.
    ids: String,
}

#[derive(Debug, Serialize)]
struct SuggestRequest<'a> {
    attack_ids: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    suggestions: String,
}

pub(crate) async fn generate_log(client: &Client, config: &GatewayConfig) -> Result<GeneratedLog> {
    let url = endpoint(&config.knowledge_base_url, "generate-log");
    debug!(%url, "generating log");
    send_json(Capability::LogGeneration, client.get(&url)).await
}

pub(crate) async fn technique_frequency(
    client: &Client,
    config: &GatewayConfig,
) -> Result<TechniqueFrequency> {
    let url = endpoint(&config.knowledge_base_url, "predict-attack-technique");
    debug!(%url, "fetching technique frequency");
    let counts: HashMap<String, u64> =
        send_json(Capability::TechniqueFrequency, client.get(&url)).await?;
    Ok(TechniqueFrequency::from_counts(counts))
}

pub(crate) async fn technique_details(
    client: &Client,
    config: &GatewayConfig,
    ids: &[TechniqueId],
) -> Result<Vec<TechniqueDetail>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let url = endpoint(&config.knowledge_base_url, "search-attackid");
    let request = SearchAttackIdRequest { ids: join_ids(ids) };
    debug!(%url, ids = %request.ids, "looking up technique details");

    match send_json(Capability::TechniqueDetails, client.post(&url).json(&request)).await {
        Ok(details) => Ok(details),
        // The service answers 404 when none of the ids are known.
        Err(MitreLensError::Remote {
            kind: RemoteErrorKind::NotFound,
            ..
        }) => Ok(Vec::new()),
        Err(e) => Err(e),
    }
}

pub(crate) async fn suggest_defenses(
    client: &Client,
    config: &GatewayConfig,
    ids: &[TechniqueId],
) -> Result<String> {
    if ids.is_empty() {
        return Err(MitreLensError::invalid_input(
            "at least one technique id is required for suggestions",
        ));
    }

    let url = endpoint(&config.knowledge_base_url, "suggest-d3fend");
    let request = SuggestRequest {
        attack_ids: ids.iter().map(TechniqueId::as_str).collect(),
    };
    debug!(%url, count = ids.len(), "requesting defensive suggestions");

    let body: SuggestResponse =
        send_json(Capability::DefensiveSuggestion, client.post(&url).json(&request)).await?;
    Ok(body.suggestions)
}
