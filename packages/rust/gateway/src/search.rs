//! Web search client (Bing Web Search v7 response shape).

use mitrelens_shared::{Capability, GatewayConfig, MitreLensError, Result, SearchHit};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::http::{require_key, send_json};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    name: String,
    url: String,
}

pub(crate) async fn web_search(
    client: &Client,
    config: &GatewayConfig,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Err(MitreLensError::invalid_input("empty search query"));
    }
    if limit == 0 {
        return Ok(Vec::new());
    }

    let key = require_key(Capability::WebSearch, config.search_api_key.as_deref())?;
    debug!(limit, "searching the web");

    let body: SearchResponse = send_json(
        Capability::WebSearch,
        client
            .get(config.search_url.as_str())
            .header("Ocp-Apim-Subscription-Key", key)
            .query(&[("q", query.to_string()), ("count", limit.to_string())]),
    )
    .await?;

    let hits = body
        .web_pages
        .map(|pages| pages.value)
        .unwrap_or_default()
        .into_iter()
        .take(limit)
        .map(|page| SearchHit {
            title: page.name,
            url: page.url,
        })
        .collect();

    Ok(hits)
}
