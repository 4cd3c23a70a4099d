//! Shared HTTP plumbing: client construction, endpoint joining, and the
//! mapping from transport/status failures onto [`RemoteErrorKind`].

use std::time::Duration;

use mitrelens_shared::{Capability, MitreLensError, RemoteErrorKind, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

/// User-Agent string for outbound requests.
const USER_AGENT: &str = concat!("MitreLens/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to log.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Build a reqwest client with the gateway's bounded-time settings.
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| MitreLensError::config(format!("failed to build HTTP client: {e}")))
}

/// Append `path` to `base`, keeping any path prefix `base` already carries
/// (`Url::join` would drop the last segment of `.../api/v3`).
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Fail with `Unauthorized` when the capability's API key is not configured.
pub(crate) fn require_key(capability: Capability, key: Option<&str>) -> Result<&str> {
    key.ok_or_else(|| {
        MitreLensError::remote(
            capability,
            RemoteErrorKind::Unauthorized,
            "API key is not configured",
        )
    })
}

/// Send a request and decode a JSON body, mapping every failure onto a
/// remote error for `capability`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    capability: Capability,
    request: RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(capability, &e))?;

    let status = response.status();
    debug!(%capability, %status, "response received");

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(capability, status, &body));
    }

    response.json::<T>().await.map_err(|e| {
        if e.is_decode() {
            MitreLensError::remote(capability, RemoteErrorKind::MalformedResponse, e.to_string())
        } else {
            transport_error(capability, &e)
        }
    })
}

fn transport_error(capability: Capability, err: &reqwest::Error) -> MitreLensError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else {
        err.to_string()
    };
    MitreLensError::remote(capability, RemoteErrorKind::Network, message)
}

/// Map a non-success status onto a remote error.
///
/// The body only goes to the debug log. Error messages end up in display
/// text that is later scanned for technique ids, so remote content stays out.
pub(crate) fn status_error(capability: Capability, status: StatusCode, body: &str) -> MitreLensError {
    let kind = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteErrorKind::Unauthorized,
        StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        StatusCode::TOO_MANY_REQUESTS => RemoteErrorKind::RateLimited,
        _ => RemoteErrorKind::Network,
    };

    let snippet: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
    if !snippet.is_empty() {
        debug!(%capability, %status, body = %snippet, "error response body");
    }

    MitreLensError::remote(capability, kind, format!("HTTP {status}"))
}
