//! Chat-completions client (OpenAI-compatible `/chat/completions`).

use mitrelens_shared::{
    Capability, ChatMessage, GatewayConfig, MitreLensError, RemoteErrorKind, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::http::{endpoint, require_key, send_json};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub(crate) async fn generate_completion(
    client: &Client,
    config: &GatewayConfig,
    messages: &[ChatMessage],
) -> Result<String> {
    if messages.is_empty() {
        return Err(MitreLensError::invalid_input("no messages to complete"));
    }

    let key = require_key(Capability::Completion, config.completion_api_key.as_deref())?;
    let url = endpoint(&config.completion_url, "chat/completions");
    let request = CompletionRequest {
        model: &config.completion_model,
        messages,
        max_tokens: config.max_tokens,
    };
    debug!(%url, model = %config.completion_model, messages = messages.len(), "requesting completion");

    let body: CompletionResponse = send_json(
        Capability::Completion,
        client.post(&url).bearer_auth(key).json(&request),
    )
    .await?;

    body.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| {
            MitreLensError::remote(
                Capability::Completion,
                RemoteErrorKind::MalformedResponse,
                "response contained no message content",
            )
        })
}
