//! Retrieval-augmented conversation session.

use std::sync::Arc;

use chrono::Utc;
use mitrelens_gateway::IntelGateway;
use mitrelens_shared::{
    ChatMessage, ConversationMessage, HistoryRecord, MitreLensError, ProtocolRole, Result,
    SearchHit, SessionId,
};
use tracing::{debug, info, instrument, warn};

/// Reply shown when search or completion fails.
pub const APOLOGY: &str = "Sorry, there was an error processing your request.";

/// Where a turn currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingSearch,
    AwaitingCompletion,
}

/// A chat session owning its live view and its append-only history.
///
/// The live view holds every displayed message, including orchestrator output
/// pushed with [`push_display`](Self::push_display). The history records one
/// entry per turn whose search succeeded.
pub struct ConversationSession {
    id: SessionId,
    gateway: Arc<dyn IntelGateway>,
    search_limit: usize,
    messages: Vec<ConversationMessage>,
    // Unbounded: grows for the life of the session.
    history: Vec<HistoryRecord>,
    state: TurnState,
}

impl ConversationSession {
    pub fn new(gateway: Arc<dyn IntelGateway>, search_limit: usize) -> Self {
        Self {
            id: SessionId::new(),
            gateway,
            search_limit,
            messages: Vec::new(),
            history: Vec::new(),
            state: TurnState::Idle,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn history(&self) -> &[HistoryRecord] {
        &self.history
    }

    /// Add an orchestrator-authored message to the live view.
    ///
    /// It takes part in later prompts but is never recorded in the history.
    pub fn push_display(&mut self, message: ConversationMessage) {
        self.messages.push(message);
    }

    /// Run one chat turn and return the reply that was appended.
    ///
    /// Empty text is rejected before any remote call. Remote failures do not
    /// surface as errors: the reply is then [`APOLOGY`].
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn send(&mut self, text: &str) -> Result<ConversationMessage> {
        if text.trim().is_empty() {
            return Err(MitreLensError::invalid_input("message is empty"));
        }

        self.messages.push(ConversationMessage::user(text));

        let reply = match self.turn(text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "chat turn failed");
                ConversationMessage::assistant(APOLOGY)
            }
        };
        self.state = TurnState::Idle;

        self.messages.push(reply.clone());
        Ok(reply)
    }

    async fn turn(&mut self, text: &str) -> Result<ConversationMessage> {
        self.state = TurnState::AwaitingSearch;
        let hits = self.gateway.web_search(text, self.search_limit).await?;
        debug!(hits = hits.len(), "search resolved");

        self.history.push(HistoryRecord {
            user_message: text.to_string(),
            search_results: hits.clone(),
            recorded_at: Utc::now(),
        });

        self.state = TurnState::AwaitingCompletion;
        let payload = build_payload(&self.messages, text, &hits);
        let answer = self.gateway.generate_completion(&payload).await?;

        info!(references = hits.len(), "reply generated");
        Ok(ConversationMessage::assistant_with_references(answer, hits))
    }

    /// The history record at `index`.
    pub fn get_history_entry(&self, index: i64) -> Result<&HistoryRecord> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.history.get(i))
            .ok_or_else(|| {
                MitreLensError::invalid_input(format!(
                    "history index {index} out of range (0..{})",
                    self.history.len()
                ))
            })
    }
}

/// The live view with normalized roles (ending with the new user turn), then
/// the search results, then the user's text restated.
fn build_payload(
    conversation: &[ConversationMessage],
    text: &str,
    hits: &[SearchHit],
) -> Vec<ChatMessage> {
    let results = serde_json::to_string(hits).unwrap_or_else(|_| "[]".to_string());

    conversation
        .iter()
        .map(ConversationMessage::to_chat_message)
        .chain([
            ChatMessage::new(ProtocolRole::System, format!("Search results: {results}")),
            ChatMessage::new(ProtocolRole::User, text),
        ])
        .collect()
}
