//! Core domain types shared by the gateway, orchestrator, and session.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MitreLensError;

// ---------------------------------------------------------------------------
// TechniqueId
// ---------------------------------------------------------------------------

/// Matches a whole technique identifier: `T####` or `T####.###`.
static TECHNIQUE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^T\d{4}(?:\.\d{3})?$").expect("technique id regex"));

/// A validated ATT&CK technique identifier such as `T1059` or `T1566.001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TechniqueId(String);

impl TechniqueId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TechniqueId {
    type Err = MitreLensError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if TECHNIQUE_ID_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(MitreLensError::invalid_input(format!(
                "not a technique identifier: {s:?}"
            )))
        }
    }
}

impl TryFrom<String> for TechniqueId {
    type Error = MitreLensError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TechniqueId> for String {
    fn from(id: TechniqueId) -> Self {
        id.0
    }
}

impl fmt::Display for TechniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Join technique identifiers with `", "`.
pub fn join_ids(ids: &[TechniqueId]) -> String {
    ids.iter()
        .map(TechniqueId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Roles & messages
// ---------------------------------------------------------------------------

/// Display role of a conversation message.
///
/// `SystemAssistant` marks orchestrator-authored system output in the live
/// view; the generative model never sees it (see [`Role::to_protocol`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    User,
    Assistant,
    System,
    SystemAssistant,
}

/// Role vocabulary understood by the generative model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolRole {
    User,
    Assistant,
    System,
}

impl Role {
    /// Map to the protocol vocabulary. `SystemAssistant` becomes `System`.
    pub fn to_protocol(self) -> ProtocolRole {
        match self {
            Self::User => ProtocolRole::User,
            Self::Assistant => ProtocolRole::Assistant,
            Self::System | Self::SystemAssistant => ProtocolRole::System,
        }
    }

    /// Label shown next to a message in the live view.
    pub fn display_label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "MITRE Assistant",
            Self::System => "System",
            Self::SystemAssistant => "System Assistant",
        }
    }
}

/// A single web search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
}

/// A message in the live conversation view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Search results the reply was grounded on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<SearchHit>>,
    /// Number of search results consulted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_hit_count: Option<usize>,
}

impl ConversationMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            references: None,
            search_hit_count: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn system_assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::SystemAssistant, content)
    }

    /// An assistant reply carrying the search results it was grounded on.
    pub fn assistant_with_references(content: impl Into<String>, references: Vec<SearchHit>) -> Self {
        let count = references.len();
        Self {
            role: Role::Assistant,
            content: content.into(),
            references: Some(references),
            search_hit_count: Some(count),
        }
    }

    /// Convert to the protocol payload sent to the generative model.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.to_protocol(),
            content: self.content.clone(),
        }
    }
}

/// A message as sent to the generative model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ProtocolRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ProtocolRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conversation history
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying a conversation session (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One attempted chat turn: the user's text and what the search returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub user_message: String,
    pub search_results: Vec<SearchHit>,
    pub recorded_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Reputation
// ---------------------------------------------------------------------------

/// Safe/unsafe classification of a file hash or domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationVerdict {
    pub subject: String,
    pub malicious_count: u64,
    pub total_engines: u64,
    pub is_safe: bool,
}

impl ReputationVerdict {
    /// `is_safe` holds iff `malicious_count <= threshold`.
    pub fn new(
        subject: impl Into<String>,
        malicious_count: u64,
        total_engines: u64,
        threshold: u64,
    ) -> Self {
        Self {
            subject: subject.into(),
            malicious_count,
            total_engines,
            is_safe: malicious_count <= threshold,
        }
    }
}

/// Flattened tactic/technique identifiers from a file's behaviour report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationDetail {
    /// The content hash that was looked up.
    pub subject: String,
    /// Tactic id followed by its technique ids, in report order; `N/A` where missing.
    pub technique_ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Generated logs & technique data
// ---------------------------------------------------------------------------

/// Incident classification attached to a generated log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncidentGrade {
    BenignPositive,
    /// The no-incident sentinel.
    FalsePositive,
    TruePositive,
    #[serde(other)]
    Unknown,
}

impl IncidentGrade {
    pub fn is_no_incident(self) -> bool {
        matches!(self, Self::FalsePositive)
    }
}

impl fmt::Display for IncidentGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BenignPositive => "BenignPositive",
            Self::FalsePositive => "FalsePositive",
            Self::TruePositive => "TruePositive",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Technique prediction attached to a generated log: either ids or a note
/// from the generator explaining why none were produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictedTechniques {
    Ids(Vec<String>),
    Note(String),
}

/// A synthetic log produced by the log-generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedLog {
    /// Raw log text, one `key: value` per line.
    pub log_data: String,
    /// Structured view of the same record.
    #[serde(default)]
    pub data_frame: serde_json::Map<String, serde_json::Value>,
    pub incident_grade: IncidentGrade,
    #[serde(default)]
    pub attack_technique: Option<PredictedTechniques>,
}

/// Observation counts per technique id, most frequent first (ties by id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TechniqueFrequency(Vec<(String, u64)>);

impl TechniqueFrequency {
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
        entries.sort_by(|(a_id, a), (b_id, b)| b.cmp(a).then_with(|| a_id.cmp(b_id)));
        Self(entries)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(id, _)| id.as_str())
    }
}

/// A kill-chain phase reference on a technique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillChainPhase {
    pub kill_chain_name: String,
    pub phase_name: String,
}

/// Name/description/phase data for one technique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueDetail {
    pub attack_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kill_chain_phases: Vec<KillChainPhase>,
}
