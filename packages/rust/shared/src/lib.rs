//! Shared types, error model, and configuration for MitreLens.
//!
//! This crate is the foundation depended on by all other MitreLens crates.
//! It provides:
//! - [`MitreLensError`], the unified error type
//! - Domain types ([`TechniqueId`], [`ConversationMessage`], [`ReputationVerdict`], ...)
//! - Configuration ([`AppConfig`], [`GatewayConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AutomationConfig, AutomationSection, ChatConfig, CompletionConfig, GatewayConfig,
    KeysConfig, ReputationConfig, ServicesConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from, missing_api_keys,
};
pub use error::{Capability, ErrorKind, MitreLensError, RemoteErrorKind, Result};
pub use types::{
    ChatMessage, ConversationMessage, GeneratedLog, HistoryRecord, IncidentGrade, KillChainPhase,
    PredictedTechniques, ProtocolRole, ReputationDetail, ReputationVerdict, Role, SearchHit,
    SessionId, TechniqueDetail, TechniqueFrequency, TechniqueId, join_ids,
};
