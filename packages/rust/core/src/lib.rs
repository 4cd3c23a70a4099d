//! Core enrichment logic for MitreLens.
//!
//! - [`narrative`]: display text for gateway results
//! - [`orchestrator`]: single check and the automate workflow
//! - [`session`]: retrieval-augmented chat

pub mod narrative;
pub mod orchestrator;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use narrative::compose_narrative;
pub use orchestrator::{
    AUTOMATION_FAILED, AutomationProgress, AutomationReport, EnrichmentResult, Orchestrator,
    SUGGESTION_FAILED, SilentAutomationProgress,
};
pub use session::{APOLOGY, ConversationSession, TurnState};
