//! Remote intelligence gateway for MitreLens.
//!
//! [`IntelGateway`] gives one async operation per remote capability. Each
//! call is bounded in time by the HTTP client timeout, never retries, and
//! reports failures as a remote error tagged with the capability and a
//! [`RemoteErrorKind`](mitrelens_shared::RemoteErrorKind).
//!
//! [`HttpGateway`] is the production implementation backed by the
//! reputation database, the technique knowledge base service, a web search
//! API, and an OpenAI-compatible chat-completions API.

mod completion;
mod http;
mod knowledge_base;
mod search;
mod virustotal;

use async_trait::async_trait;
use mitrelens_shared::{
    ChatMessage, GatewayConfig, GeneratedLog, ReputationDetail, ReputationVerdict, Result,
    SearchHit, TechniqueDetail, TechniqueFrequency, TechniqueId,
};
use reqwest::Client;
use tracing::instrument;

pub use virustotal::{MISSING_ID, strip_scheme};

// ---------------------------------------------------------------------------
// Capability trait
// ---------------------------------------------------------------------------

/// One operation per remote intelligence capability.
///
/// Implementations hold no mutable state, so calls may run concurrently.
#[async_trait]
pub trait IntelGateway: Send + Sync {
    /// Flattened tactic/technique ids from the behaviour report of a content hash.
    async fn lookup_file_reputation(&self, hash: &str) -> Result<ReputationDetail>;

    /// Safe/unsafe verdict for a domain. A leading scheme is stripped first.
    async fn lookup_domain_reputation(&self, domain: &str) -> Result<ReputationVerdict>;

    /// Observation counts per technique id.
    async fn technique_frequency(&self) -> Result<TechniqueFrequency>;

    /// A synthetic, graded log record.
    async fn generate_log(&self) -> Result<GeneratedLog>;

    /// Details for each known id; unknown ids are omitted.
    async fn lookup_technique_details(&self, ids: &[TechniqueId]) -> Result<Vec<TechniqueDetail>>;

    /// Free-text defensive technique suggestions for `ids`.
    async fn suggest_defensive_techniques(&self, ids: &[TechniqueId]) -> Result<String>;

    /// Complete a fully assembled message sequence.
    async fn generate_completion(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Top `limit` web results for `query`.
    async fn web_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// [`IntelGateway`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = http::build_client(config.timeout)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl IntelGateway for HttpGateway {
    #[instrument(skip_all, fields(hash = %hash))]
    async fn lookup_file_reputation(&self, hash: &str) -> Result<ReputationDetail> {
        virustotal::lookup_file(&self.client, &self.config, hash).await
    }

    #[instrument(skip_all, fields(domain = %domain))]
    async fn lookup_domain_reputation(&self, domain: &str) -> Result<ReputationVerdict> {
        virustotal::lookup_domain(&self.client, &self.config, domain).await
    }

    async fn technique_frequency(&self) -> Result<TechniqueFrequency> {
        knowledge_base::technique_frequency(&self.client, &self.config).await
    }

    async fn generate_log(&self) -> Result<GeneratedLog> {
        knowledge_base::generate_log(&self.client, &self.config).await
    }

    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn lookup_technique_details(&self, ids: &[TechniqueId]) -> Result<Vec<TechniqueDetail>> {
        knowledge_base::technique_details(&self.client, &self.config, ids).await
    }

    #[instrument(skip_all, fields(ids = ids.len()))]
    async fn suggest_defensive_techniques(&self, ids: &[TechniqueId]) -> Result<String> {
        knowledge_base::suggest_defenses(&self.client, &self.config, ids).await
    }

    #[instrument(skip_all, fields(messages = messages.len()))]
    async fn generate_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        completion::generate_completion(&self.client, &self.config, messages).await
    }

    #[instrument(skip_all, fields(limit = limit))]
    async fn web_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        search::web_search(&self.client, &self.config, query, limit).await
    }
}
