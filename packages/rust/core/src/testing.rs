//! Recording fake of [`IntelGateway`] for orchestrator and session tests.

use std::sync::Mutex;

use async_trait::async_trait;
use mitrelens_gateway::IntelGateway;
use mitrelens_shared::{
    Capability, ChatMessage, GeneratedLog, IncidentGrade, MitreLensError, PredictedTechniques,
    RemoteErrorKind, ReputationDetail, ReputationVerdict, Result, SearchHit, TechniqueDetail,
    TechniqueFrequency, TechniqueId,
};

/// A call observed by [`FakeGateway`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    File(String),
    Domain(String),
    Frequency,
    GenerateLog,
    Details(Vec<String>),
    Suggest(Vec<String>),
    Completion(Vec<ChatMessage>),
    Search(String, usize),
}

/// Canned responses per capability; `None` answers with a network error.
#[derive(Default)]
pub(crate) struct FakeGateway {
    pub log: Option<GeneratedLog>,
    pub frequency: Option<TechniqueFrequency>,
    pub file: Option<ReputationDetail>,
    pub domain: Option<ReputationVerdict>,
    pub details: Option<Vec<TechniqueDetail>>,
    pub suggestions: Option<String>,
    pub completion: Option<String>,
    pub search: Option<Vec<SearchHit>>,
    pub(crate) calls: Mutex<Vec<Call>>,
}

impl FakeGateway {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

fn reply<T: Clone>(capability: Capability, canned: &Option<T>) -> Result<T> {
    canned.clone().ok_or_else(|| {
        MitreLensError::remote(capability, RemoteErrorKind::Network, "connection refused")
    })
}

fn id_strings(ids: &[TechniqueId]) -> Vec<String> {
    ids.iter().map(|id| id.as_str().to_string()).collect()
}

#[async_trait]
impl IntelGateway for FakeGateway {
    async fn lookup_file_reputation(&self, hash: &str) -> Result<ReputationDetail> {
        self.record(Call::File(hash.to_string()));
        reply(Capability::FileReputation, &self.file)
    }

    async fn lookup_domain_reputation(&self, domain: &str) -> Result<ReputationVerdict> {
        self.record(Call::Domain(domain.to_string()));
        reply(Capability::DomainReputation, &self.domain)
    }

    async fn technique_frequency(&self) -> Result<TechniqueFrequency> {
        self.record(Call::Frequency);
        reply(Capability::TechniqueFrequency, &self.frequency)
    }

    async fn generate_log(&self) -> Result<GeneratedLog> {
        self.record(Call::GenerateLog);
        reply(Capability::LogGeneration, &self.log)
    }

    async fn lookup_technique_details(&self, ids: &[TechniqueId]) -> Result<Vec<TechniqueDetail>> {
        self.record(Call::Details(id_strings(ids)));
        reply(Capability::TechniqueDetails, &self.details)
    }

    async fn suggest_defensive_techniques(&self, ids: &[TechniqueId]) -> Result<String> {
        self.record(Call::Suggest(id_strings(ids)));
        reply(Capability::DefensiveSuggestion, &self.suggestions)
    }

    async fn generate_completion(&self, messages: &[ChatMessage]) -> Result<String> {
        self.record(Call::Completion(messages.to_vec()));
        reply(Capability::Completion, &self.completion)
    }

    async fn web_search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        self.record(Call::Search(query.to_string(), limit));
        reply(Capability::WebSearch, &self.search)
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub(crate) fn generated_log(grade: IncidentGrade, ids: &[&str]) -> GeneratedLog {
    GeneratedLog {
        log_data: "Timestamp: 2024-06-04T06:05:15Z\nCategory: Execution".into(),
        data_frame: serde_json::json!({"Category": "Execution"})
            .as_object()
            .cloned()
            .unwrap_or_default(),
        incident_grade: grade,
        attack_technique: Some(PredictedTechniques::Ids(
            ids.iter().map(|s| s.to_string()).collect(),
        )),
    }
}

pub(crate) fn detail(id: &str, name: &str) -> TechniqueDetail {
    TechniqueDetail {
        attack_id: id.into(),
        name: name.into(),
        description: format!("{name} description"),
        kill_chain_phases: vec![mitrelens_shared::KillChainPhase {
            kill_chain_name: "mitre-attack".into(),
            phase_name: "execution".into(),
        }],
    }
}

pub(crate) fn hit(title: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.into(),
        url: url.into(),
    }
}
