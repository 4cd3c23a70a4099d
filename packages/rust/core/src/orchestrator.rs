//! Enrichment orchestration: the single check and the four-stage automate
//! workflow, plus ad-hoc reputation, cross-reference, and defense lookups.

use std::sync::Arc;

use mitrelens_extract::extract_technique_ids;
use mitrelens_gateway::IntelGateway;
use mitrelens_shared::{
    AutomationConfig, ChatMessage, ConversationMessage, IncidentGrade, MitreLensError,
    ProtocolRole, ReputationDetail, ReputationVerdict, Result, TechniqueDetail,
    TechniqueFrequency, TechniqueId, join_ids,
};
use tracing::{debug, info, instrument, warn};

use crate::narrative;

/// Shown when defensive suggestions cannot be fetched.
pub const SUGGESTION_FAILED: &str = "An error occurred while fetching D3FEND suggestions.";

/// Shown when the automate workflow fails outside the fail-soft branches.
pub const AUTOMATION_FAILED: &str = "An error occurred during automation.";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Everything one orchestration invocation learned. Any part may be missing
/// when its upstream call failed.
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResult {
    pub log_summary: Option<String>,
    pub incident_grade: Option<IncidentGrade>,
    pub technique_frequency: Option<TechniqueFrequency>,
    pub file_reputation: Option<ReputationDetail>,
    pub domain_verdict: Option<ReputationVerdict>,
    /// Ids extracted from the combined stage-1 text, first-seen order.
    pub technique_ids: Vec<TechniqueId>,
    pub technique_details: Vec<TechniqueDetail>,
    pub defensive_suggestions: Option<String>,
}

/// Output of [`Orchestrator::run_full_automation`].
#[derive(Debug, Clone, Default)]
pub struct AutomationReport {
    /// Display messages in emission order.
    pub messages: Vec<ConversationMessage>,
    pub result: EnrichmentResult,
}

// ---------------------------------------------------------------------------
// Progress trait
// ---------------------------------------------------------------------------

/// Progress callback for the automate workflow.
pub trait AutomationProgress: Send + Sync {
    /// Called when entering a stage.
    fn stage(&self, name: &str);
    /// Called as soon as a display message is produced.
    fn emitted(&self, message: &ConversationMessage);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentAutomationProgress;

impl AutomationProgress for SilentAutomationProgress {
    fn stage(&self, _name: &str) {}
    fn emitted(&self, _message: &ConversationMessage) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives gateway calls and turns their outcomes into display messages.
///
/// Every invocation issues fresh remote calls; nothing is cached.
pub struct Orchestrator {
    gateway: Arc<dyn IntelGateway>,
    automation: AutomationConfig,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn IntelGateway>, automation: AutomationConfig) -> Self {
        Self {
            gateway,
            automation,
        }
    }

    /// Generate one log and narrate it.
    ///
    /// A failed generation yields the error text; nothing partial is made up.
    #[instrument(skip_all)]
    pub async fn run_single_check(&self) -> ConversationMessage {
        match self.gateway.generate_log().await {
            Ok(log) => {
                info!(grade = %log.incident_grade, "log generated");
                ConversationMessage::system(narrative::log_narrative(&log))
            }
            Err(e) => {
                warn!(error = %e, "log generation failed");
                ConversationMessage::system(narrative::log_error(&e))
            }
        }
    }

    /// Run the four-stage automate workflow.
    ///
    /// 1. Log, technique frequency, file, and domain lookups, concurrently
    /// 2. Extract technique ids from the combined stage-1 text
    /// 3. Cross-reference those ids
    /// 4. Ask for defensive suggestions
    ///
    /// Stages 3 and 4 are skipped when stage 2 finds nothing. Never fails:
    /// errors end up as display messages.
    #[instrument(skip_all, fields(artifact = %self.automation.artifact_name, domain = %self.automation.domain))]
    pub async fn run_full_automation(&self, progress: &dyn AutomationProgress) -> AutomationReport {
        let mut report = AutomationReport::default();

        if let Err(e) = self.automate(progress, &mut report).await {
            warn!(error = %e, "automation aborted");
            emit(
                progress,
                &mut report.messages,
                ConversationMessage::system(AUTOMATION_FAILED),
            );
        }

        info!(messages = report.messages.len(), "automation finished");
        report
    }

    async fn automate(
        &self,
        progress: &dyn AutomationProgress,
        report: &mut AutomationReport,
    ) -> Result<()> {
        let AutomationConfig {
            artifact_name,
            artifact_sha256,
            domain,
        } = &self.automation;
        let result = &mut report.result;

        // --- Stage 1: independent lookups ---
        progress.stage("Gathering evidence");
        let gw = self.gateway.as_ref();
        let (log, frequency, file, verdict) = tokio::join!(
            gw.generate_log(),
            gw.technique_frequency(),
            gw.lookup_file_reputation(artifact_sha256),
            gw.lookup_domain_reputation(domain),
        );

        let log_text = match log {
            Ok(log) => {
                result.log_summary = Some(narrative::summarize_log(&log));
                result.incident_grade = Some(log.incident_grade);
                narrative::log_narrative(&log)
            }
            Err(e) => {
                warn!(error = %e, "log branch failed");
                narrative::log_error(&e)
            }
        };
        let frequency_text = match frequency {
            Ok(freq) => {
                let text = narrative::frequency_fragment(&freq);
                result.technique_frequency = Some(freq);
                text
            }
            Err(e) => {
                warn!(error = %e, "technique frequency branch failed");
                narrative::frequency_error(&e)
            }
        };
        let file_text = match file {
            Ok(detail) => {
                let text = narrative::file_fragment(artifact_name, &detail);
                result.file_reputation = Some(detail);
                text
            }
            Err(e) => {
                warn!(error = %e, "file branch failed");
                narrative::file_error(artifact_name, &e)
            }
        };
        let domain_text = match verdict {
            Ok(verdict) => {
                let text = narrative::domain_fragment(&verdict);
                result.domain_verdict = Some(verdict);
                text
            }
            Err(e) => {
                warn!(error = %e, "domain branch failed");
                narrative::domain_error(&e)
            }
        };

        let combined = [log_text, frequency_text, file_text, domain_text].join("\n");
        emit(
            progress,
            &mut report.messages,
            ConversationMessage::system(combined.as_str()),
        );

        // --- Stage 2: extraction ---
        progress.stage("Extracting technique ids");
        let ids = extract_technique_ids(&combined);
        info!(count = ids.len(), ids = %join_ids(&ids), "technique ids extracted");
        report.result.technique_ids = ids.clone();

        if ids.is_empty() {
            debug!("no technique ids, skipping cross-reference and suggestions");
            return Ok(());
        }

        // --- Stage 3: cross-reference ---
        progress.stage("Cross-referencing techniques");
        let details = self.gateway.lookup_technique_details(&ids).await?;
        if let Some(message) = cross_reference_message(&details) {
            emit(progress, &mut report.messages, message);
        }
        report.result.technique_details = details;

        // --- Stage 4: suggestions ---
        progress.stage("Fetching defensive suggestions");
        let message = match self.gateway.suggest_defensive_techniques(&ids).await {
            Ok(suggestions) => {
                report.result.defensive_suggestions = Some(suggestions.clone());
                ConversationMessage::system_assistant(suggestions)
            }
            Err(e) => {
                warn!(error = %e, "defensive suggestions failed");
                ConversationMessage::system(SUGGESTION_FAILED)
            }
        };
        emit(progress, &mut report.messages, message);

        Ok(())
    }

    /// Look up a file hash and describe the result like stage 1 does.
    #[instrument(skip_all, fields(name = %name))]
    pub async fn check_file(&self, name: &str, sha256: &str) -> ConversationMessage {
        let text = match self.gateway.lookup_file_reputation(sha256).await {
            Ok(detail) => narrative::file_fragment(name, &detail),
            Err(e) => narrative::file_error(name, &e),
        };
        ConversationMessage::system(text)
    }

    /// Look up a domain or URL and describe the verdict like stage 1 does.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn check_domain(&self, url: &str) -> ConversationMessage {
        let text = match self.gateway.lookup_domain_reputation(url).await {
            Ok(verdict) => narrative::domain_fragment(&verdict),
            Err(e) => narrative::domain_error(&e),
        };
        ConversationMessage::system(text)
    }

    /// Extract ids from `text` and describe each known one.
    ///
    /// Returns `Ok(None)` without calling out when `text` has no ids or none
    /// of them are known.
    #[instrument(skip_all)]
    pub async fn cross_reference(&self, text: &str) -> Result<Option<ConversationMessage>> {
        let ids = extract_technique_ids(text);
        if ids.is_empty() {
            return Ok(None);
        }
        let details = self.gateway.lookup_technique_details(&ids).await?;
        Ok(cross_reference_message(&details))
    }

    /// Ask the generative model about a D3FEND technique related to `query`.
    #[instrument(skip_all)]
    pub async fn describe_defense(&self, query: &str) -> Result<String> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MitreLensError::invalid_input("empty defense query"));
        }
        let prompt = format!(
            "Describe a defensive technique from the D3FEND framework related to: {query}"
        );
        self.gateway
            .generate_completion(&[ChatMessage::new(ProtocolRole::User, prompt)])
            .await
    }
}

fn cross_reference_message(details: &[TechniqueDetail]) -> Option<ConversationMessage> {
    if details.is_empty() {
        return None;
    }
    let lines: Vec<String> = details.iter().map(narrative::technique_line).collect();
    Some(ConversationMessage::system_assistant(lines.join("\n")))
}

fn emit(
    progress: &dyn AutomationProgress,
    messages: &mut Vec<ConversationMessage>,
    message: ConversationMessage,
) {
    progress.emitted(&message);
    messages.push(message);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use mitrelens_shared::{ReputationDetail, ReputationVerdict, Role};

    use super::*;
    use crate::testing::{Call, FakeGateway, detail, generated_log};

    fn automation() -> AutomationConfig {
        AutomationConfig {
            artifact_name: "eicar.com".into(),
            artifact_sha256: "275a021b".into(),
            domain: "google.com".into(),
        }
    }

    fn orchestrator(fake: &Arc<FakeGateway>) -> Orchestrator {
        Orchestrator::new(fake.clone(), automation())
    }

    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl AutomationProgress for RecordingProgress {
        fn stage(&self, name: &str) {
            self.events.lock().unwrap().push(format!("stage:{name}"));
        }
        fn emitted(&self, message: &ConversationMessage) {
            self.events
                .lock()
                .unwrap()
                .push(format!("emitted:{:?}", message.role));
        }
    }

    // -- single check ------------------------------------------------------

    #[tokio::test]
    async fn single_check_narrates_generated_log() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::TruePositive, &["T1059", "T1566.001"])),
            ..Default::default()
        });

        let message = orchestrator(&fake).run_single_check().await;
        assert_eq!(message.role, Role::System);
        assert!(message.content.contains("Predicted Incident Grade is: TruePositive"));
        assert!(message.content.ends_with("Predicted MITRE ATT&CK is: T1059, T1566.001"));
        assert_eq!(fake.calls(), [Call::GenerateLog]);
    }

    #[tokio::test]
    async fn single_check_false_positive_has_no_technique_claim() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::FalsePositive, &["T1059"])),
            ..Default::default()
        });

        let message = orchestrator(&fake).run_single_check().await;
        assert!(message.content.ends_with("No Prediction for MITRE ATT&CK"));
        assert!(!message.content.contains("T1059"));
    }

    #[tokio::test]
    async fn single_check_reports_generation_failure() {
        let fake = Arc::new(FakeGateway::default());
        let message = orchestrator(&fake).run_single_check().await;
        assert!(message.content.starts_with("Failed to fetch log data: "));
        assert!(!message.content.contains("Predicted"));
    }

    // -- full automation ---------------------------------------------------

    #[tokio::test]
    async fn all_stage_one_failures_yield_only_error_fragments() {
        let fake = Arc::new(FakeGateway::default());
        let report = orchestrator(&fake)
            .run_full_automation(&SilentAutomationProgress)
            .await;

        assert_eq!(report.messages.len(), 1);
        let lines: Vec<&str> = report.messages[0].content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Failed to fetch log data: "));
        assert!(lines[1].starts_with("Failed to fetch MITRE ATT&CK data: "));
        assert!(lines[2].starts_with("Error processing file eicar.com: "));
        assert!(lines[3].starts_with("Error checking URL: "));

        assert!(report.result.technique_ids.is_empty());
        assert_eq!(fake.count(|c| matches!(c, Call::Details(_))), 0);
        assert_eq!(fake.count(|c| matches!(c, Call::Suggest(_))), 0);
    }

    #[tokio::test]
    async fn extracted_ids_feed_exactly_one_lookup_and_one_suggestion() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::TruePositive, &["T1059"])),
            file: Some(ReputationDetail {
                subject: "275a021b".into(),
                technique_ids: vec!["TA0001".into(), "T1566.001".into(), "T1059".into()],
            }),
            domain: Some(ReputationVerdict::new("google.com", 0, 90, 0)),
            details: Some(vec![
                detail("T1059", "Command and Scripting Interpreter"),
                detail("T1566.001", "Spearphishing Attachment"),
            ]),
            suggestions: Some("D3-EAL Executable Allowlisting".into()),
            ..Default::default()
        });

        let report = orchestrator(&fake)
            .run_full_automation(&SilentAutomationProgress)
            .await;

        let expected = vec!["T1059".to_string(), "T1566.001".to_string()];
        let ids: Vec<String> = report
            .result
            .technique_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(ids, expected);

        let details: Vec<Call> = fake
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Details(_)))
            .collect();
        assert_eq!(details, [Call::Details(expected.clone())]);
        let suggests: Vec<Call> = fake
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Suggest(_)))
            .collect();
        assert_eq!(suggests, [Call::Suggest(expected)]);

        assert_eq!(report.messages.len(), 3);
        assert_eq!(report.messages[0].role, Role::System);
        assert!(report.messages[0].content.contains("google.com is safe"));
        assert_eq!(report.messages[1].role, Role::SystemAssistant);
        assert_eq!(report.messages[1].content.lines().count(), 2);
        assert!(report.messages[1].content.starts_with("ID: T1059, Name: Command and Scripting Interpreter"));
        assert_eq!(report.messages[2].role, Role::SystemAssistant);
        assert_eq!(report.messages[2].content, "D3-EAL Executable Allowlisting");
        assert_eq!(
            report.result.defensive_suggestions.as_deref(),
            Some("D3-EAL Executable Allowlisting")
        );
    }

    #[tokio::test]
    async fn stage_one_fragments_follow_declaration_order() {
        let fake = Arc::new(FakeGateway {
            frequency: Some(TechniqueFrequency::from_counts([("T1078".to_string(), 4)])),
            domain: Some(ReputationVerdict::new("google.com", 2, 90, 0)),
            details: Some(vec![]),
            suggestions: Some("x".into()),
            ..Default::default()
        });

        let report = orchestrator(&fake)
            .run_full_automation(&SilentAutomationProgress)
            .await;
        let first = &report.messages[0].content;
        let log_at = first.find("Failed to fetch log data").unwrap();
        let freq_at = first.find("MITRE ATT&CK Data: 1 techniques found").unwrap();
        let file_at = first.find("Error processing file").unwrap();
        let domain_at = first.find("google.com is not safe").unwrap();
        assert!(log_at < freq_at && freq_at < file_at && file_at < domain_at);
    }

    #[tokio::test]
    async fn suggestion_failure_keeps_earlier_messages() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::TruePositive, &["T1059"])),
            details: Some(vec![detail("T1059", "Command and Scripting Interpreter")]),
            ..Default::default()
        });

        let report = orchestrator(&fake)
            .run_full_automation(&SilentAutomationProgress)
            .await;

        assert_eq!(report.messages.len(), 3);
        assert_eq!(report.messages[1].role, Role::SystemAssistant);
        assert_eq!(report.messages[2].content, SUGGESTION_FAILED);
        assert!(report.result.defensive_suggestions.is_none());
    }

    #[tokio::test]
    async fn cross_reference_failure_degrades_to_generic_message() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::TruePositive, &["T1059"])),
            suggestions: Some("unused".into()),
            ..Default::default()
        });

        let report = orchestrator(&fake)
            .run_full_automation(&SilentAutomationProgress)
            .await;

        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1].content, AUTOMATION_FAILED);
        assert_eq!(fake.count(|c| matches!(c, Call::Suggest(_))), 0);
    }

    #[tokio::test]
    async fn progress_sees_stages_and_emissions_in_order() {
        let fake = Arc::new(FakeGateway {
            log: Some(generated_log(IncidentGrade::TruePositive, &["T1059"])),
            details: Some(vec![detail("T1059", "Command and Scripting Interpreter")]),
            suggestions: Some("s".into()),
            ..Default::default()
        });
        let progress = RecordingProgress::default();

        orchestrator(&fake).run_full_automation(&progress).await;

        let events = progress.events.lock().unwrap().clone();
        assert_eq!(
            events,
            [
                "stage:Gathering evidence",
                "emitted:System",
                "stage:Extracting technique ids",
                "stage:Cross-referencing techniques",
                "emitted:SystemAssistant",
                "stage:Fetching defensive suggestions",
                "emitted:SystemAssistant",
            ]
        );
    }

    // -- ad-hoc lookups ----------------------------------------------------

    #[tokio::test]
    async fn check_domain_passes_url_through() {
        let fake = Arc::new(FakeGateway {
            domain: Some(ReputationVerdict::new("example.com", 0, 80, 0)),
            ..Default::default()
        });
        let message = orchestrator(&fake).check_domain("https://example.com").await;
        assert_eq!(message.content, "example.com is safe");
        assert_eq!(fake.calls(), [Call::Domain("https://example.com".into())]);
    }

    #[tokio::test]
    async fn check_file_reports_errors_inline() {
        let fake = Arc::new(FakeGateway::default());
        let message = orchestrator(&fake).check_file("report.pdf", "abcd").await;
        assert!(message.content.starts_with("Error processing file report.pdf: "));
    }

    #[tokio::test]
    async fn cross_reference_without_ids_makes_no_call() {
        let fake = Arc::new(FakeGateway::default());
        let message = orchestrator(&fake)
            .cross_reference("nothing to see, T123")
            .await
            .unwrap();
        assert!(message.is_none());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn describe_defense_sends_single_prompt() {
        let fake = Arc::new(FakeGateway {
            completion: Some("Use D3-PSA Process Spawn Analysis.".into()),
            ..Default::default()
        });
        let answer = orchestrator(&fake)
            .describe_defense("PowerShell abuse")
            .await
            .unwrap();
        assert_eq!(answer, "Use D3-PSA Process Spawn Analysis.");
        assert_eq!(
            fake.calls(),
            [Call::Completion(vec![ChatMessage::new(
                ProtocolRole::User,
                "Describe a defensive technique from the D3FEND framework related to: PowerShell abuse"
            )])]
        );

        let err = orchestrator(&fake).describe_defense("  ").await.unwrap_err();
        assert!(matches!(err, MitreLensError::InvalidInput { .. }));
    }
}
