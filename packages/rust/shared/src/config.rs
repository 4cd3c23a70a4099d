//! Application configuration for MitreLens.
//!
//! User config lives at `~/.mitrelens/mitrelens.toml`.
//! API keys are never stored in the file: it names the environment
//! variables that hold them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{MitreLensError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mitrelens.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mitrelens";

// ---------------------------------------------------------------------------
// Config structs (matching mitrelens.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service endpoints.
    #[serde(default)]
    pub services: ServicesConfig,

    /// Env var names for API keys.
    #[serde(default)]
    pub keys: KeysConfig,

    /// Generative model settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Reputation verdict settings.
    #[serde(default)]
    pub reputation: ReputationConfig,

    /// Fixed subjects for the automate workflow.
    #[serde(default)]
    pub automation: AutomationSection,

    /// Chat settings.
    #[serde(default)]
    pub chat: ChatConfig,
}

/// `[services]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Technique knowledge base / log generator service.
    #[serde(default = "default_knowledge_base_url")]
    pub knowledge_base_url: String,

    /// Reputation database API root.
    #[serde(default = "default_virustotal_url")]
    pub virustotal_url: String,

    /// Web search endpoint.
    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Chat-completions API root.
    #[serde(default = "default_completion_url")]
    pub completion_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            knowledge_base_url: default_knowledge_base_url(),
            virustotal_url: default_virustotal_url(),
            search_url: default_search_url(),
            completion_url: default_completion_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_knowledge_base_url() -> String {
    "http://127.0.0.1:5000".into()
}
fn default_virustotal_url() -> String {
    "https://www.virustotal.com/api/v3".into()
}
fn default_search_url() -> String {
    "https://api.bing.microsoft.com/v7.0/search".into()
}
fn default_completion_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[keys]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysConfig {
    #[serde(default = "default_virustotal_key_env")]
    pub virustotal_api_key_env: String,

    #[serde(default = "default_search_key_env")]
    pub search_api_key_env: String,

    #[serde(default = "default_completion_key_env")]
    pub completion_api_key_env: String,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            virustotal_api_key_env: default_virustotal_key_env(),
            search_api_key_env: default_search_key_env(),
            completion_api_key_env: default_completion_key_env(),
        }
    }
}

fn default_virustotal_key_env() -> String {
    "VIRUSTOTAL_API_KEY".into()
}
fn default_search_key_env() -> String {
    "BING_API_KEY".into()
}
fn default_completion_key_env() -> String {
    "OPENAI_API_KEY".into()
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: None,
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".into()
}

/// `[reputation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Highest malicious-engine count still considered safe.
    #[serde(default)]
    pub malicious_threshold: u64,

    /// Sandbox section of the behaviour report to flatten.
    #[serde(default = "default_sandbox")]
    pub sandbox: String,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            malicious_threshold: 0,
            sandbox: default_sandbox(),
        }
    }
}

fn default_sandbox() -> String {
    "CAPE Sandbox".into()
}

/// `[automation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationSection {
    #[serde(default = "default_artifact_name")]
    pub artifact_name: String,

    #[serde(default = "default_artifact_sha256")]
    pub artifact_sha256: String,

    #[serde(default = "default_domain")]
    pub domain: String,
}

impl Default for AutomationSection {
    fn default() -> Self {
        Self {
            artifact_name: default_artifact_name(),
            artifact_sha256: default_artifact_sha256(),
            domain: default_domain(),
        }
    }
}

fn default_artifact_name() -> String {
    "eicar.com".into()
}
fn default_artifact_sha256() -> String {
    // EICAR anti-malware test file.
    "275a021bbfb6489e54d471899f7db9d1663fc695ec2fe2a2c4538aabf651fd0f".into()
}
fn default_domain() -> String {
    "google.com".into()
}

/// `[chat]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of web results injected into each prompt.
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    5
}

// ---------------------------------------------------------------------------
// Runtime configs (resolved from AppConfig + environment)
// ---------------------------------------------------------------------------

/// Runtime gateway configuration with parsed URLs and resolved API keys.
#[derive(Clone)]
pub struct GatewayConfig {
    pub knowledge_base_url: Url,
    pub virustotal_url: Url,
    pub search_url: Url,
    pub completion_url: Url,
    pub timeout: Duration,
    pub virustotal_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub completion_api_key: Option<String>,
    pub completion_model: String,
    pub max_tokens: Option<u32>,
    pub malicious_threshold: u64,
    pub sandbox: String,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("knowledge_base_url", &self.knowledge_base_url.as_str())
            .field("virustotal_url", &self.virustotal_url.as_str())
            .field("search_url", &self.search_url.as_str())
            .field("completion_url", &self.completion_url.as_str())
            .field("timeout", &self.timeout)
            .field("virustotal_api_key", &redacted(&self.virustotal_api_key))
            .field("search_api_key", &redacted(&self.search_api_key))
            .field("completion_api_key", &redacted(&self.completion_api_key))
            .field("completion_model", &self.completion_model)
            .field("max_tokens", &self.max_tokens)
            .field("malicious_threshold", &self.malicious_threshold)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

fn redacted(key: &Option<String>) -> &'static str {
    if key.is_some() { "<set>" } else { "<unset>" }
}

impl TryFrom<&AppConfig> for GatewayConfig {
    type Error = MitreLensError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            knowledge_base_url: parse_url("knowledge_base_url", &config.services.knowledge_base_url)?,
            virustotal_url: parse_url("virustotal_url", &config.services.virustotal_url)?,
            search_url: parse_url("search_url", &config.services.search_url)?,
            completion_url: parse_url("completion_url", &config.services.completion_url)?,
            timeout: Duration::from_secs(config.services.timeout_secs),
            virustotal_api_key: read_key(&config.keys.virustotal_api_key_env),
            search_api_key: read_key(&config.keys.search_api_key_env),
            completion_api_key: read_key(&config.keys.completion_api_key_env),
            completion_model: config.completion.model.clone(),
            max_tokens: config.completion.max_tokens,
            malicious_threshold: config.reputation.malicious_threshold,
            sandbox: config.reputation.sandbox.clone(),
        })
    }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
    Url::parse(value)
        .map_err(|e| MitreLensError::config(format!("invalid services.{field} {value:?}: {e}")))
}

fn read_key(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.is_empty())
}

/// Fixed subjects checked by the automate workflow.
#[derive(Debug, Clone)]
pub struct AutomationConfig {
    pub artifact_name: String,
    pub artifact_sha256: String,
    pub domain: String,
}

impl From<&AppConfig> for AutomationConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            artifact_name: config.automation.artifact_name.clone(),
            artifact_sha256: config.automation.artifact_sha256.clone(),
            domain: config.automation.domain.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// `~/.mitrelens/`, which holds the service endpoints and key variable names.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MitreLensError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// `~/.mitrelens/mitrelens.toml`.
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load `mitrelens.toml`, falling back to the built-in endpoints (local
/// knowledge base, VirusTotal v3, Bing, OpenAI) when the file is absent.
///
/// API keys are never read here; [`GatewayConfig::try_from`] reads them from
/// the environment variables the file names.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load a MitreLens config file. Missing sections and fields take their
/// defaults, so a file may set only e.g. `[automation] domain`.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MitreLensError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MitreLensError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write the default `mitrelens.toml` (replacing any existing one) so the
/// endpoints, thresholds and automation artifact can be edited in place.
/// Returns the written path.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MitreLensError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MitreLensError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MitreLensError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Names of API key env vars that are unset or empty.
///
/// Missing keys are not fatal: calls to the affected capability fail soft
/// with an unauthorized error.
pub fn missing_api_keys(config: &AppConfig) -> Vec<String> {
    [
        &config.keys.virustotal_api_key_env,
        &config.keys.search_api_key_env,
        &config.keys.completion_api_key_env,
    ]
    .into_iter()
    .filter(|name| read_key(name).is_none())
    .cloned()
    .collect()
}
