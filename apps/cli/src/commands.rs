//! CLI command definitions, routing, and tracing setup.

use std::path::Path;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use mitrelens_core::{
    AutomationProgress, ConversationSession, EnrichmentResult, Orchestrator,
    SilentAutomationProgress,
};
use mitrelens_gateway::{HttpGateway, IntelGateway};
use mitrelens_shared::{
    AppConfig, AutomationConfig, ConversationMessage, GatewayConfig, init_config, load_config,
    missing_api_keys,
};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// MitreLens: enrich security telemetry with ATT&CK context.
#[derive(Parser)]
#[command(
    name = "mitrelens",
    version,
    about = "Enrich logs, files, and domains with MITRE ATT&CK and D3FEND context.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate one log and narrate its grade and predicted techniques.
    Check,

    /// Run the full automate workflow.
    Automate,

    /// Start an interactive, search-grounded chat.
    Chat,

    /// Hash a local file and look up its behaviour report.
    FileCheck {
        /// File to hash with SHA-256.
        path: String,
    },

    /// Check the reputation of a domain or URL.
    DomainCheck {
        /// Domain or URL (a leading http(s):// is stripped).
        url: String,
    },

    /// Cross-reference the technique ids found in some text.
    Lookup {
        /// Free text containing ids such as T1059 or T1566.001.
        text: String,
    },

    /// Describe a D3FEND defensive technique related to a query.
    Defend {
        /// What to defend against.
        query: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "mitrelens=info",
        1 => "mitrelens=debug",
        _ => "mitrelens=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Check => cmd_check().await,
        Command::Automate => cmd_automate().await,
        Command::Chat => cmd_chat().await,
        Command::FileCheck { path } => cmd_file_check(&path).await,
        Command::DomainCheck { url } => cmd_domain_check(&url).await,
        Command::Lookup { text } => cmd_lookup(&text).await,
        Command::Defend { query } => cmd_defend(&query).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

/// Loaded config plus the gateway built from it.
struct Context {
    config: AppConfig,
    gateway: Arc<dyn IntelGateway>,
}

impl Context {
    fn load() -> Result<Self> {
        let config = load_config()?;

        let missing = missing_api_keys(&config);
        if !missing.is_empty() {
            warn!(
                vars = %missing.join(", "),
                "API key env vars not set; the matching lookups will fail"
            );
        }

        let gateway = HttpGateway::new(GatewayConfig::try_from(&config)?)?;
        Ok(Self {
            config,
            gateway: Arc::new(gateway),
        })
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.gateway.clone(), AutomationConfig::from(&self.config))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_check() -> Result<()> {
    let ctx = Context::load()?;
    let spinner = spinner("Generating log");
    let message = ctx.orchestrator().run_single_check().await;
    spinner.finish_and_clear();
    print_message(&message);
    Ok(())
}

async fn cmd_automate() -> Result<()> {
    let ctx = Context::load()?;
    let automation = AutomationConfig::from(&ctx.config);
    info!(
        artifact = %automation.artifact_name,
        domain = %automation.domain,
        "starting automation"
    );

    let reporter = CliProgress::new();
    let report = ctx.orchestrator().run_full_automation(&reporter).await;
    reporter.finish();

    info!(
        ids = report.result.technique_ids.len(),
        details = report.result.technique_details.len(),
        "automation complete"
    );
    println!("{}", render_summary(&report.result));
    Ok(())
}

/// Closing recap of what the automate run learned.
fn render_summary(result: &EnrichmentResult) -> String {
    fn or_failed<T>(value: Option<T>, show: impl FnOnce(T) -> String) -> String {
        value.map(show).unwrap_or_else(|| "failed".to_string())
    }

    let mut lines = vec!["Automation summary:".to_string()];
    lines.push(format!(
        "  log:        {}",
        or_failed(result.log_summary.as_deref(), str::to_string)
    ));
    lines.push(format!(
        "  grade:      {}",
        or_failed(result.incident_grade, |g| g.to_string())
    ));
    lines.push(format!(
        "  frequency:  {}",
        or_failed(result.technique_frequency.as_ref(), |f| {
            if f.is_empty() {
                "no techniques observed".to_string()
            } else {
                format!("{} techniques", f.len())
            }
        })
    ));
    lines.push(format!(
        "  file:       {}",
        or_failed(result.file_reputation.as_ref(), |d| {
            format!("{} ({} ids)", d.subject, d.technique_ids.len())
        })
    ));
    lines.push(format!(
        "  domain:     {}",
        or_failed(result.domain_verdict.as_ref(), |v| {
            let safety = if v.is_safe { "safe" } else { "not safe" };
            format!(
                "{} {safety} ({}/{} engines malicious)",
                v.subject, v.malicious_count, v.total_engines
            )
        })
    ));
    lines.push(format!(
        "  techniques: {} cross-referenced of {} extracted",
        result.technique_details.len(),
        result.technique_ids.len()
    ));
    lines.join("\n")
}

async fn cmd_file_check(path: &str) -> Result<()> {
    let path = Path::new(path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| eyre!("cannot read {}: {e}", path.display()))?;
    let hash = format!("{:x}", Sha256::digest(&bytes));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let ctx = Context::load()?;
    let spinner = spinner("Looking up file reputation");
    let message = ctx.orchestrator().check_file(&name, &hash).await;
    spinner.finish_and_clear();
    print_message(&message);
    Ok(())
}

async fn cmd_domain_check(url: &str) -> Result<()> {
    let ctx = Context::load()?;
    let spinner = spinner("Checking domain");
    let message = ctx.orchestrator().check_domain(url).await;
    spinner.finish_and_clear();
    print_message(&message);
    Ok(())
}

async fn cmd_lookup(text: &str) -> Result<()> {
    let ctx = Context::load()?;
    match ctx.orchestrator().cross_reference(text).await? {
        Some(message) => print_message(&message),
        None => println!("No known MITRE ATT&CK technique ids found."),
    }
    Ok(())
}

async fn cmd_defend(query: &str) -> Result<()> {
    let ctx = Context::load()?;
    let spinner = spinner("Asking the model");
    let answer = ctx.orchestrator().describe_defense(query).await;
    spinner.finish_and_clear();
    println!("{}", answer?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Chat REPL
// ---------------------------------------------------------------------------

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Message(String),
    History(Option<i64>),
    Check,
    Automate,
    Quit,
    Empty,
    Unknown(String),
}

fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    if !line.starts_with('/') {
        return ChatInput::Message(line.to_string());
    }

    let mut parts = line.split_whitespace();
    match parts.next().unwrap_or_default() {
        "/quit" | "/exit" => ChatInput::Quit,
        "/check" => ChatInput::Check,
        "/automate" => ChatInput::Automate,
        "/history" => ChatInput::History(parts.next().and_then(|n| n.parse().ok())),
        other => ChatInput::Unknown(other.to_string()),
    }
}

async fn cmd_chat() -> Result<()> {
    let ctx = Context::load()?;
    let orchestrator = ctx.orchestrator();
    let mut session = ConversationSession::new(ctx.gateway.clone(), ctx.config.chat.search_limit);
    info!(session = %session.id(), "chat session started");

    println!("MitreLens chat. Commands: /check, /automate, /history N, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("> ");
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_chat_input(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Unknown(cmd) => println!("Unknown command: {cmd}"),
            ChatInput::History(None) => {
                println!("{} recorded turn(s). Usage: /history N", session.history().len());
            }
            ChatInput::History(Some(index)) => match session.get_history_entry(index) {
                Ok(record) => println!("{}", serde_json::to_string_pretty(record)?),
                Err(e) => println!("{e}"),
            },
            ChatInput::Check => {
                let message = orchestrator.run_single_check().await;
                print_message(&message);
                session.push_display(message);
            }
            ChatInput::Automate => {
                let report = orchestrator
                    .run_full_automation(&SilentAutomationProgress)
                    .await;
                for message in report.messages {
                    print_message(&message);
                    session.push_display(message);
                }
            }
            ChatInput::Message(text) => {
                let spinner = spinner("Thinking");
                let reply = session.send(&text).await;
                spinner.finish_and_clear();
                match reply {
                    Ok(reply) => print_message(&reply),
                    Err(e) => println!("{e}"),
                }
            }
        }
    }

    info!(turns = session.history().len(), "chat session ended");
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn print_message(message: &ConversationMessage) {
    println!("{}", render_message(message));
}

fn render_message(message: &ConversationMessage) -> String {
    let mut out = format!("[{}]\n{}", message.role.display_label(), message.content);

    if let Some(references) = message.references.as_deref().filter(|r| !r.is_empty()) {
        let count = message.search_hit_count.unwrap_or(references.len());
        out.push_str(&format!("\n\nReferences ({count}):"));
        for hit in references {
            out.push_str(&format!("\n  - {} <{}>", hit.title, hit.url));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("spinner template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(message.to_string());
    spinner
}

/// Automate progress on an indicatif spinner; messages print as they arrive.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        Self {
            spinner: spinner("Starting automation"),
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl AutomationProgress for CliProgress {
    fn stage(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn emitted(&self, message: &ConversationMessage) {
        self.spinner.suspend(|| print_message(message));
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use mitrelens_shared::{
        IncidentGrade, ReputationVerdict, SearchHit, TechniqueFrequency,
    };

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["mitrelens", "-vv", "domain-check", "https://example.com"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::DomainCheck { url } if url == "https://example.com"));
    }

    #[test]
    fn chat_input_parsing() {
        assert_eq!(parse_chat_input("   "), ChatInput::Empty);
        assert_eq!(parse_chat_input("/quit"), ChatInput::Quit);
        assert_eq!(parse_chat_input("/history 2"), ChatInput::History(Some(2)));
        assert_eq!(parse_chat_input("/history -1"), ChatInput::History(Some(-1)));
        assert_eq!(parse_chat_input("/history x"), ChatInput::History(None));
        assert_eq!(parse_chat_input("/automate"), ChatInput::Automate);
        assert_eq!(parse_chat_input("/nope"), ChatInput::Unknown("/nope".into()));
        assert_eq!(
            parse_chat_input(" what is T1059? "),
            ChatInput::Message("what is T1059?".into())
        );
    }

    #[test]
    fn renders_references() {
        let message = ConversationMessage::assistant_with_references(
            "T1059 is scripting abuse.",
            vec![SearchHit {
                title: "T1059".into(),
                url: "https://attack.mitre.org/techniques/T1059/".into(),
            }],
        );
        assert_eq!(
            render_message(&message),
            "[MITRE Assistant]\nT1059 is scripting abuse.\n\nReferences (1):\n  - T1059 <https://attack.mitre.org/techniques/T1059/>"
        );

        let plain = ConversationMessage::system_assistant("ID: T1059");
        assert_eq!(render_message(&plain), "[System Assistant]\nID: T1059");
    }

    #[test]
    fn summary_marks_failed_branches() {
        let result = EnrichmentResult {
            incident_grade: Some(IncidentGrade::TruePositive),
            technique_frequency: Some(TechniqueFrequency::from_counts([])),
            domain_verdict: Some(ReputationVerdict::new("google.com", 0, 89, 0)),
            ..Default::default()
        };
        assert_eq!(
            render_summary(&result),
            "Automation summary:\n  log:        failed\n  grade:      TruePositive\n  frequency:  no techniques observed\n  file:       failed\n  domain:     google.com safe (0/89 engines malicious)\n  techniques: 0 cross-referenced of 0 extracted"
        );
    }
}
