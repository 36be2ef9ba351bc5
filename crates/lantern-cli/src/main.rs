//! CLI for running lantern UI verification suites.
//!
//! Suites are YAML or JSON files of scenarios. They run against a WebDriver or
//! Appium server, either on one shared session or on one session per
//! scenario.
//!
//! # Usage
//!
//! ```bash
//! # Run a suite against the default server (http://localhost:4723)
//! lantern run suites/hello_world.yaml
//!
//! # Run every suite in a directory, only the device scenarios, best-effort
//! lantern run 'suites/*.yaml' --scenario 'device-*' --policy best-effort
//!
//! # Override a suite variable and keep screenshots of failed steps
//! lantern run suites/hello_world.yaml --var version=13 --capture-on-failure
//!
//! # Four scenarios at a time, each on its own session
//! lantern run suites/hello_world.yaml --jobs 4
//!
//! # Check suite files without connecting
//! lantern validate suites/*.yaml
//! lantern list suites/hello_world.yaml
//!
//! # Show the contexts of a running app session
//! lantern -w http://device-farm:4723 --capabilities android.json contexts
//!
//! # Print the effective configuration
//! lantern config
//! ```

mod format;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use lantern_core::backend::AutomationBackend;
use lantern_core::config::LanternConfig;
use lantern_core::context::glob_match;
use lantern_core::policy::PolicyMode;
use lantern_core::report::{FailureCategory, SuiteReport};
use lantern_core::report_log::{ReportLog, RunEvent};
use lantern_core::runner::SuiteRunner;
use lantern_core::suite::Suite;
use lantern_core::webdriver::{WebDriverBackend, WebDriverSessions};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CLI for running lantern UI verification suites.
#[derive(Parser)]
#[command(name = "lantern")]
#[command(about = "Run UI verification scenarios against web pages and hybrid app web views")]
#[command(version)]
struct Cli {
    /// WebDriver / Appium server URL
    #[arg(short, long, env = "LANTERN_WEBDRIVER_URL")]
    webdriver_url: Option<String>,

    /// Base URL that relative navigate targets are resolved against
    #[arg(short, long, env = "LANTERN_BASE_URL")]
    base_url: Option<String>,

    /// JSON file with the session capabilities
    #[arg(long)]
    capabilities: Option<PathBuf>,

    /// Config file to use instead of ~/.lantern/config.json
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run scenario suites
    Run(RunArgs),

    /// Load and check suite files without running them
    Validate {
        /// Suite files or glob patterns
        #[arg(required = true)]
        suites: Vec<String>,
        /// Set a suite variable (repeatable)
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,
    },

    /// List the scenarios of suite files
    List {
        /// Suite files or glob patterns
        #[arg(required = true)]
        suites: Vec<String>,
    },

    /// Connect and list the contexts of the session
    Contexts,

    /// Print the effective configuration
    Config,

    /// Generate shell completions
    Completions {
        shell: Shell,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Suite files or glob patterns
    #[arg(required = true)]
    suites: Vec<String>,

    /// Failure policy for every scenario: fail-fast or best-effort
    #[arg(short, long)]
    policy: Option<PolicyMode>,

    /// Only run scenarios whose name matches (wildcards allowed, repeatable)
    #[arg(short, long = "scenario")]
    scenarios: Vec<String>,

    /// Set a suite variable (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Default wait timeout in milliseconds
    #[arg(short, long, env = "LANTERN_TIMEOUT")]
    timeout: Option<u64>,

    /// Run up to this many scenarios at once, each on its own session
    #[arg(short, long, default_value = "1")]
    jobs: usize,

    /// Take a screenshot after every failed step
    #[arg(long)]
    capture_on_failure: bool,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "lantern.log".into());
            let file_appender = tracing_appender::rolling::never(dir, name);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[derive(Debug)]
enum CliError {
    /// Scenarios ran and the app did not behave as expected.
    Failures(String),
    /// The automation itself broke: connection, transport, cancellation.
    Automation(String),
    /// Suite files or configuration could not be loaded.
    Suite(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::Failures(_) => ExitCode::from(1),
            CliError::Automation(_) => ExitCode::from(2),
            CliError::Suite(_) => ExitCode::from(3),
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Failures(msg) => write!(f, "Scenario failures: {}", msg),
            CliError::Automation(msg) => write!(f, "Automation failure: {}", msg),
            CliError::Suite(msg) => write!(f, "Suite error: {}", msg),
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run_suites(&cli, args).await,
        Command::Validate { suites, vars } => validate(&cli, suites, vars),
        Command::List { suites } => list(&cli, suites),
        Command::Contexts => contexts(&cli).await,
        Command::Config => {
            let config = effective_config(&cli)?;
            let json = serde_json::to_value(&config).map_err(|e| CliError::Suite(e.to_string()))?;
            println!("{:#}", json);
            Ok(())
        }
        Command::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "lantern", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Config file, then environment and flags on top.
fn effective_config(cli: &Cli) -> Result<LanternConfig, CliError> {
    let mut config = match &cli.config_file {
        Some(path) => LanternConfig::load_from(path),
        None => LanternConfig::load(),
    }
    .map_err(|e| CliError::Suite(e.to_string()))?;

    if let Some(url) = &cli.webdriver_url {
        config.webdriver_url = url.clone();
    }
    if let Some(url) = &cli.base_url {
        config.base_url = Some(url.clone());
    }
    if let Some(path) = &cli.capabilities {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CliError::Suite(format!("cannot read {}: {}", path.display(), e)))?;
        let capabilities: serde_json::Value = serde_json::from_str(&contents)
            .map_err(|e| CliError::Suite(format!("invalid capabilities in {}: {}", path.display(), e)))?;
        if !capabilities.is_object() {
            return Err(CliError::Suite(format!(
                "capabilities in {} must be a JSON object",
                path.display()
            )));
        }
        config.capabilities = capabilities;
    }
    Ok(config)
}

/// Expands glob patterns into suite file paths. Plain paths pass through
/// unchanged so a missing file is reported by the loader.
fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>, CliError> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }
        let matches: Vec<PathBuf> = glob::glob(pattern)
            .map_err(|e| CliError::Suite(format!("invalid pattern '{}': {}", pattern, e)))?
            .filter_map(Result::ok)
            .collect();
        if matches.is_empty() {
            return Err(CliError::Suite(format!("no suite files match '{}'", pattern)));
        }
        paths.extend(matches);
    }
    Ok(paths)
}

fn load_suite(path: &Path, overrides: &BTreeMap<String, String>) -> Result<Suite, CliError> {
    Suite::from_path(path)
        .and_then(|suite| suite.resolve(overrides))
        .map_err(|e| CliError::Suite(format!("{}: {}", path.display(), e)))
}

/// Loads every suite and narrows them to the scenarios matching `scenarios`.
///
/// Each pattern must match a scenario in at least one suite; suites left
/// without scenarios are dropped.
fn load_suites(patterns: &[String], vars: &[(String, String)], scenarios: &[String]) -> Result<Vec<Suite>, CliError> {
    let overrides: BTreeMap<String, String> = vars.iter().cloned().collect();
    let suites = expand_paths(patterns)?
        .iter()
        .map(|path| load_suite(path, &overrides))
        .collect::<Result<Vec<_>, _>>()?;

    if scenarios.is_empty() {
        return Ok(suites);
    }
    for pattern in scenarios {
        let known = suites
            .iter()
            .flat_map(|suite| &suite.scenarios)
            .any(|scenario| glob_match(pattern, &scenario.name));
        if !known {
            return Err(CliError::Suite(format!("no scenario matches '{}'", pattern)));
        }
    }

    let mut selected = Vec::new();
    for suite in suites {
        let local: Vec<String> = scenarios
            .iter()
            .filter(|p| suite.scenarios.iter().any(|s| glob_match(p, &s.name)))
            .cloned()
            .collect();
        if local.is_empty() {
            continue;
        }
        selected.push(suite.select(&local).map_err(|e| CliError::Suite(e.to_string()))?);
    }
    Ok(selected)
}

async fn connect(config: &LanternConfig) -> Result<WebDriverBackend, CliError> {
    WebDriverBackend::connect(&config.webdriver())
        .await
        .map_err(|e| CliError::Automation(format!("cannot connect to {}: {}", config.webdriver_url, e)))
}

/// Prints step progress to stderr until the suite finishes.
fn spawn_progress(log: &ReportLog) -> JoinHandle<()> {
    let mut rx = log.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(entry) => {
                    if let Some(line) = format::progress_line(&entry) {
                        eprintln!("{}", line);
                    }
                    if matches!(entry.event, RunEvent::SuiteFinished { .. }) {
                        break;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn run_suites(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let config = effective_config(cli)?;
    let suites = load_suites(&args.suites, &args.vars, &args.scenarios)?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping at the next step");
            interrupt.cancel();
        }
    });

    let mut shared: Option<Arc<dyn AutomationBackend>> = None;
    let mut reports = Vec::with_capacity(suites.len());

    for suite in &suites {
        let log = ReportLog::new(&suite.name);
        let progress = (!cli.quiet && cli.format == OutputFormat::Text).then(|| spawn_progress(&log));

        let mut runner = SuiteRunner::new(config.policy.clone())
            .with_options(config.run_options())
            .with_cancellation(cancel.clone())
            .with_report_log(log.clone());
        if let Some(mode) = args.policy {
            runner = runner.with_mode(mode);
        }
        if args.capture_on_failure {
            runner = runner.with_capture_on_failure(true);
        }
        if let Some(ms) = args.timeout {
            runner = runner.with_wait_timeout(Duration::from_millis(ms));
        }

        let report = if args.jobs > 1 {
            let sessions = Arc::new(WebDriverSessions::new(config.webdriver()));
            runner.run_isolated(suite, sessions, args.jobs).await
        } else {
            let backend = match &shared {
                Some(backend) if backend.is_connected() => backend.clone(),
                _ => {
                    let backend: Arc<dyn AutomationBackend> = Arc::new(connect(&config).await?);
                    shared = Some(backend.clone());
                    backend
                }
            };
            runner.run(suite, backend).await
        };

        if let Some(handle) = progress {
            handle.await.ok();
        }
        if let Some(path) = log.path() {
            info!(suite = %suite.name, path = %path.display(), "report log written");
        }
        if cli.format == OutputFormat::Text {
            println!("{}", format::suite_report(&report));
        }
        reports.push(report);
    }

    if let Some(backend) = shared {
        if let Err(e) = backend.quit().await {
            warn!(error = %e, "failed to close session");
        }
    }

    if cli.format == OutputFormat::Json {
        let passed = reports.iter().all(SuiteReport::passed);
        println!("{:#}", serde_json::json!({ "passed": passed, "suites": reports }));
    }

    verdict(&reports)
}

/// Maps suite results onto an error carrying the exit code.
fn verdict(reports: &[SuiteReport]) -> Result<(), CliError> {
    let total: usize = reports.iter().map(|r| r.scenarios.len()).sum();
    let failed: usize = reports.iter().map(|r| r.summary().failed).sum();
    if failed == 0 {
        return Ok(());
    }

    let message = format!("{} of {} scenarios failed", failed, total);
    if reports
        .iter()
        .any(|r| r.worst_category() == Some(FailureCategory::Automation))
    {
        Err(CliError::Automation(message))
    } else {
        Err(CliError::Failures(message))
    }
}

fn validate(cli: &Cli, patterns: &[String], vars: &[(String, String)]) -> Result<(), CliError> {
    let overrides: BTreeMap<String, String> = vars.iter().cloned().collect();
    let paths = expand_paths(patterns)?;

    let mut results = Vec::with_capacity(paths.len());
    let mut invalid = 0;
    for path in &paths {
        match load_suite(path, &overrides) {
            Ok(suite) => {
                if cli.format == OutputFormat::Text && !cli.quiet {
                    println!("ok {} ({}: {} scenarios)", path.display(), suite.name, suite.scenarios.len());
                }
                results.push(serde_json::json!({
                    "path": path,
                    "valid": true,
                    "suite": suite.name,
                    "scenarios": suite.scenarios.len(),
                }));
            }
            Err(e) => {
                invalid += 1;
                if cli.format == OutputFormat::Text {
                    eprintln!("{}", e);
                }
                results.push(serde_json::json!({
                    "path": path,
                    "valid": false,
                    "error": e.to_string(),
                }));
            }
        }
    }

    if cli.format == OutputFormat::Json {
        println!("{:#}", serde_json::json!({ "suites": results }));
    }

    if invalid > 0 {
        return Err(CliError::Suite(format!("{} of {} suite files are invalid", invalid, paths.len())));
    }
    Ok(())
}

fn list(cli: &Cli, patterns: &[String]) -> Result<(), CliError> {
    let suites = load_suites(patterns, &[], &[])?;

    if cli.format == OutputFormat::Json {
        let listing: Vec<_> = suites
            .iter()
            .map(|suite| {
                serde_json::json!({
                    "name": suite.name,
                    "description": suite.description,
                    "scenarios": suite.scenarios.iter().map(|s| serde_json::json!({
                        "name": s.name,
                        "title": s.title,
                        "steps": s.steps.len(),
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        println!("{:#}", serde_json::json!({ "suites": listing }));
    } else {
        for suite in &suites {
            println!("{}", format::suite_listing(suite));
        }
    }
    Ok(())
}

async fn contexts(cli: &Cli) -> Result<(), CliError> {
    let config = effective_config(cli)?;
    let backend = connect(&config).await?;

    let listed = async {
        let contexts = backend.list_contexts().await?;
        let current = backend.current_context().await?;
        Ok::<_, lantern_core::backend::BackendError>((contexts, current))
    }
    .await;
    if let Err(e) = backend.quit().await {
        warn!(error = %e, "failed to close session");
    }
    let (contexts, current) = listed.map_err(|e| CliError::Automation(e.to_string()))?;

    if cli.format == OutputFormat::Json {
        let names: Vec<&str> = contexts.iter().map(|c| c.as_str()).collect();
        println!("{:#}", serde_json::json!({ "contexts": names, "current": current.as_str() }));
    } else {
        for context in &contexts {
            let marker = if *context == current { "*" } else { " " };
            println!("{} {}", marker, context);
        }
    }
    Ok(())
}
