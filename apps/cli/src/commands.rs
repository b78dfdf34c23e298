//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{info, warn};

use datalive_control_plane::{ClientOptions, ControlPlane, ControlPlaneClient};
use datalive_core::credentials::build_catalog;
use datalive_core::detector::detect_state;
use datalive_core::prober::wait_until_ready;
use datalive_core::{
    BootstrapOptions, FatalFailure, ProgressReporter, RunReport, render_summary, run_bootstrap,
};
use datalive_shared::{
    AppConfig, FinalPhase, Phase, PhaseRecord, PhaseStatus, ReadinessSettings, init_config,
    process_env, resolve_config,
};
use datalive_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DataLive bootstrap: bring the automation platform to a usable state.
#[derive(Parser)]
#[command(
    name = "datalive-bootstrap",
    version,
    about = "Idempotently initialize the DataLive automation platform: owner, session, license, credentials and workflows.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.datalive/bootstrap.toml).
    #[arg(long, global = true, env = "DATALIVE_BOOTSTRAP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the full bootstrap. Exits 0 when READY, 2 when DEGRADED, 1 when FAILED.
    Run {
        /// Directory of workflow definition files.
        #[arg(long)]
        workflows_dir: Option<PathBuf>,

        /// Where to write the JSON run report.
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Wait for readiness, then print the detected state and its signals.
    Detect,

    /// Wait until the platform answers its liveness endpoint.
    Wait,

    /// Print the credential catalog (names and types only).
    Catalog,

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
    /// Show resolved configuration, secrets redacted.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so stdout stays
/// reserved for command output.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "datalive=info",
        1 => "datalive=debug",
        _ => "datalive=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let spinner = cli.log_format == LogFormat::Text;
    match cli.command {
        Command::Run {
            workflows_dir,
            report,
        } => {
            let mut config = resolve_config(cli.config.as_deref())?;
            if let Some(dir) = workflows_dir {
                config.run.workflows_dir = dir.to_string_lossy().into_owned();
            }
            if let Some(path) = report {
                config.run.report_path = path.to_string_lossy().into_owned();
            }
            cmd_run(&config, spinner).await
        }
        Command::Detect => cmd_detect(&resolve_config(cli.config.as_deref())?).await,
        Command::Wait => cmd_wait(&resolve_config(cli.config.as_deref())?).await,
        Command::Catalog => cmd_catalog(&resolve_config(cli.config.as_deref())?),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&resolve_config(cli.config.as_deref())?),
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(config: &AppConfig, spinner: bool) -> Result<()> {
    let options = BootstrapOptions::from_config(config, &process_env)?;
    let control_plane = connect(config)?;
    let storage = open_storage(config).await;

    info!(
        base_url = %config.platform.base_url,
        workflows_dir = %options.workflows_dir.display(),
        storage = storage.is_some(),
        "starting bootstrap"
    );

    let reporter = CliProgress::new(spinner);
    let report = run_bootstrap(control_plane, storage.as_ref(), &options, &reporter).await;

    println!();
    print!("{}", render_summary(&report));
    if let Some(path) = &options.report_path {
        println!("  report: {}", path.display());
    }
    println!();

    let code = report.final_phase.exit_code();
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

async fn cmd_detect(config: &AppConfig) -> Result<()> {
    let options = BootstrapOptions::from_config(config, &process_env)?;
    let control_plane = connect(config)?;
    let storage = open_storage(config).await;

    wait_until_ready(control_plane.as_ref(), &options.readiness).await?;
    let detection = detect_state(control_plane.as_ref(), storage.as_ref(), &options.owner).await;

    let out = json!({
        "state": detection.state,
        "signals": detection.signals,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn cmd_wait(config: &AppConfig) -> Result<()> {
    let control_plane = connect(config)?;
    let settings = ReadinessSettings::from(config);
    let readiness = wait_until_ready(control_plane.as_ref(), &settings).await?;
    println!(
        "platform ready at {} after {} attempt(s)",
        config.platform.base_url, readiness.attempts
    );
    Ok(())
}

fn cmd_catalog(config: &AppConfig) -> Result<()> {
    let catalog = build_catalog(&config.services);
    let width = catalog.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for credential in &catalog {
        println!("{:<width$}  {}", credential.name, credential.kind);
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("wrote default config to {}", path.display());
    Ok(())
}

fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(&config.redacted())
        .map_err(|e| eyre!("failed to render config: {e}"))?;
    print!("{rendered}");
    Ok(())
}

fn connect(config: &AppConfig) -> Result<Arc<dyn ControlPlane>> {
    let client = ControlPlaneClient::new(&ClientOptions::from_config(&config.platform)?)?;
    Ok(Arc::new(client))
}

/// Open the backing store if one is configured. A store that cannot be opened
/// only costs the fallback path, so the run carries on without it.
async fn open_storage(config: &AppConfig) -> Option<Storage> {
    match Storage::from_config(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            warn!(error = %e, "backing store unavailable; continuing without it");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(visible: bool) -> Self {
        if !visible {
            return Self {
                spinner: ProgressBar::hidden(),
            };
        }
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: Phase) {
        self.spinner.set_message(phase.label().to_string());
    }

    fn phase_finished(&self, record: &PhaseRecord) {
        let mark = match record.status {
            PhaseStatus::Succeeded => "✓",
            PhaseStatus::Skipped => "-",
            PhaseStatus::RecoverableFailure => "!",
            PhaseStatus::FatalFailure => "✗",
        };
        self.spinner
            .println(format!("{mark} {}", record.phase.label()));
    }

    fn fatal(&self, failure: &FatalFailure) {
        self.spinner
            .println(format!("fatal in {}: {}", failure.phase, failure.message));
    }

    fn done(&self, report: &RunReport) {
        self.spinner.finish_and_clear();
        if report.final_phase != FinalPhase::Ready {
            warn!(final_phase = %report.final_phase, "bootstrap did not reach READY");
        }
    }
}
