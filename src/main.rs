//! Nexus Probe command line

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use nexus_probe::app::ConfigFile;
use nexus_probe::campaign::{Campaign, CampaignReport};
use nexus_probe::dispatch::StopHandle;
use nexus_probe::probe::ModuleKind;
use nexus_probe::reporting::checkpoint::Checkpointer;
use nexus_probe::reporting::{OutputFormat, RunReport};
use nexus_probe::runner::Runner;
use nexus_probe::{ConfigError, ProbeError};

/// Configurable probing engine for authorized HTTP testing
#[derive(Parser, Debug)]
#[command(name = "nexus-probe")]
#[command(author, version, about = "Configurable probing engine for authorized HTTP testing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    logging: LogArgs,
}

#[derive(Args, Debug)]
struct LogArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "NEXUS_PROBE_LOG_LEVEL")]
    log_level: String,

    /// Log file path (enables file logging)
    #[arg(long, global = true, env = "NEXUS_PROBE_LOG_FILE")]
    log_file: Option<String>,

    /// Enable JSON structured logging
    #[arg(long, global = true, env = "NEXUS_PROBE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one probe module
    Run(RunArgs),

    /// Validate configuration and exit
    Validate {
        /// Configuration file path (JSON, or TOML with a .toml extension)
        #[arg(short, long, env = "NEXUS_PROBE_CONFIG")]
        config: PathBuf,

        /// Module to validate; all configured modules when omitted
        #[arg(short, long)]
        module: Option<String>,
    },

    /// Run every campaign module against every campaign target
    Campaign(CampaignArgs),

    /// Print a sample configuration
    Init {
        /// Emit TOML instead of JSON
        #[arg(long)]
        toml: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file path (JSON, or TOML with a .toml extension)
    #[arg(short, long, env = "NEXUS_PROBE_CONFIG")]
    config: PathBuf,

    /// Module to run (brute, fuzz, rate-limit)
    #[arg(short, long)]
    module: String,

    /// Report export format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Directory for report files
    #[arg(long, default_value = ".", env = "NEXUS_PROBE_OUTPUT_DIR")]
    output_dir: PathBuf,

    /// Write periodic partial reports to this file
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Seconds between checkpoint writes
    #[arg(long, default_value = "10")]
    checkpoint_secs: u64,
}

#[derive(Args, Debug)]
struct CampaignArgs {
    /// Configuration file path with a `campaign` section
    #[arg(short, long, env = "NEXUS_PROBE_CONFIG")]
    config: PathBuf,

    /// Report export format for each run
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    output: OutputFormat,

    /// Directory for run reports and the campaign report
    #[arg(long, default_value = ".", env = "NEXUS_PROBE_OUTPUT_DIR")]
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command, logging } = Cli::parse();

    // `init` prints only the sample, without log output
    match command {
        Command::Init { toml } => print_sample_config(toml),
        Command::Run(args) => {
            init_logging(&logging)?;
            run(args).await
        }
        Command::Campaign(args) => {
            init_logging(&logging)?;
            campaign(args).await
        }
        Command::Validate { config, module } => {
            init_logging(&logging)?;
            validate(&config, module.as_deref())
        }
    }
}

/// Initialize the logging system
fn init_logging(cli: &LogArgs) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("Invalid log level '{}'", cli.log_level))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if let Some(log_path) = &cli.log_file {
        // File-based logging with rotation
        let path = Path::new(log_path);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let filename = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("nexus-probe.log");
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {:?}", dir))?;
        let file_appender = RollingFileAppender::new(Rotation::DAILY, dir, filename);

        if cli.log_json {
            let file_layer = fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false);
            subscriber.with(file_layer).init();
        } else {
            let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
            subscriber.with(file_layer).init();
        }
    } else if cli.log_json {
        // Console logging stays on stderr; stdout carries the summary
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Nexus Probe");
    Ok(())
}

fn parse_module(name: &str) -> Result<ModuleKind> {
    ModuleKind::parse(name).ok_or_else(|| hinted(ConfigError::UnknownModule(name.to_string()).into()))
}

/// Attach the user-facing hint to a library error
fn hinted(err: ProbeError) -> anyhow::Error {
    let hint = err.user_message();
    anyhow::Error::new(err).context(hint)
}

fn load_config(path: &Path) -> Result<ConfigFile> {
    ConfigFile::load(path).map_err(|e| hinted(e.into()))
}

/// Directory that relative wordlist paths are resolved against
fn config_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

async fn run(args: RunArgs) -> Result<()> {
    let module = parse_module(&args.module)?;
    let config = load_config(&args.config)?;
    let plan = config
        .plan(module, &config_dir(&args.config))
        .map_err(|e| hinted(e.into()))?;

    let mut runner = Runner::from_plan(plan).map_err(hinted)?;
    if let Some(path) = &args.checkpoint {
        runner = runner.with_checkpoint(Checkpointer::new(
            path,
            Duration::from_secs(args.checkpoint_secs),
        ));
    }

    let stop = runner.stop_handle();
    let signals = tokio::spawn(async move {
        handle_signals(stop).await;
    });

    let report = runner.run().await.map_err(hinted);
    signals.abort();
    let report = report?;

    report
        .save(&args.output_dir, args.output)
        .map_err(hinted)
        .context("Failed to write report")?;

    print_summary(&report);
    Ok(())
}

fn validate(path: &Path, module: Option<&str>) -> Result<()> {
    let config = load_config(path)?;
    let base_dir = config_dir(path);

    let modules: Vec<ModuleKind> = match module {
        Some(name) => vec![parse_module(name)?],
        None => ModuleKind::all()
            .iter()
            .copied()
            .filter(|m| config.section(*m).is_ok())
            .collect(),
    };

    if modules.is_empty() && config.campaign.is_none() {
        anyhow::bail!("No module sections found in {:?}", path);
    }

    for module in modules {
        let plan = config.plan(module, &base_dir).map_err(|e| hinted(e.into()))?;
        println!(
            "{}: ok ({} probes, concurrency {}, {} endpoints)",
            module,
            plan.space.len(),
            plan.dispatch.concurrency,
            plan.endpoints.len()
        );
    }

    if module.is_none() {
        if let Some(section) = &config.campaign {
            let campaign = section.resolve(&base_dir).map_err(|e| hinted(e.into()))?;
            println!(
                "campaign {}: ok ({} targets x {} modules)",
                campaign.name,
                campaign.targets.len(),
                campaign.modules.len()
            );
        }
    }

    tracing::info!("Configuration is valid");
    Ok(())
}

/// Print sample configuration
fn print_sample_config(as_toml: bool) -> Result<()> {
    let sample = ConfigFile::sample();
    let text = if as_toml {
        toml::to_string_pretty(&sample).context("Failed to serialize configuration")?
    } else {
        serde_json::to_string_pretty(&sample).context("Failed to serialize configuration")?
    };

    println!("{}", text);
    Ok(())
}

fn print_summary(report: &RunReport) {
    let summary = &report.summary;
    println!(
        "{} {}: {} attempted, {} succeeded, {} failed ({} transport errors), {} findings in {}ms{}",
        report.metadata.module,
        report.metadata.target,
        summary.attempted,
        summary.succeeded,
        summary.failed,
        summary.transport_errors,
        summary.findings_total,
        report.metadata.duration_ms,
        if report.metadata.cancelled { " [stopped]" } else { "" }
    );
    for (severity, count) in summary.findings_by_severity.iter().rev() {
        println!("  {:<8} {}", severity, count);
    }
    if let (Some(min), Some(max)) = (summary.latency.min_ms, summary.latency.max_ms) {
        println!(
            "  latency  avg {:.2}ms, min {}ms, max {}ms",
            summary.latency.avg_ms, min, max
        );
    }
    if let Some(at) = summary.rate_limit_at {
        println!(
            "  rate limit first seen at probe {}: {}",
            at,
            summary.rate_limit_reason.as_deref().unwrap_or("throttled")
        );
    }
    if summary.no_endpoints_available {
        println!("  all rotation endpoints failed; later probes went direct");
    }
}

async fn campaign(args: CampaignArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let campaign = Campaign::new(config, &config_dir(&args.config))
        .map_err(|e| hinted(e.into()))?
        .with_output(&args.output_dir, args.output);

    let stop = campaign.stop_handle();
    let signals = tokio::spawn(async move {
        handle_signals(stop).await;
    });

    let report = campaign.run().await.map_err(hinted);
    signals.abort();
    let report = report?;

    report
        .save(&args.output_dir)
        .map_err(hinted)
        .context("Failed to write campaign report")?;

    print_campaign_summary(&report);
    Ok(())
}

fn print_campaign_summary(report: &CampaignReport) {
    let summary = &report.summary;
    println!(
        "campaign {}: {} of {} operations completed, {} failed, {} probes, {} findings in {}ms{}",
        report.name,
        summary.successful_operations,
        summary.total_operations,
        summary.failed_operations,
        summary.probes_attempted,
        summary.findings_total,
        report.duration_ms,
        if report.cancelled { " [stopped]" } else { "" }
    );
    for operation in &report.operations {
        match (&operation.summary, &operation.error) {
            (Some(run), _) => println!(
                "  {:<24} {:<10} {} attempted, {} findings",
                operation.target, operation.module.name(), run.attempted, run.findings_total
            ),
            (None, Some(error)) => println!(
                "  {:<24} {:<10} failed: {}",
                operation.target, operation.module.name(), error
            ),
            (None, None) => {}
        }
    }
}

/// Exit status after a forced shutdown (128 + SIGINT)
const FORCED_EXIT_CODE: i32 = 130;

/// Handle shutdown signals.
///
/// The first signal stops new probes and lets in-flight ones finish. A
/// second signal exits at once.
async fn handle_signals(stop: StopHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to register signal handlers");
                return;
            }
        };

        loop {
            let name = tokio::select! {
                Some(_) = sigint.recv() => "SIGINT",
                Some(_) = sigterm.recv() => "SIGTERM",
                else => return,
            };
            if on_signal(&stop, name) {
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Failed to register Ctrl+C handler");
                return;
            }
            if on_signal(&stop, "Ctrl+C") {
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    }
}

/// Returns true when the process should exit without a report
fn on_signal(stop: &StopHandle, name: &str) -> bool {
    if stop.is_stopped() {
        tracing::warn!(signal = name, "Second signal received, exiting without a report");
        return true;
    }
    tracing::info!(
        signal = name,
        "Finishing in-flight probes; signal again to exit immediately"
    );
    stop.stop();
    false
}
