//! ccbell-monitor CLI
//!
//! Runs the configured system monitors and plays a sound for each transition
//! that survives its cooldown.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use ccbell_monitor::alerting::{AlertSink, CommandPlayer, FanoutSink, LogSink, SoundSink};
use ccbell_monitor::collector::CommandCollector;
use ccbell_monitor::config::LoggingConfig;
use ccbell_monitor::monitor::MonitorRegistry;
use ccbell_monitor::Config;

/// ccbell-monitor - sound alerts for system state changes
#[derive(Parser)]
#[command(name = "ccbell-monitor")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CCBELL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled monitor until interrupted
    Run {
        /// Log transitions instead of playing sounds
        #[arg(long)]
        log_only: bool,

        /// Only run these domains
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,
    },

    /// Load and validate the configuration, then print the monitors
    Validate,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        generate_completions(shell);
        return ExitCode::SUCCESS;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Run { log_only, only } => run_monitors(config, log_only, &only).await,
        Commands::Validate => run_validate(&config, cli.config.as_deref(), cli.format),
        Commands::Completions { .. } => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let json = config.format.eq_ignore_ascii_case("json");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let guard = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "ccbell-monitor.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let builder = builder.with_writer(writer).with_ansi(false);
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
            .map_err(|e| anyhow::anyhow!(e))?;
            Some(guard)
        }
        None => {
            let builder = builder.with_writer(std::io::stderr);
            if json {
                builder.json().try_init()
            } else {
                builder.try_init()
            }
            .map_err(|e| anyhow::anyhow!(e))?;
            None
        }
    };

    Ok(guard)
}

fn build_sink(config: &Config, log_only: bool) -> Arc<dyn AlertSink> {
    if log_only {
        return Arc::new(LogSink);
    }

    let player = CommandPlayer::from_config(&config.sound);
    info!(player = player.program(), "Using audio player");

    let sound = config
        .monitors
        .iter()
        .fold(
            SoundSink::new(config.sound.clone(), Arc::new(player)),
            |sink, (domain, definition)| sink.with_domain(domain.clone(), definition.sound.clone()),
        );

    Arc::new(FanoutSink::new(vec![Arc::new(sound), Arc::new(LogSink)]))
}

async fn run_monitors(config: Config, log_only: bool, only: &[String]) -> anyhow::Result<()> {
    let registry = MonitorRegistry::new(build_sink(&config, log_only));

    for (domain, definition) in &config.monitors {
        if !only.is_empty() && !only.contains(domain) {
            continue;
        }

        let collector = CommandCollector::from_command(domain.clone(), &definition.collector.command)?;
        if let Err(e) = registry
            .register(domain.clone(), definition.monitor.clone(), Arc::new(collector))
            .await
        {
            warn!(domain = %domain, error = %e, "Monitor not started");
        }
    }

    if registry.domains().is_empty() {
        anyhow::bail!("no monitors configured");
    }

    info!(monitors = ?registry.domains(), "ccbell-monitor running; press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    registry.stop_all().await;

    for status in registry.statuses() {
        info!(
            domain = %status.domain,
            ticks = status.stats.ticks,
            dispatched = status.stats.dispatched,
            suppressed = status.stats.suppressed,
            collection_failures = status.stats.collection_failures,
            "Monitor summary"
        );
    }

    Ok(())
}

fn run_validate(config: &Config, path: Option<&Path>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        OutputFormat::Text => {
            let source = path
                .map(Path::to_path_buf)
                .or_else(Config::default_path)
                .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());
            println!("Configuration OK: {source}");
            for (domain, definition) in &config.monitors {
                let monitor = &definition.monitor;
                println!(
                    "  {domain:<12} {:<8} every {:<6} kinds: {}",
                    if monitor.enabled { "enabled" } else { "disabled" },
                    humantime::format_duration(monitor.poll_interval).to_string(),
                    monitor
                        .enabled_kinds
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                );
            }
        }
    }
    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "ccbell-monitor", &mut io::stdout());
}
