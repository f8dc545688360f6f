use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use grimoire::config::Config;
use grimoire::consumer::ConsumerLoop;
use grimoire::error::OracleError;
use grimoire::oracle::Oracle;

/// Minimal CLI surface: enable/disable, enforce mode, log path, min
/// severities, and a health snapshot. No subcommands, no hot-reload, no
/// dashboard.
#[derive(Parser)]
#[command(name = "grimoire", about = "Behavioral pattern detection core")]
struct Cli {
    /// Path to a TOML config file. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    enable: bool,

    #[arg(long)]
    disable: bool,

    #[arg(long)]
    enforce: bool,

    #[arg(long = "log-path")]
    log_path: Option<PathBuf>,

    #[arg(long = "min-log-severity")]
    min_log_severity: Option<String>,

    #[arg(long = "min-enforce-severity")]
    min_enforce_severity: Option<String>,

    /// Logs a health snapshot on an interval instead of only at shutdown.
    #[arg(long = "print-health")]
    print_health: bool,

    /// Render the periodic health snapshot as JSON instead of a log line.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match cli.config.as_deref().map(Config::from_file).unwrap_or_else(|| Ok(Config::default_config())) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "failed to load configuration");
            return ExitCode::from(2);
        }
    };

    if cli.enable {
        config.enable = true;
    }
    if cli.disable {
        config.enable = false;
    }
    if cli.enforce {
        config.enforce = true;
    }
    if let Some(path) = cli.log_path {
        config.log_path = path;
    }
    if let Some(severity) = cli.min_log_severity {
        match severity.parse() {
            Ok(s) => config.min_log_severity = s,
            Err(error) => {
                tracing::error!(%error, "invalid --min-log-severity");
                return ExitCode::from(2);
            }
        }
    }
    if let Some(severity) = cli.min_enforce_severity {
        match severity.parse() {
            Ok(s) => config.min_enforce_severity = s,
            Err(error) => {
                tracing::error!(%error, "invalid --min-enforce-severity");
                return ExitCode::from(2);
            }
        }
    }

    tracing::info!(enabled = config.enable, enforce = config.enforce, "starting");

    let mut oracle = match Oracle::load(config.enable) {
        Ok(oracle) => oracle,
        Err(error) => {
            tracing::error!(%error, "failed to load and attach the kernel probe");
            return ExitCode::from(3);
        }
    };
    if let Err(error) = oracle.set_monitored_syscalls(grimoire::catalog::monitored_syscall_set()) {
        tracing::error!(%error, "failed to populate the monitored syscall set");
        return ExitCode::from(3);
    }

    let mut consumer = ConsumerLoop::new(oracle, config);
    if cli.print_health {
        consumer = consumer.with_health_reporting(std::time::Duration::from_secs(30), cli.json);
    }
    let shutdown = Arc::new(AtomicBool::new(false));

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        tracing::info!("shutdown signal received");
        signal_shutdown.store(true, Ordering::Relaxed);
    });

    match consumer.run(shutdown).await {
        Ok(()) => {
            tracing::info!("shut down cleanly");
            ExitCode::SUCCESS
        }
        Err(error) => {
            report_run_failure(&error);
            ExitCode::from(4)
        }
    }
}

fn report_run_failure(error: &OracleError) {
    tracing::error!(%error, "ring buffer polling failed");
}

async fn wait_for_shutdown_signal() {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}
