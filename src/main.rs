use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use dockmon::api;
use dockmon::config::{self, RetentionMode};
use dockmon::selection::FileStore;
use dockmon::session::{spawn_poller, DashboardSession, RenderSink, Snapshot};

/// Client-side telemetry core for a container-monitoring dashboard.
#[derive(Parser)]
#[command(name = "dockmon", about)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Logging verbosity level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information and exit.
    Version,
}

/// Build-time version info, injected via RUSTFLAGS or build.rs.
mod version {
    /// Release version string (set at build time).
    pub const RELEASE: &str = env!("CARGO_PKG_VERSION");

    /// Git commit hash (set at build time via env, or "unknown").
    pub fn git_commit() -> &'static str {
        option_env!("GIT_COMMIT").unwrap_or("unknown")
    }

    /// Full version string with platform info.
    pub fn full() -> String {
        format!(
            "{} (commit: {}, {}/{})",
            RELEASE,
            git_commit(),
            std::env::consts::OS,
            std::env::consts::ARCH,
        )
    }
}

/// Render sink that reports each snapshot through the log. The chart layer
/// proper lives outside this binary.
struct LogSink;

impl RenderSink for LogSink {
    fn publish(&self, snapshot: &Snapshot) {
        let entities = match &snapshot.entities {
            Ok(list) => list.len().to_string(),
            Err(_) => "unavailable".to_string(),
        };

        match &snapshot.active {
            Some(active) => {
                tracing::info!(
                    entities,
                    entity = %active.id,
                    points = active.history.len(),
                    stats = active.stats.is_ok(),
                    network = active.network.is_ok(),
                    logs = active.logs.is_ok(),
                    "snapshot",
                );
            }
            None => {
                tracing::info!(entities, "snapshot with no active entity");
            }
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle version subcommand before anything else.
    if let Some(Command::Version) = &cli.command {
        println!("dockmon {}", version::full());
        return Ok(());
    }

    // Initialize tracing.
    let filter = EnvFilter::try_new(&cli.log_level)
        .with_context(|| format!("invalid log level: {}", cli.log_level))?;

    fmt().with_env_filter(filter).with_target(true).init();

    // Config is required for the main agent run.
    let config_path = cli
        .config
        .context("--config is required (use --help for usage)")?;

    let cfg = config::Config::load(&config_path)
        .with_context(|| format!("loading config from {}", config_path.display()))?;

    tracing::info!(
        version = version::RELEASE,
        commit = version::git_commit(),
        "starting dockmon",
    );

    // Build and run the tokio runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    rt.block_on(async { run(cfg).await })
}

async fn run(cfg: config::Config) -> Result<()> {
    // Set up signal handling.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
            }
        }

        let _ = shutdown_tx.send(());
    });

    // Wire the session.
    let mut client = api::Client::new(&cfg.api).context("creating API client")?;
    if cfg.retention.mode == RetentionMode::Window {
        client = client.with_window(cfg.retention.window);
    }

    let selection = FileStore::new(cfg.state_file.clone());
    let session = Arc::new(DashboardSession::new(
        client,
        cfg.retention.policy(),
        selection,
    ));

    tracing::info!(
        endpoint = %cfg.api.endpoint,
        poll_interval = ?cfg.poll_interval,
        retention = ?cfg.retention.policy(),
        "session started",
    );

    // Start the poller.
    let cancel = tokio_util::sync::CancellationToken::new();
    let poller = spawn_poller(
        session,
        Arc::new(LogSink),
        cfg.poll_interval,
        cancel.child_token(),
    );

    // Wait for shutdown signal.
    let _ = shutdown_rx.await;

    // Graceful shutdown: stop the ticker and let any in-flight cycle settle.
    cancel.cancel();
    let _ = poller.await;

    tracing::info!("dockmon stopped");

    Ok(())
}
