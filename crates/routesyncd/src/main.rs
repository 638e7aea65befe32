//! Route Synchronization Daemon
//!
//! Main entry point for the routesyncd daemon.
//! Listens for kernel netlink route events and mirrors them into APPL_DB.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - AU-3: Content of Audit Records - Structured logging
//! - AU-12: Audit Record Generation - Log daemon lifecycle
//! - CM-6: Configuration Settings - File and command line configuration
//! - SI-4: System Monitoring - Real-time event processing

use anyhow::Context;
use clap::Parser;
use sonic_routesyncd::{
    NetlinkRouteSource, RedisRouteStore, RouteSynchronizer, RoutesyncConfig,
    SystemInterfaceResolver, config::DEFAULT_CONFIG_PATH, start_metrics_server,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// SONiC kernel route to APPL_DB synchronizer
#[derive(Parser, Debug)]
#[command(name = "routesyncd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Redis server host (overrides the configuration file)
    #[arg(long)]
    redis_host: Option<String>,

    /// Redis server port (overrides the configuration file)
    #[arg(long)]
    redis_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut RoutesyncConfig) {
        if let Some(host) = self.redis_host {
            config.database.redis_host = host;
        }
        if let Some(port) = self.redis_port {
            config.database.redis_port = port;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("routesyncd: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    // NIST: AU-3, AU-12 - Audit logging setup
    init_logging(&config.log_level);
    info!("routesyncd: Starting route synchronization daemon");

    match run_daemon(config).await {
        Ok(()) => {
            info!("routesyncd: Daemon exiting normally");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "routesyncd: Daemon exiting with error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: Args) -> anyhow::Result<RoutesyncConfig> {
    let mut config = RoutesyncConfig::load_or_default(&args.config)
        .with_context(|| format!("Unable to load {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Initialize structured logging; RUST_LOG takes precedence over `log_level`
fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Run until a termination signal or an unexpected worker exit
///
/// # NIST Controls
/// - SI-4: System Monitoring - Event loop for monitoring
async fn run_daemon(config: RoutesyncConfig) -> anyhow::Result<()> {
    let store = RedisRouteStore::connect(
        &config.database.redis_host,
        config.database.redis_port,
        config.database.appl_db_number,
    )
    .await
    .context("Unable to connect to APPL_DB")?;
    store.ping().await.context("Unable to reach APPL_DB")?;
    info!(url = store.url(), "routesyncd: Connected to APPL_DB");

    let synchronizer = RouteSynchronizer::new(
        store,
        SystemInterfaceResolver,
        NetlinkRouteSource::new(),
        config.sync_options(),
    )?;
    synchronizer
        .start()
        .context("Unable to subscribe to netlink route updates")?;

    let metrics_shutdown = CancellationToken::new();
    if config.metrics.enabled {
        let collector = synchronizer.metrics().clone();
        let port = config.metrics.port;
        let shutdown = metrics_shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = start_metrics_server(collector, port, shutdown).await {
                warn!(error = %e, "routesyncd: Metrics server failed");
            }
        });
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("routesyncd: Received SIGINT");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("routesyncd: Received SIGTERM");
            Ok(())
        }
        _ = sighup.recv() => {
            info!("routesyncd: Received SIGHUP");
            Ok(())
        }
        _ = synchronizer.wait() => {
            Err(anyhow::anyhow!("route synchronizer stopped unexpectedly"))
        }
    };

    synchronizer.stop_and_wait().await;
    metrics_shutdown.cancel();

    let stats = synchronizer.stats();
    info!(
        updates = stats.updates,
        added = stats.added,
        deleted = stats.deleted,
        failures = stats.nexthop_failures + stats.add_failures + stats.delete_failures,
        "routesyncd: Graceful shutdown complete"
    );
    outcome
}
