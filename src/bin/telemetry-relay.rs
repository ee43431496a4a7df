//! telemetry-relay - fan-out relay for agent metrics
//!
//! # Examples
//!
//! ```bash
//! # Listen on the default address (localhost:50051)
//! telemetry-relay
//!
//! # Listen on all interfaces, keep the newest samples for slow subscribers
//! telemetry-relay --relay-address 0.0.0.0:50051 --overflow-policy drop-oldest
//!
//! # Verbose logging for the relay only
//! RUST_LOG=telemetry_relay=debug telemetry-relay
//! ```

use std::process::ExitCode;

use clap::Parser;
use telemetry_relay::registry::{OverflowPolicy, DEFAULT_MAILBOX_CAPACITY};
use telemetry_relay::{Error, RelayServer, Result, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(about = "Re-broadcasts agent metric streams to live subscribers")]
#[command(version)]
struct Cli {
    /// TCP address where the relay listens for agents and subscribers
    #[arg(long, default_value = "localhost:50051")]
    relay_address: String,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Samples buffered per subscriber before overflow handling kicks in
    #[arg(long, default_value_t = DEFAULT_MAILBOX_CAPACITY)]
    mailbox_capacity: usize,

    /// What a full subscriber mailbox discards: drop-newest or drop-oldest
    #[arg(long, default_value_t = OverflowPolicy::DropNewest)]
    overflow_policy: OverflowPolicy,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Relay failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli).await?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        relay_address = %cli.relay_address,
        bind_addr = %config.bind_addr,
        mailbox_capacity = config.registry.mailbox_capacity,
        overflow_policy = %config.registry.overflow_policy,
        max_connections = config.max_connections,
        "Starting telemetry relay"
    );

    let server = RelayServer::new(config);
    server.run_until(shutdown_signal()).await?;

    tracing::info!("Relay stopped gracefully");
    Ok(())
}

async fn build_config(cli: &Cli) -> Result<ServerConfig> {
    if cli.relay_address.trim().is_empty() {
        return Err(Error::Config("missing required flag: --relay-address".into()));
    }

    let bind_addr = tokio::net::lookup_host(cli.relay_address.as_str())
        .await
        .map_err(|e| Error::Config(format!("cannot resolve '{}': {e}", cli.relay_address)))?
        .next()
        .ok_or_else(|| Error::Config(format!("'{}' resolved to no address", cli.relay_address)))?;

    Ok(ServerConfig::with_addr(bind_addr)
        .max_connections(cli.max_connections)
        .mailbox_capacity(cli.mailbox_capacity)
        .overflow_policy(cli.overflow_policy))
}

/// Resolves on SIGINT, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
