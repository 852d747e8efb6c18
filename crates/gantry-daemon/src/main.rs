//! Gantry daemon - background convergence service
//!
//! Keeps declared client applications and API endpoints converged against
//! an API gateway control plane:
//! - REST API for declaring desired state
//! - per-resource reconciliation with periodic drift detection
//! - event stream for observability

use clap::Parser;
use gantry_daemon::config::DaemonConfig;
use gantry_daemon::error::{DaemonError, DaemonResult};
use gantry_daemon::server::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Gantry daemon CLI
#[derive(Parser)]
#[command(name = "gantryd")]
#[command(about = "Gantry daemon - gateway resource convergence service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "GANTRY_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides configuration)
    #[arg(short, long, env = "GANTRY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "GANTRY_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "GANTRY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("invalid listen address: {e}")))?;
    }

    println!(
        r#"
   ____             _
  / ___| __ _ _ __ | |_ _ __ _   _
 | |  _ / _` | '_ \| __| '__| | | |
 | |_| | (_| | | | | |_| |  | |_| |
  \____|\__,_|_| |_|\__|_|   \__, |
                             |___/
  Gateway resource convergence daemon
  Version: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config)?;
    server.run().await
}
