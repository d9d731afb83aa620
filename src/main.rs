//! Gateway entry point.

use clap::Parser;
use gateway_core::{run_server_with_config_file, GatewayError};
use std::process::ExitCode;
use tracing::Level;

/// Multi-tenant LLM gateway core.
#[derive(Parser)]
#[command(name = "gateway", version, about)]
struct Cli {
    /// Optional YAML config file (e.g. `config/gateway.yaml`), used instead
    /// of the environment-variable config described in spec §6.
    #[arg(long, env = "GATEWAY_CONFIG_FILE")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    // Best-effort: a missing `.env` is normal in production, where config
    // comes from the real environment.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match run_server_with_config_file(cli.config.as_deref()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ GatewayError::Config(_)) => {
            eprintln!("configuration error: {e}");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("fatal startup error: {e}");
            ExitCode::from(2)
        }
    }
}
