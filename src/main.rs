use anyhow::Result;
use clap::Parser;
use imgcomp::cli::{run, Cli, RunStatus};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries progress messages.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(RunStatus::Completed) => {
            tracing::info!("CLI completed successfully");
            Ok(())
        }
        Ok(RunStatus::Cancelled) => {
            tracing::warn!("CLI run was cancelled");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            Err(e)
        }
    }
}
