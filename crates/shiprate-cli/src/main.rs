mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Err(error) = dotenv {
        if !error.not_found() {
            tracing::warn!(error = %error, "failed to load .env");
        }
    }

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shiprate=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let output = commands::run(&cli).await?;
    output::render(&output.data, cli.pretty)?;

    Ok(ExitCode::from(output.exit_code))
}
