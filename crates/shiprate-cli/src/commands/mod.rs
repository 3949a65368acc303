mod cache;
mod connections;
mod health;
mod history;
mod rates;

use serde_json::Value;
use shiprate_core::{ShippingConfig, ShippingService};

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// JSON payload to print and the process exit code that goes with it.
pub struct CommandOutput {
    pub data: Value,
    pub exit_code: u8,
}

impl CommandOutput {
    pub fn ok(data: Value) -> Self {
        Self { data, exit_code: 0 }
    }

    pub fn with_exit_code(mut self, exit_code: u8) -> Self {
        self.exit_code = exit_code;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let mut config = ShippingConfig::from_env()?;
    if let Command::Rates(args) = &cli.command {
        if let Some(use_mock) = args.mode_override() {
            config = config.with_mock_mode(use_mock);
        }
    }
    let service = ShippingService::from_config(&config)?;

    match &cli.command {
        Command::Rates(args) => rates::run(args, &service).await,
        Command::History(args) => history::run(args, &service).await,
        Command::Cache(args) => cache::run(args, &service).await,
        Command::TestConnections => connections::run(&service).await,
        Command::Health => health::run(&service),
    }
}
