use shiprate_core::ShippingService;

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &CacheArgs, service: &ShippingService) -> Result<CommandOutput, CliError> {
    match args.command {
        CacheCommand::Purge => {
            let report = service.clear_expired_cache().await?;
            Ok(CommandOutput::ok(serde_json::to_value(report)?))
        }
    }
}
