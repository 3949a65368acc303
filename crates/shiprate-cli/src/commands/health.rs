use shiprate_core::ShippingService;

use crate::error::CliError;

use super::CommandOutput;

pub fn run(service: &ShippingService) -> Result<CommandOutput, CliError> {
    Ok(CommandOutput::ok(serde_json::to_value(service.health())?))
}
