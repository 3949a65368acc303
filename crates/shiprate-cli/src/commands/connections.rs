use serde_json::json;
use shiprate_core::ShippingService;

use crate::error::CliError;

use super::CommandOutput;

pub async fn run(service: &ShippingService) -> Result<CommandOutput, CliError> {
    let report = service.test_connections().await;
    Ok(CommandOutput::ok(json!({
        "success": true,
        "connections": report,
        "timestamp": service.now(),
    })))
}
