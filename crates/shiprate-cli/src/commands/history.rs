use shiprate_core::ShippingService;

use crate::cli::HistoryArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &HistoryArgs, service: &ShippingService) -> Result<CommandOutput, CliError> {
    let response = service
        .quote_history(&args.customer_id, Some(args.limit))
        .await?;
    Ok(CommandOutput::ok(serde_json::to_value(response)?))
}
