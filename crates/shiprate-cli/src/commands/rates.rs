use std::io::Read;

use shiprate_core::{RateLookupRequest, RateLookupResponse, ShipmentRequest, ShippingService};

use crate::cli::RatesArgs;
use crate::error::{core_exit_code, CliError};

use super::CommandOutput;

pub async fn run(args: &RatesArgs, service: &ShippingService) -> Result<CommandOutput, CliError> {
    let shipment = read_shipment(&args.shipment)?;
    let request = RateLookupRequest {
        carrier: args.carrier.into(),
        shipment_data: shipment,
        customer_id: args.customer_id.clone(),
    };

    match service.get_rates(request).await {
        Ok(response) => Ok(CommandOutput::ok(serde_json::to_value(response)?)),
        Err(error) => {
            let response = RateLookupResponse::failed(&error, service.now());
            Ok(CommandOutput::ok(serde_json::to_value(response)?)
                .with_exit_code(core_exit_code(&error)))
        }
    }
}

fn read_shipment(source: &str) -> Result<ShipmentRequest, CliError> {
    let raw = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(source)?
    };

    parse_shipment(&raw)
}

fn parse_shipment(raw: &str) -> Result<ShipmentRequest, CliError> {
    serde_json::from_str(raw).map_err(|error| CliError::InvalidShipment(error.to_string()))
}
