use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Duration;
use uuid::Uuid;

use super::{endpoint, optional_text, parse_body, status_error, OAuthTokenResponse};
use crate::carrier_adapter::{CarrierAdapter, CarrierError, RateBatch};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::token::{ProviderToken, TokenCache};
use crate::{
    add_business_days, format_date, Address, CarrierId, CarrierSettings, Clock, Package,
    RateQuote, ShipmentRequest, SystemClock, UNAVAILABLE,
};

const TOKEN_PATH: &str = "/security/v1/oauth/token";
const RATE_PATH: &str = "/rating/v1/Rate";
const TRANSACTION_SOURCE: &str = "shiprate";

/// UPS Rating API adapter (OAuth client credentials + `/rating/v1/Rate`).
pub struct UpsAdapter {
    settings: CarrierSettings,
    http_client: Arc<dyn HttpClient>,
    tokens: TokenCache,
    timeout_ms: u64,
}

impl UpsAdapter {
    pub fn new(settings: CarrierSettings) -> Self {
        Self::with_http_client(settings, Arc::new(ReqwestHttpClient::new()), Arc::new(SystemClock))
    }

    pub fn with_http_client(
        settings: CarrierSettings,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            http_client,
            tokens: TokenCache::new(clock),
            timeout_ms: HttpRequest::DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    async fn request_token(&self) -> Result<ProviderToken, CarrierError> {
        if !self.settings.has_credentials() {
            return Err(CarrierError::authentication(
                CarrierId::Ups,
                "UPS client credentials are not configured",
            ));
        }

        let request = HttpRequest::post(endpoint(&self.settings.base_url, TOKEN_PATH))
            .with_form_body(&[("grant_type", "client_credentials")])
            .with_auth(&HttpAuth::Basic {
                username: self.settings.client_id.clone(),
                password: self.settings.client_secret.clone(),
            })
            .with_timeout_ms(self.timeout_ms);

        let issued_at = self.tokens.now();
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.timed_out() {
                CarrierError::from_transport(CarrierId::Ups, "authentication", &error)
            } else {
                CarrierError::authentication(
                    CarrierId::Ups,
                    format!("authentication failed: {}", error.message()),
                )
            }
        })?;

        if !response.is_success() {
            tracing::warn!(carrier = "ups", status = response.status, "authentication rejected");
            return Err(CarrierError::authentication(
                CarrierId::Ups,
                format!("authentication failed with status {}", response.status),
            ));
        }

        let (token, _raw): (OAuthTokenResponse, _) =
            parse_body(CarrierId::Ups, &response.body, "token response")?;
        let lifetime = Duration::seconds(i64::try_from(token.expires_in).unwrap_or(i64::MAX));
        tracing::debug!(carrier = "ups", expires_in = token.expires_in, "authenticated");
        Ok(ProviderToken::expiring_in(token.access_token, issued_at, lifetime))
    }

    fn rate_request_body<'s>(&self, shipment: &'s ShipmentRequest) -> UpsRateEnvelope<'s> {
        let shipper = shipment.shipper();
        let recipient = shipment.recipient();

        UpsRateEnvelope {
            rate_request: UpsRateRequest {
                request: UpsRequestMeta {
                    request_option: "Rate",
                    transaction_reference: UpsTransactionReference {
                        customer_context: "Rating and Service",
                    },
                },
                shipment: UpsShipment {
                    shipper: UpsShipper {
                        name: shipper.name().to_owned(),
                        shipper_number: shipper
                            .account_number()
                            .or(self.settings.account_number.as_deref())
                            .map(str::to_owned),
                        address: UpsAddress::from(shipper.address()),
                    },
                    ship_to: UpsParty {
                        name: recipient.name().to_owned(),
                        address: UpsAddress::from(recipient.address()),
                    },
                    ship_from: UpsParty {
                        name: shipper.name().to_owned(),
                        address: UpsAddress::from(shipper.address()),
                    },
                    package: shipment.packages().iter().map(UpsPackage::from).collect(),
                },
            },
        }
    }

    /// Malformed entries are skipped; the reply is invalid only when none survive.
    fn normalize(&self, reply: UpsRateReply) -> Result<Vec<RateQuote>, CarrierError> {
        let rated = match reply.rate_response.and_then(|response| response.rated_shipment) {
            Some(OneOrMany::One(single)) => vec![single],
            Some(OneOrMany::Many(many)) => many,
            None => Vec::new(),
        };

        let today = self.tokens.now().date();
        let offered = rated.len();
        let mut last_error = None;
        let mut quotes = Vec::with_capacity(offered);
        for shipment in rated {
            match normalize_rated_shipment(shipment, today) {
                Ok(quote) => quotes.push(quote),
                Err(error) => {
                    tracing::warn!(
                        carrier = "ups",
                        error = %error.message(),
                        "skipping malformed rated shipment"
                    );
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if quotes.is_empty() => Err(error),
            _ => Ok(quotes),
        }
    }
}

impl CarrierAdapter for UpsAdapter {
    fn carrier(&self) -> CarrierId {
        CarrierId::Ups
    }

    fn authenticate<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<String, CarrierError>> + Send + 'a>> {
        Box::pin(async move { self.tokens.get_or_refresh(|| self.request_token()).await })
    }

    fn rates<'a>(
        &'a self,
        shipment: &'a ShipmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RateBatch, CarrierError>> + Send + 'a>> {
        Box::pin(async move {
            let token = self.authenticate().await?;
            let body = serde_json::to_value(self.rate_request_body(shipment)).map_err(|error| {
                CarrierError::internal(CarrierId::Ups, format!("rate request encoding: {error}"))
            })?;

            let request = HttpRequest::post(endpoint(&self.settings.base_url, RATE_PATH))
                .with_json_body(&body)
                .with_auth(&HttpAuth::BearerToken(token))
                .with_header("transId", Uuid::new_v4().simple().to_string())
                .with_header("transactionSrc", TRANSACTION_SOURCE)
                .with_timeout_ms(self.timeout_ms);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| {
                    CarrierError::from_transport(CarrierId::Ups, "rate request failed", &error)
                })?;

            if response.is_unauthorized() {
                self.tokens.clear().await;
                return Err(CarrierError::authentication(
                    CarrierId::Ups,
                    "authorization expired; token cleared, retry to re-authenticate",
                ));
            }
            if !response.is_success() {
                return Err(status_error(CarrierId::Ups, "rate request", &response));
            }

            let (reply, raw): (UpsRateReply, _) =
                parse_body(CarrierId::Ups, &response.body, "rate response")?;
            let quotes = self.normalize(reply)?;
            tracing::debug!(carrier = "ups", quotes = quotes.len(), "rates received");
            Ok(RateBatch::new(CarrierId::Ups, quotes).with_raw_response(raw))
        })
    }
}

/// Display name for a UPS service code.
pub fn service_name(code: &str) -> String {
    let known = match code {
        "01" => "UPS Next Day Air",
        "02" => "UPS 2nd Day Air",
        "03" => "UPS Ground",
        "12" => "UPS 3 Day Select",
        "13" => "UPS Next Day Air Saver",
        "14" => "UPS Next Day Air Early",
        "59" => "UPS 2nd Day Air A.M.",
        "65" => "UPS Saver",
        _ => return format!("UPS Service {code}"),
    };
    known.to_owned()
}

fn normalize_rated_shipment(
    shipment: UpsRatedShipment,
    today: time::Date,
) -> Result<RateQuote, CarrierError> {
    let code = shipment.service.code;
    let cost: f64 = shipment
        .total_charges
        .monetary_value
        .trim()
        .parse()
        .map_err(|_| {
            CarrierError::invalid_response(
                CarrierId::Ups,
                format!(
                    "service {code} has a non-numeric charge '{}'",
                    shipment.total_charges.monetary_value
                ),
            )
        })?;
    if !cost.is_finite() || cost < 0.0 {
        return Err(CarrierError::invalid_response(
            CarrierId::Ups,
            format!("service {code} has an invalid charge {cost}"),
        ));
    }

    let guaranteed = shipment.guaranteed_delivery.unwrap_or_default();
    let business_days = guaranteed
        .business_days_in_transit
        .as_deref()
        .and_then(|days| days.trim().parse::<u32>().ok());

    Ok(RateQuote {
        id: format!("ups_{code}"),
        carrier: CarrierId::Ups.display_name().to_owned(),
        service_name: service_name(&code),
        service_code: code,
        cost,
        currency: shipment
            .total_charges
            .currency_code
            .filter(|currency| !currency.trim().is_empty())
            .unwrap_or_else(|| String::from("USD")),
        transit_time: business_days
            .map(|days| format!("{days} business days"))
            .unwrap_or_else(|| UNAVAILABLE.to_owned()),
        delivery_date: guaranteed.delivery_by_time,
        estimated_delivery: Some(
            business_days
                .map(|days| format_date(add_business_days(today, days)))
                .unwrap_or_else(|| UNAVAILABLE.to_owned()),
        ),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRateEnvelope<'a> {
    rate_request: UpsRateRequest<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRateRequest<'a> {
    request: UpsRequestMeta,
    shipment: UpsShipment<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRequestMeta {
    request_option: &'static str,
    transaction_reference: UpsTransactionReference,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsTransactionReference {
    customer_context: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsShipment<'a> {
    shipper: UpsShipper<'a>,
    ship_to: UpsParty<'a>,
    ship_from: UpsParty<'a>,
    package: Vec<UpsPackage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsShipper<'a> {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shipper_number: Option<String>,
    address: UpsAddress<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsParty<'a> {
    name: String,
    address: UpsAddress<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsAddress<'a> {
    address_line: &'a str,
    city: &'a str,
    state_province_code: &'a str,
    postal_code: &'a str,
    country_code: &'a str,
}

impl<'a> From<&'a Address> for UpsAddress<'a> {
    fn from(address: &'a Address) -> Self {
        Self {
            address_line: address.street(),
            city: address.city(),
            state_province_code: address.state(),
            postal_code: address.zip_code(),
            country_code: address.country(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsCode<'a> {
    code: &'a str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsPackage<'a> {
    packaging_type: UpsCode<'a>,
    dimensions: UpsDimensions,
    package_weight: UpsWeight,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsDimensions {
    unit_of_measurement: UpsCode<'static>,
    length: String,
    width: String,
    height: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct UpsWeight {
    unit_of_measurement: UpsCode<'static>,
    weight: String,
}

impl<'a> From<&'a Package> for UpsPackage<'a> {
    fn from(package: &'a Package) -> Self {
        let dimensions = package.dimensions();
        Self {
            packaging_type: UpsCode {
                code: package.packaging_type(),
                description: "Package",
            },
            dimensions: UpsDimensions {
                unit_of_measurement: UpsCode {
                    code: "IN",
                    description: "Inches",
                },
                length: dimensions.length().to_string(),
                width: dimensions.width().to_string(),
                height: dimensions.height().to_string(),
            },
            package_weight: UpsWeight {
                unit_of_measurement: UpsCode {
                    code: "LBS",
                    description: "Pounds",
                },
                weight: package.weight().to_string(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRateReply {
    #[serde(default)]
    rate_response: Option<UpsRateResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRateResponse {
    #[serde(default)]
    rated_shipment: Option<OneOrMany<UpsRatedShipment>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsRatedShipment {
    service: UpsServiceCode,
    total_charges: UpsCharges,
    #[serde(default)]
    guaranteed_delivery: Option<UpsGuaranteedDelivery>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsServiceCode {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsCharges {
    monetary_value: String,
    #[serde(default)]
    currency_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct UpsGuaranteedDelivery {
    #[serde(default, deserialize_with = "optional_text")]
    business_days_in_transit: Option<String>,
    #[serde(default)]
    delivery_by_time: Option<String>,
}
