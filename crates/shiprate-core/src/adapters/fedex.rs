use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Duration;

use super::{endpoint, parse_body, status_error, OAuthTokenResponse};
use crate::carrier_adapter::{CarrierAdapter, CarrierError, RateBatch};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::token::{ProviderToken, TokenCache};
use crate::{
    format_date, Address, CarrierId, CarrierSettings, Clock, Package, Party, RateQuote,
    ShipmentRequest, SystemClock, UNAVAILABLE,
};

const TOKEN_PATH: &str = "/oauth/token";
const RATE_PATH: &str = "/rate/v1/rates/quotes";
/// Tokens are treated as expired this long before FedEx says they are.
const TOKEN_SAFETY_MARGIN: Duration = Duration::seconds(60);
const MIN_WEIGHT_LB: f64 = 1.0;
const DEFAULT_LENGTH_IN: f64 = 12.0;
const DEFAULT_WIDTH_IN: f64 = 8.0;
const DEFAULT_HEIGHT_IN: f64 = 6.0;

/// FedEx Rate API adapter (OAuth client credentials + `/rate/v1/rates/quotes`).
pub struct FedexAdapter {
    settings: CarrierSettings,
    http_client: Arc<dyn HttpClient>,
    tokens: TokenCache,
    timeout_ms: u64,
}

impl FedexAdapter {
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
                CarrierId::Fedex,
                "FedEx API key and secret are not configured",
            ));
        }

        let request = HttpRequest::post(endpoint(&self.settings.base_url, TOKEN_PATH))
            .with_form_body(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .with_timeout_ms(self.timeout_ms);

        let issued_at = self.tokens.now();
        let response = self.http_client.execute(request).await.map_err(|error| {
            if error.timed_out() {
                CarrierError::from_transport(CarrierId::Fedex, "authentication", &error)
            } else {
                CarrierError::authentication(
                    CarrierId::Fedex,
                    format!("authentication failed: {}", error.message()),
                )
            }
        })?;

        if !response.is_success() {
            tracing::warn!(carrier = "fedex", status = response.status, "authentication rejected");
            return Err(CarrierError::authentication(
                CarrierId::Fedex,
                format!("authentication failed with status {}", response.status),
            ));
        }

        let (token, _raw): (OAuthTokenResponse, _) =
            parse_body(CarrierId::Fedex, &response.body, "token response")?;
        let lifetime = Duration::seconds(i64::try_from(token.expires_in).unwrap_or(i64::MAX))
            - TOKEN_SAFETY_MARGIN;
        tracing::debug!(carrier = "fedex", expires_in = token.expires_in, "authenticated");
        Ok(ProviderToken::expiring_in(token.access_token, issued_at, lifetime))
    }

    fn rate_request_body<'s>(
        &'s self,
        shipment: &'s ShipmentRequest,
    ) -> Result<FedexRateRequest<'s>, CarrierError> {
        let account_number = shipment
            .shipper()
            .account_number()
            .or(self.settings.account_number.as_deref())
            .ok_or_else(|| {
                CarrierError::invalid_request(
                    CarrierId::Fedex,
                    "FedEx account number is not configured",
                )
            })?;
        let ship_date = self.tokens.now().date().next_day().unwrap_or(self.tokens.now().date());

        Ok(FedexRateRequest {
            account_number: FedexAccountNumber {
                value: account_number,
            },
            requested_shipment: FedexRequestedShipment {
                pickup_type: "DROPOFF_AT_FEDEX_LOCATION",
                shipper: FedexParty::new(shipment.shipper(), false),
                recipient: FedexParty::new(shipment.recipient(), true),
                ship_date_stamp: format_date(ship_date),
                rate_request_type: ["LIST"],
                requested_package_line_items: shipment
                    .packages()
                    .iter()
                    .enumerate()
                    .map(|(index, package)| FedexLineItem::new(index, package))
                    .collect(),
            },
        })
    }
}

impl CarrierAdapter for FedexAdapter {
    fn carrier(&self) -> CarrierId {
        CarrierId::Fedex
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
            let body = serde_json::to_value(self.rate_request_body(shipment)?).map_err(|error| {
                CarrierError::internal(CarrierId::Fedex, format!("rate request encoding: {error}"))
            })?;
            let token = self.authenticate().await?;

            let request = HttpRequest::post(endpoint(&self.settings.base_url, RATE_PATH))
                .with_json_body(&body)
                .with_auth(&HttpAuth::BearerToken(token))
                .with_header("X-locale", "en_US")
                .with_timeout_ms(self.timeout_ms);

            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| {
                    CarrierError::from_transport(CarrierId::Fedex, "rate request failed", &error)
                })?;

            if response.is_unauthorized() {
                self.tokens.clear().await;
                return Err(CarrierError::authentication(
                    CarrierId::Fedex,
                    "authorization expired; token cleared, retry to re-authenticate",
                ));
            }
            if !response.is_success() {
                return Err(status_error(CarrierId::Fedex, "rate request", &response));
            }

            let (reply, raw): (FedexRateReply, _) =
                parse_body(CarrierId::Fedex, &response.body, "rate response")?;
            let quotes = reply
                .output
                .map(|output| output.rate_reply_details)
                .unwrap_or_default()
                .into_iter()
                .map(normalize_reply_detail)
                .collect::<Vec<_>>();
            tracing::debug!(carrier = "fedex", quotes = quotes.len(), "rates received");
            Ok(RateBatch::new(CarrierId::Fedex, quotes).with_raw_response(raw))
        })
    }
}

fn normalize_reply_detail(detail: FedexRateReplyDetail) -> RateQuote {
    let rated = detail.rated_shipment_details.into_iter().next();
    // A zero net charge falls through to the base charge.
    let cost = rated
        .as_ref()
        .and_then(|rated| {
            rated
                .total_net_charge
                .filter(|charge| *charge != 0.0)
                .or(rated.total_base_charge.filter(|charge| *charge != 0.0))
        })
        .filter(|charge| charge.is_finite() && *charge >= 0.0)
        .unwrap_or(0.0);
    let transit_time = rated
        .as_ref()
        .and_then(|rated| rated.transit_time.clone())
        .or(detail.operational_detail.and_then(|detail| detail.transit_time))
        .filter(|transit| !transit.trim().is_empty())
        .unwrap_or_else(|| UNAVAILABLE.to_owned());

    RateQuote {
        id: format!("fedex_{}", detail.service_type.to_ascii_lowercase()),
        carrier: CarrierId::Fedex.display_name().to_owned(),
        service_name: detail
            .service_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| detail.service_type.clone()),
        service_code: detail.service_type,
        cost,
        currency: rated
            .and_then(|rated| rated.currency)
            .filter(|currency| !currency.trim().is_empty())
            .unwrap_or_else(|| String::from("USD")),
        transit_time,
        delivery_date: None,
        estimated_delivery: Some(UNAVAILABLE.to_owned()),
    }
}

/// Keeps positive dimensions, substituting the carrier default otherwise.
fn lenient_dimension(value: f64, default: f64, field: &'static str) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        tracing::debug!(carrier = "fedex", field, value, default, "substituting default dimension");
        default
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexRateRequest<'a> {
    account_number: FedexAccountNumber<'a>,
    requested_shipment: FedexRequestedShipment<'a>,
}

#[derive(Debug, Serialize)]
struct FedexAccountNumber<'a> {
    value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexRequestedShipment<'a> {
    pickup_type: &'static str,
    shipper: FedexParty<'a>,
    recipient: FedexParty<'a>,
    ship_date_stamp: String,
    rate_request_type: [&'static str; 1],
    requested_package_line_items: Vec<FedexLineItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexParty<'a> {
    contact: FedexContact<'a>,
    address: FedexAddress<'a>,
}

impl<'a> FedexParty<'a> {
    fn new(party: &'a Party, residential: bool) -> Self {
        Self {
            contact: FedexContact {
                person_name: party.name(),
            },
            address: FedexAddress::new(party.address(), residential),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexContact<'a> {
    person_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexAddress<'a> {
    street_lines: [&'a str; 1],
    city: &'a str,
    state_or_province_code: &'a str,
    postal_code: &'a str,
    country_code: &'a str,
    residential: bool,
}

impl<'a> FedexAddress<'a> {
    fn new(address: &'a Address, residential: bool) -> Self {
        Self {
            street_lines: [address.street()],
            city: address.city(),
            state_or_province_code: address.state(),
            postal_code: address.zip_code(),
            country_code: address.country(),
            residential,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FedexLineItem {
    sequence_number: usize,
    weight: FedexWeight,
    dimensions: FedexDimensions,
}

impl FedexLineItem {
    fn new(index: usize, package: &Package) -> Self {
        let dimensions = package.dimensions();
        Self {
            sequence_number: index + 1,
            weight: FedexWeight {
                units: "LB",
                value: package.weight().max(MIN_WEIGHT_LB),
            },
            dimensions: FedexDimensions {
                length: lenient_dimension(dimensions.length(), DEFAULT_LENGTH_IN, "length"),
                width: lenient_dimension(dimensions.width(), DEFAULT_WIDTH_IN, "width"),
                height: lenient_dimension(dimensions.height(), DEFAULT_HEIGHT_IN, "height"),
                units: "IN",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct FedexWeight {
    units: &'static str,
    value: f64,
}

#[derive(Debug, Serialize)]
struct FedexDimensions {
    length: f64,
    width: f64,
    height: f64,
    units: &'static str,
}

#[derive(Debug, Deserialize)]
struct FedexRateReply {
    #[serde(default)]
    output: Option<FedexOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedexOutput {
    #[serde(default)]
    rate_reply_details: Vec<FedexRateReplyDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedexRateReplyDetail {
    service_type: String,
    #[serde(default)]
    service_name: Option<String>,
    #[serde(default)]
    rated_shipment_details: Vec<FedexRatedShipmentDetail>,
    #[serde(default)]
    operational_detail: Option<FedexOperationalDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedexRatedShipmentDetail {
    #[serde(default)]
    total_net_charge: Option<f64>,
    #[serde(default)]
    total_base_charge: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    transit_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedexOperationalDetail {
    #[serde(default)]
    transit_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::http_client::{HttpError, HttpResponse};
    use crate::{Dimensions, FixedClock, UtcDateTime};

    struct RecordingHttpClient {
        responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn scripted(responses: Vec<Result<HttpResponse, HttpError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(
            &'a self,
            request: HttpRequest,
        ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let mut responses = self
                .responses
                .lock()
                .expect("response script should not be poisoned");
            let response = if responses.is_empty() {
                Err(HttpError::new("no scripted response left"))
            } else {
                responses.remove(0)
            };
            Box::pin(async move { response })
        }
    }

    fn shipment(weight: f64) -> ShipmentRequest {
        let party = |name: &str, zip: &str| {
            Party::new(
                name,
                Address::new("1 Main St", "Town", "CA", zip, "US").expect("address"),
                None,
            )
            .expect("party")
        };
        let package = Package::new(weight, Dimensions::new(10.0, 8.0, 6.0).expect("dims"))
            .expect("package");
        ShipmentRequest::new(party("Ann", "90210"), party("Bob", "10001"), vec![package])
            .expect("shipment")
    }

    fn adapter(client: Arc<RecordingHttpClient>) -> FedexAdapter {
        let now = UtcDateTime::parse("2024-03-01T09:00:00Z").expect("valid");
        FedexAdapter::with_http_client(
            CarrierSettings::new("https://fedex.test")
                .with_credentials("key", "secret")
                .with_account_number("740561073"),
            client,
            Arc::new(FixedClock::new(now)),
        )
    }

    const TOKEN: &str = r#"{"access_token":"fx-1","token_type":"bearer","expires_in":3600,"scope":"CXS"}"#;

    #[tokio::test]
    async fn when_net_charge_is_missing_then_base_charge_is_used() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![
            Ok(HttpResponse::ok_json(TOKEN)),
            Ok(HttpResponse::ok_json(
                r#"{"output":{"rateReplyDetails":[
                    {"serviceType":"FEDEX_GROUND","serviceName":"FedEx Ground","ratedShipmentDetails":[{"totalBaseCharge":18.4,"currency":"USD"}]},
                    {"serviceType":"FEDEX_2_DAY","ratedShipmentDetails":[{"totalNetCharge":31.05,"totalBaseCharge":40.0,"currency":"USD","transitTime":"TWO_DAYS"}]},
                    {"serviceType":"PRIORITY_OVERNIGHT","ratedShipmentDetails":[]}
                ]}}"#,
            )),
        ]));

        let batch = adapter(client).rates(&shipment(5.0)).await.expect("rates");

        assert_eq!(batch.quotes.len(), 3);
        assert_eq!(batch.quotes[0].id, "fedex_fedex_ground");
        assert_eq!(batch.quotes[0].cost, 18.4);
        assert_eq!(batch.quotes[0].transit_time, UNAVAILABLE);
        assert_eq!(batch.quotes[1].service_name, "FEDEX_2_DAY");
        assert_eq!(batch.quotes[1].cost, 31.05);
        assert_eq!(batch.quotes[1].transit_time, "TWO_DAYS");
        assert_eq!(batch.quotes[2].cost, 0.0);
        assert_eq!(batch.quotes[2].currency, "USD");
    }

    #[tokio::test]
    async fn rate_request_carries_fedex_wire_format() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![
            Ok(HttpResponse::ok_json(TOKEN)),
            Ok(HttpResponse::ok_json(r#"{"output":{"rateReplyDetails":[]}}"#)),
        ]));

        adapter(client.clone()).rates(&shipment(0.5)).await.expect("rates");

        let requests = client.recorded_requests();
        assert_eq!(requests[0].url, "https://fedex.test/oauth/token");
        assert_eq!(
            requests[0].body.as_deref(),
            Some("grant_type=client_credentials&client_id=key&client_secret=secret")
        );

        let body: serde_json::Value =
            serde_json::from_str(requests[1].body.as_deref().expect("body")).expect("json");
        assert_eq!(body["accountNumber"]["value"], "740561073");
        let shipment = &body["requestedShipment"];
        assert_eq!(shipment["pickupType"], "DROPOFF_AT_FEDEX_LOCATION");
        assert_eq!(shipment["shipDateStamp"], "2024-03-02");
        assert_eq!(shipment["rateRequestType"][0], "LIST");
        assert_eq!(shipment["recipient"]["address"]["residential"], true);
        let item = &shipment["requestedPackageLineItems"][0];
        assert_eq!(item["sequenceNumber"], 1);
        assert_eq!(item["weight"]["value"], 1.0);
        assert_eq!(item["dimensions"]["length"], 10.0);
    }

    fn adapter_without_account(client: Arc<RecordingHttpClient>) -> FedexAdapter {
        FedexAdapter::with_http_client(
            CarrierSettings::new("https://fedex.test").with_credentials("key", "secret"),
            client,
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn when_shipper_has_an_account_then_it_is_billed() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![
            Ok(HttpResponse::ok_json(TOKEN)),
            Ok(HttpResponse::ok_json(r#"{"output":{"rateReplyDetails":[]}}"#)),
        ]));
        let shipper = Party::new(
            "Ann",
            Address::new("1 Main St", "Town", "CA", "90210", "US").expect("address"),
            Some(String::from("510087020")),
        )
        .expect("shipper");
        let base = shipment(5.0);
        let shipment =
            ShipmentRequest::new(shipper, base.recipient().clone(), base.packages().to_vec())
                .expect("shipment");

        adapter_without_account(client.clone())
            .rates(&shipment)
            .await
            .expect("rates");

        let requests = client.recorded_requests();
        let body: serde_json::Value =
            serde_json::from_str(requests[1].body.as_deref().expect("body")).expect("json");
        assert_eq!(body["accountNumber"]["value"], "510087020");
    }

    #[tokio::test]
    async fn when_no_account_is_known_then_nothing_is_sent() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![Ok(HttpResponse::ok_json(
            TOKEN,
        ))]));

        let error = adapter_without_account(client.clone())
            .rates(&shipment(5.0))
            .await
            .expect_err("missing account");

        assert_eq!(error.code(), "carrier.invalid_request");
        assert!(client.recorded_requests().is_empty());
    }

    #[tokio::test]
    async fn when_provider_rejects_request_then_error_lists_codes() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![
            Ok(HttpResponse::ok_json(TOKEN)),
            Ok(HttpResponse::new(
                400,
                r#"{"errors":[{"code":"SERVICE.PACKAGECOMBINATION.INVALID","message":"Invalid package combination"}]}"#,
            )),
        ]));

        let error = adapter(client).rates(&shipment(5.0)).await.expect_err("rejected");

        assert_eq!(error.code(), "carrier.provider_request");
        assert!(error
            .message()
            .contains("SERVICE.PACKAGECOMBINATION.INVALID: Invalid package combination"));
    }

    #[tokio::test]
    async fn token_lifetime_is_shortened_by_safety_margin() {
        let client = Arc::new(RecordingHttpClient::scripted(vec![Ok(HttpResponse::ok_json(
            TOKEN,
        ))]));
        let adapter = adapter(client);

        adapter.authenticate().await.expect("token");

        let token = adapter.token_cache().current().await.expect("cached");
        assert_eq!(token.expires_at().format_rfc3339(), "2024-03-01T09:59:00Z");
    }

    #[test]
    fn invalid_dimensions_fall_back_to_defaults() {
        assert_eq!(lenient_dimension(f64::NAN, DEFAULT_LENGTH_IN, "length"), 12.0);
        assert_eq!(lenient_dimension(0.0, DEFAULT_WIDTH_IN, "width"), 8.0);
        assert_eq!(lenient_dimension(4.0, DEFAULT_HEIGHT_IN, "height"), 4.0);
    }
}
