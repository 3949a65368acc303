//! Contract tests shared by every carrier adapter.
//!
//! Each adapter is driven through a scripted HTTP client that records every
//! outgoing request, so token reuse and refresh can be asserted by counting
//! calls to the OAuth endpoint.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use shiprate_core::{
    CarrierAdapter, CarrierErrorKind, CarrierId, CarrierSettings, FedexAdapter, FixedClock,
    HttpClient, HttpError, HttpRequest, HttpResponse, MockCarrierAdapter, MockRateGenerator,
    ShipmentRequest, UpsAdapter, UNAVAILABLE,
};
use shiprate_tests::{friday_clock, shipment_between};
use time::Duration;

struct ScriptedHttpClient {
    responses: Mutex<Vec<Result<HttpResponse, HttpError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    fn new(responses: Vec<Result<HttpResponse, HttpError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls_to(&self, path_suffix: &str) -> usize {
        self.requests
            .lock()
            .expect("request log")
            .iter()
            .filter(|request| request.url.ends_with(path_suffix))
            .count()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        self.requests.lock().expect("request log").push(request);
        let mut responses = self.responses.lock().expect("response script");
        let response = if responses.is_empty() {
            Err(HttpError::new("no scripted response left"))
        } else {
            responses.remove(0)
        };
        Box::pin(async move { response })
    }
}

fn shipment() -> ShipmentRequest {
    shipment_between(5.0, "90210", "10001")
}

const UPS_TOKEN: &str = r#"{"access_token":"ups-token","expires_in":"3600"}"#;
const UPS_RATES: &str = r#"{"RateResponse":{"RatedShipment":[
    {"Service":{"Code":"03"},"TotalCharges":{"CurrencyCode":"USD","MonetaryValue":"15.42"},"GuaranteedDelivery":{"BusinessDaysInTransit":"4"}},
    {"Service":{"Code":"02"},"TotalCharges":{"CurrencyCode":"USD","MonetaryValue":"29.10"},"GuaranteedDelivery":{"BusinessDaysInTransit":"2"}}
]}}"#;
const FEDEX_TOKEN: &str = r#"{"access_token":"fedex-token","token_type":"bearer","expires_in":3600}"#;
const FEDEX_RATES: &str = r#"{"output":{"rateReplyDetails":[
    {"serviceType":"FEDEX_GROUND","serviceName":"FedEx Ground","ratedShipmentDetails":[{"totalNetCharge":14.2,"currency":"USD"}]}
]}}"#;

fn ups_adapter(client: Arc<ScriptedHttpClient>, clock: Arc<FixedClock>) -> UpsAdapter {
    UpsAdapter::with_http_client(
        CarrierSettings::new("https://ups.test/api").with_credentials("id", "secret"),
        client,
        clock,
    )
}

fn fedex_adapter(client: Arc<ScriptedHttpClient>, clock: Arc<FixedClock>) -> FedexAdapter {
    FedexAdapter::with_http_client(
        CarrierSettings::new("https://fedex.test")
            .with_credentials("key", "secret")
            .with_account_number("740561073"),
        client,
        clock,
    )
}

#[tokio::test]
async fn when_token_is_still_valid_second_rate_call_reuses_it_and_expiry_forces_refresh() {
    // Given: a UPS adapter whose tokens live for one hour
    let clock = friday_clock();
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(UPS_TOKEN)),
        Ok(HttpResponse::ok_json(UPS_RATES)),
        Ok(HttpResponse::ok_json(UPS_RATES)),
        Ok(HttpResponse::ok_json(UPS_TOKEN)),
        Ok(HttpResponse::ok_json(UPS_RATES)),
    ]);
    let adapter = ups_adapter(client.clone(), clock.clone());

    // When: two rate calls happen within the token lifetime
    adapter.rates(&shipment()).await.expect("first rates");
    adapter.rates(&shipment()).await.expect("second rates");

    // Then: only one token request was made
    assert_eq!(client.calls_to("/security/v1/oauth/token"), 1);

    // When: the token expires and a third call is made
    clock.advance(Duration::seconds(3601));
    adapter.rates(&shipment()).await.expect("third rates");

    // Then: the adapter re-authenticated exactly once more
    assert_eq!(client.calls_to("/security/v1/oauth/token"), 2);
    assert_eq!(client.calls_to("/rating/v1/Rate"), 3);
}

#[tokio::test]
async fn when_fedex_token_is_inside_safety_margin_it_is_refreshed() {
    // Given: a FedEx token that nominally lives 3600s
    let clock = friday_clock();
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(FEDEX_TOKEN)),
        Ok(HttpResponse::ok_json(FEDEX_RATES)),
        Ok(HttpResponse::ok_json(FEDEX_TOKEN)),
        Ok(HttpResponse::ok_json(FEDEX_RATES)),
    ]);
    let adapter = fedex_adapter(client.clone(), clock.clone());
    adapter.rates(&shipment()).await.expect("first rates");

    // When: only 3550s have elapsed, inside the 60s safety margin
    clock.advance(Duration::seconds(3550));
    adapter.rates(&shipment()).await.expect("second rates");

    // Then: a fresh token was fetched anyway
    assert_eq!(client.calls_to("/oauth/token"), 2);
}

#[tokio::test]
async fn when_provider_rejects_authorization_token_is_cleared_before_error() {
    for carrier in CarrierId::ALL {
        // Given: an authenticated adapter whose rate call returns 401
        let clock = friday_clock();
        let (token, rates) = match carrier {
            CarrierId::Ups => (UPS_TOKEN, UPS_RATES),
            CarrierId::Fedex => (FEDEX_TOKEN, FEDEX_RATES),
        };
        let client = ScriptedHttpClient::new(vec![
            Ok(HttpResponse::ok_json(token)),
            Ok(HttpResponse::new(401, r#"{"response":{"errors":[]}}"#)),
            Ok(HttpResponse::ok_json(token)),
            Ok(HttpResponse::ok_json(rates)),
        ]);
        let adapter: Box<dyn CarrierAdapter> = match carrier {
            CarrierId::Ups => Box::new(ups_adapter(client.clone(), clock)),
            CarrierId::Fedex => Box::new(fedex_adapter(client.clone(), clock)),
        };

        // When: the rate call is rejected
        let error = adapter
            .rates(&shipment())
            .await
            .expect_err("401 must surface as an error");

        // Then: it is an authentication error and the next call re-authenticates
        assert_eq!(error.kind(), CarrierErrorKind::Authentication, "{carrier}");
        assert_eq!(error.carrier(), carrier);
        let batch = adapter.rates(&shipment()).await.expect("retry succeeds");
        assert!(!batch.quotes.is_empty(), "{carrier}");

        let token_path = match carrier {
            CarrierId::Ups => "/security/v1/oauth/token",
            CarrierId::Fedex => "/oauth/token",
        };
        assert_eq!(client.calls_to(token_path), 2, "{carrier}");
    }
}

#[tokio::test]
async fn when_rate_call_times_out_error_is_classified_as_timeout() {
    // Given: a UPS adapter whose rate call times out
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(UPS_TOKEN)),
        Err(HttpError::timeout("request timed out after 30000ms")),
    ]);
    let adapter = ups_adapter(client, friday_clock());

    // When
    let error = adapter.rates(&shipment()).await.expect_err("timeout");

    // Then
    assert_eq!(error.kind(), CarrierErrorKind::Timeout);
    assert_eq!(error.code(), "carrier.timeout");
}

#[tokio::test]
async fn when_provider_returns_server_error_details_are_folded_into_message() {
    // Given: FedEx answers the rate call with a structured 500 body
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(FEDEX_TOKEN)),
        Ok(HttpResponse::new(
            500,
            r#"{"errors":[{"code":"SYSTEM.UNAVAILABLE","message":"try later"}]}"#,
        )),
    ]);
    let adapter = fedex_adapter(client, friday_clock());

    // When
    let error = adapter.rates(&shipment()).await.expect_err("500");

    // Then
    assert_eq!(error.kind(), CarrierErrorKind::ProviderRequest);
    assert!(error.message().contains("SYSTEM.UNAVAILABLE: try later"));
}

#[tokio::test]
async fn every_adapter_normalizes_into_the_shared_quote_shape() {
    let clock = friday_clock();
    let ups_client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(UPS_TOKEN)),
        Ok(HttpResponse::ok_json(UPS_RATES)),
    ]);
    let fedex_client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(FEDEX_TOKEN)),
        Ok(HttpResponse::ok_json(FEDEX_RATES)),
    ]);
    let adapters: Vec<Box<dyn CarrierAdapter>> = vec![
        Box::new(ups_adapter(ups_client, clock.clone())),
        Box::new(fedex_adapter(fedex_client, clock.clone())),
        Box::new(MockCarrierAdapter::new(
            CarrierId::Ups,
            MockRateGenerator::new(clock.clone()),
        )),
    ];

    for adapter in adapters {
        let carrier = adapter.carrier();
        let batch = adapter.rates(&shipment()).await.expect("rates");

        assert_eq!(batch.carrier, carrier);
        assert!(!batch.quotes.is_empty(), "{carrier}: quotes");
        for quote in &batch.quotes {
            assert_eq!(quote.carrier, carrier.display_name());
            assert!(quote.cost >= 0.0 && quote.cost.is_finite(), "{carrier}: cost");
            assert!(!quote.currency.is_empty(), "{carrier}: currency");
            assert!(!quote.transit_time.is_empty(), "{carrier}: transit");
            assert!(
                quote.id.starts_with(carrier.as_str()),
                "{carrier}: id {}",
                quote.id
            );
        }
    }
}

#[tokio::test]
async fn when_fedex_reply_omits_transit_fields_they_default_to_unavailable() {
    let client = ScriptedHttpClient::new(vec![
        Ok(HttpResponse::ok_json(FEDEX_TOKEN)),
        Ok(HttpResponse::ok_json(FEDEX_RATES)),
    ]);
    let batch = fedex_adapter(client, friday_clock())
        .rates(&shipment())
        .await
        .expect("rates");

    let quote = &batch.quotes[0];
    assert_eq!(quote.transit_time, UNAVAILABLE);
    assert_eq!(quote.estimated_delivery.as_deref(), Some(UNAVAILABLE));
    assert_eq!(quote.cost, 14.2);
}
