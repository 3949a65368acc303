//! Behavior-driven tests for Error Handling and Security behavior
//!
//! These tests verify HOW the system rejects malformed input, degrades when
//! the quote cache misbehaves and keeps secrets out of logs and storage.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use shiprate_core::{
    CacheError, CacheKey, CarrierAdapter, CarrierId, CarrierSelector, CarrierSettings, Clock,
    CoreError, FixedClock, HistoryLimit, MockCarrierAdapter, MockRateGenerator, ProviderToken,
    QuoteHistoryEntry, QuoteStore, QuoteWarehouse, QuoteWrite, RateAggregator, RateLookupRequest,
    RateLookupResponse, RateQuote, ShipmentRequest, UtcDateTime, ValidationError,
    WarehouseQuoteStore,
};
use time::Duration;

fn shipment_json(recipient_zip: &str, weight: f64) -> serde_json::Value {
    json!({
        "shipper": {"name": "Ann", "address": {"street": "1 Main St", "city": "Beverly Hills", "state": "CA", "zipCode": "90210"}},
        "recipient": {"name": "Bob", "address": {"street": "2 Broadway", "city": "New York", "state": "NY", "zipCode": recipient_zip}},
        "packages": [{"weight": weight, "dimensions": {"length": 10.0, "width": 8.0, "height": 6.0}}]
    })
}

fn parse(value: serde_json::Value) -> Result<ShipmentRequest, serde_json::Error> {
    serde_json::from_value(value)
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        UtcDateTime::parse("2024-03-01T12:00:00Z").expect("valid"),
    ))
}

// =============================================================================
// Error Handling: Input Validation
// =============================================================================

#[test]
fn when_zip_code_is_malformed_shipment_is_rejected() {
    for zip in ["1234", "123456", "ABCDE", "12345-67", ""] {
        let error = parse(shipment_json(zip, 5.0)).expect_err("zip must be rejected");
        assert!(error.to_string().contains("zip code"), "{zip}: {error}");
    }
}

#[test]
fn when_zip_code_has_plus_four_suffix_shipment_is_accepted() {
    let shipment = parse(shipment_json("10001-1234", 5.0)).expect("ZIP+4 is valid");
    assert_eq!(shipment.recipient().address().zip_code(), "10001-1234");
}

#[test]
fn when_package_weight_is_outside_limits_shipment_is_rejected() {
    for weight in [0.0, -1.0, 150.5] {
        let error = parse(shipment_json("10001", weight)).expect_err("weight rejected");
        assert!(error.to_string().contains("weight"), "{weight}: {error}");
    }
    assert!(parse(shipment_json("10001", 150.0)).is_ok());
}

#[test]
fn when_packages_are_missing_shipment_is_rejected() {
    let mut value = shipment_json("10001", 5.0);
    value["packages"] = json!([]);

    let error = parse(value).expect_err("empty packages");
    assert!(error.to_string().contains("at least one package"));
}

#[test]
fn when_carrier_selector_is_unknown_request_is_rejected() {
    let error = "dhl"
        .parse::<CarrierSelector>()
        .expect_err("unknown carrier");
    assert!(matches!(error, ValidationError::InvalidCarrier { .. }));

    let request = json!({"carrier": "usps", "shipmentData": shipment_json("10001", 5.0)});
    assert!(serde_json::from_value::<RateLookupRequest>(request).is_err());
}

#[test]
fn when_history_limit_is_out_of_range_it_is_rejected() {
    for value in [0, -5, 51] {
        let error = HistoryLimit::new(value).expect_err("out of range");
        assert_eq!(error, ValidationError::InvalidHistoryLimit { value });
    }
    assert_eq!(HistoryLimit::new(1).expect("min").get(), 1);
    assert_eq!(HistoryLimit::new(50).expect("max").get(), 50);
}

#[test]
fn when_validation_fails_response_uses_the_failure_form() {
    let error = CoreError::from(ValidationError::EmptyCustomerId);
    let response = RateLookupResponse::failed(
        &error,
        UtcDateTime::parse("2024-03-01T12:00:00Z").expect("valid"),
    );

    let json = serde_json::to_value(&response).expect("json");
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Invalid rate request");
    assert_eq!(json["details"], "customer id cannot be empty");
    assert!(json.get("rates").is_none());
    assert!(json.get("failures").is_none());
}

// =============================================================================
// Error Handling: Cache Degradation
// =============================================================================

#[derive(Default)]
struct BrokenQuoteStore {
    lookups: AtomicUsize,
    writes: AtomicUsize,
}

impl QuoteStore for BrokenQuoteStore {
    fn lookup_fresh<'a>(
        &'a self,
        _key: &'a CacheKey,
        _now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RateQuote>, CacheError>> + Send + 'a>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(CacheError::Rejected(String::from("disk is read-only"))) })
    }

    fn replace<'a>(
        &'a self,
        _write: QuoteWrite,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Err(CacheError::Rejected(String::from("disk is read-only"))) })
    }

    fn purge_expired<'a>(
        &'a self,
        _now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        Box::pin(async { Err(CacheError::Rejected(String::from("disk is read-only"))) })
    }

    fn history_by_customer<'a>(
        &'a self,
        _customer_id: &'a str,
        _limit: HistoryLimit,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QuoteHistoryEntry>, CacheError>> + Send + 'a>>
    {
        Box::pin(async { Err(CacheError::Rejected(String::from("disk is read-only"))) })
    }
}

#[tokio::test]
async fn when_quote_cache_fails_rates_are_still_returned() {
    // Given: working carriers behind a cache that fails every read and write
    let clock = clock();
    let generator = MockRateGenerator::new(clock.clone());
    let adapters: Vec<Arc<dyn CarrierAdapter>> = CarrierId::ALL
        .iter()
        .map(|carrier| {
            Arc::new(MockCarrierAdapter::new(*carrier, generator.clone())) as Arc<dyn CarrierAdapter>
        })
        .collect();
    let store = Arc::new(BrokenQuoteStore::default());
    let aggregator = RateAggregator::new(adapters, store.clone(), clock as Arc<dyn Clock>);
    let shipment = parse(shipment_json("10001", 5.0)).expect("shipment");

    // When: rates are requested through the cached path
    let outcome = aggregator
        .aggregate(CarrierSelector::All, &shipment, Some("cust-1"), false)
        .await
        .expect("cache errors never fail the request");

    // Then: fresh rates come back and both cache operations were attempted
    assert!(!outcome.cached);
    assert_eq!(outcome.quotes.len(), 6);
    assert!(outcome.partial_failures.is_empty());
    assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn when_quote_cache_fails_maintenance_calls_surface_the_error() {
    let clock = clock();
    let aggregator = RateAggregator::new(
        Vec::new(),
        Arc::new(BrokenQuoteStore::default()),
        clock as Arc<dyn Clock>,
    );

    let purge = aggregator.purge_expired().await.expect_err("purge fails");
    assert!(purge.to_string().contains("disk is read-only"));

    let history = aggregator
        .history("cust-1", HistoryLimit::DEFAULT)
        .await
        .expect_err("history fails");
    assert!(matches!(history, CacheError::Rejected(_)));
}

// =============================================================================
// Security: Injection Resistance
// =============================================================================

#[tokio::test]
async fn when_customer_id_contains_sql_it_is_stored_as_plain_text() {
    // Given: a customer id shaped like an injection attempt
    let hostile = "cust'; DROP TABLE rate_quotes; --";
    let store = WarehouseQuoteStore::new(QuoteWarehouse::open_in_memory().expect("warehouse"));
    let shipment = parse(shipment_json("10001", 5.0)).expect("shipment");
    let created = UtcDateTime::parse("2024-03-01T12:00:00Z").expect("valid");
    let quote = RateQuote {
        id: String::from("ups_03"),
        carrier: String::from("UPS"),
        service_code: String::from("03"),
        service_name: String::from("UPS Ground"),
        cost: 15.0,
        currency: String::from("USD"),
        transit_time: String::from("3 business days"),
        delivery_date: None,
        estimated_delivery: None,
    };

    // When: quotes are written and read back for that customer
    store
        .replace(QuoteWrite {
            cache_key: shiprate_core::cache_key_for(CarrierSelector::Ups, &shipment),
            customer_id: Some(hostile.to_owned()),
            shipment,
            quotes: vec![quote],
            raw_responses: Default::default(),
            created_at: created,
            expires_at: created.saturating_add(Duration::minutes(5)),
        })
        .await
        .expect("replace");
    let history = store
        .history_by_customer(hostile, HistoryLimit::DEFAULT)
        .await
        .expect("history");

    // Then: the id round-trips literally and the table is intact
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].customer_id.as_deref(), Some(hostile));
    assert_eq!(store.warehouse().count_quotes().expect("count"), 1);
}

// =============================================================================
// Security: Secret Handling
// =============================================================================

#[test]
fn when_carrier_settings_are_debug_printed_secrets_are_hidden() {
    let settings = CarrierSettings::new("https://ups.test/api")
        .with_credentials("client-id-123", "super-secret-value");

    let rendered = format!("{settings:?}");

    assert!(!rendered.contains("client-id-123"));
    assert!(!rendered.contains("super-secret-value"));
    assert!(rendered.contains("has_client_secret: true"));
}

#[test]
fn when_provider_token_is_debug_printed_access_token_is_hidden() {
    let token = ProviderToken::new(
        "eyJhbGciOiJIUzI1NiJ9.secret",
        UtcDateTime::parse("2024-03-01T13:00:00Z").expect("valid"),
    );

    let rendered = format!("{token:?}");

    assert!(!rendered.contains("eyJhbGciOiJIUzI1NiJ9"));
    assert!(rendered.contains("<redacted>"));
}
