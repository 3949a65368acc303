//! Request/response facade over [`RateAggregator`].
//!
//! Accepts the JSON-shaped inbound requests (`{carrier, shipmentData,
//! customerId?}`), validates what the domain constructors do not cover and
//! renders `success`-flagged responses stamped with an RFC3339 timestamp.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shiprate_warehouse::{QuoteWarehouse, WarehouseConfig};

use crate::adapters::{FedexAdapter, MockCarrierAdapter, UpsAdapter};
use crate::aggregator::{AdapterFailure, ConnectionReport, RateAggregator};
use crate::carrier_adapter::CarrierAdapter;
use crate::quote_store::{CacheError, HistoryLimit, QuoteHistoryEntry, WarehouseQuoteStore};
use crate::{
    CarrierId, CarrierSelector, Clock, CoreError, MockRateGenerator, RateQuote, ShipmentRequest,
    ShippingConfig, SystemClock, UtcDateTime, ValidationError,
};

const SERVICE_NAME: &str = "shiprate";

/// Inbound rate lookup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLookupRequest {
    pub carrier: CarrierSelector,
    pub shipment_data: ShipmentRequest,
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// `{success, rates, cached}` on success, `{success: false, error, details}` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLookupResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates: Option<Vec<RateQuote>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<AdapterFailure>,
    pub timestamp: UtcDateTime,
}

impl RateLookupResponse {
    pub fn quoted(rates: Vec<RateQuote>, cached: bool, timestamp: UtcDateTime) -> Self {
        Self {
            success: true,
            rates: Some(rates),
            cached: Some(cached),
            error: None,
            details: None,
            failures: Vec::new(),
            timestamp,
        }
    }

    /// Failure form of a rate lookup error.
    pub fn failed(error: &CoreError, timestamp: UtcDateTime) -> Self {
        let (summary, failures) = match error {
            CoreError::Validation(_) => ("Invalid rate request", Vec::new()),
            CoreError::Aggregation(aggregation) => {
                ("Failed to get shipping rates", aggregation.failures().to_vec())
            }
            CoreError::Store(_) | CoreError::Serialization(_) => {
                ("Failed to get shipping rates", Vec::new())
            }
        };
        Self {
            success: false,
            rates: None,
            cached: None,
            error: Some(summary.to_owned()),
            details: Some(error.to_string()),
            failures,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteHistoryResponse {
    pub success: bool,
    pub customer_id: String,
    pub count: usize,
    pub data: Vec<QuoteHistoryEntry>,
    pub timestamp: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub success: bool,
    pub removed: usize,
    pub message: String,
    pub timestamp: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub mock_mode: bool,
    pub timestamp: UtcDateTime,
}

/// Entry point used by the CLI and by embedding callers.
pub struct ShippingService {
    aggregator: RateAggregator,
    clock: Arc<dyn Clock>,
    use_mock: bool,
}

impl ShippingService {
    pub fn new(aggregator: RateAggregator, clock: Arc<dyn Clock>, use_mock: bool) -> Self {
        Self {
            aggregator,
            clock,
            use_mock,
        }
    }

    /// Wires adapters, the on-disk quote store and the system clock from `config`.
    pub fn from_config(config: &ShippingConfig) -> Result<Self, CoreError> {
        let warehouse_config = WarehouseConfig::for_home(config.shiprate_home.clone());
        let warehouse = QuoteWarehouse::open(warehouse_config).map_err(CacheError::from)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let adapters = build_adapters(config, &clock);

        tracing::debug!(
            mock = config.use_mock,
            ups_credentials = config.ups.has_credentials(),
            fedex_credentials = config.fedex.has_credentials(),
            "shipping service configured"
        );

        let aggregator = RateAggregator::new(
            adapters,
            Arc::new(WarehouseQuoteStore::new(warehouse)),
            Arc::clone(&clock),
        )
        .with_cache_ttl(config.cache_ttl);

        Ok(Self::new(aggregator, clock, config.use_mock))
    }

    pub fn use_mock(&self) -> bool {
        self.use_mock
    }

    pub fn aggregator(&self) -> &RateAggregator {
        &self.aggregator
    }

    pub fn now(&self) -> UtcDateTime {
        self.clock.now()
    }

    /// Aggregates rates using the configured mock mode.
    pub async fn get_rates(
        &self,
        request: RateLookupRequest,
    ) -> Result<RateLookupResponse, CoreError> {
        self.get_rates_with_mode(request, self.use_mock).await
    }

    pub async fn get_rates_with_mode(
        &self,
        request: RateLookupRequest,
        use_mock: bool,
    ) -> Result<RateLookupResponse, CoreError> {
        let customer_id = request
            .customer_id
            .as_deref()
            .map(validate_customer_id)
            .transpose()?;

        let outcome = self
            .aggregator
            .aggregate(request.carrier, &request.shipment_data, customer_id, use_mock)
            .await?;

        Ok(RateLookupResponse::quoted(
            outcome.quotes,
            outcome.cached,
            self.clock.now(),
        ))
    }

    /// Like [`Self::get_rates`] but folds errors into the failure form.
    pub async fn lookup_rates(&self, request: RateLookupRequest) -> RateLookupResponse {
        match self.get_rates(request).await {
            Ok(response) => response,
            Err(error) => RateLookupResponse::failed(&error, self.now()),
        }
    }

    pub async fn quote_history(
        &self,
        customer_id: &str,
        limit: Option<i64>,
    ) -> Result<QuoteHistoryResponse, CoreError> {
        let customer_id = validate_customer_id(customer_id)?;
        let limit = limit.map(HistoryLimit::new).transpose()?.unwrap_or_default();
        let data = self.aggregator.history(customer_id, limit).await?;

        Ok(QuoteHistoryResponse {
            success: true,
            customer_id: customer_id.to_owned(),
            count: data.len(),
            data,
            timestamp: self.clock.now(),
        })
    }

    pub async fn clear_expired_cache(&self) -> Result<PurgeReport, CoreError> {
        let removed = self.aggregator.purge_expired().await?;
        Ok(PurgeReport {
            success: true,
            removed,
            message: format!("removed {removed} expired quote(s)"),
            timestamp: self.clock.now(),
        })
    }

    pub async fn test_connections(&self) -> ConnectionReport {
        self.aggregator.test_connections().await
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "OK",
            service: SERVICE_NAME,
            mock_mode: self.use_mock,
            timestamp: self.clock.now(),
        }
    }
}

fn validate_customer_id(customer_id: &str) -> Result<&str, ValidationError> {
    let trimmed = customer_id.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyCustomerId);
    }
    Ok(trimmed)
}

fn build_adapters(config: &ShippingConfig, clock: &Arc<dyn Clock>) -> Vec<Arc<dyn CarrierAdapter>> {
    if config.use_mock {
        let generator = MockRateGenerator::new(Arc::clone(clock));
        return CarrierId::ALL
            .iter()
            .map(|carrier| {
                Arc::new(MockCarrierAdapter::new(*carrier, generator.clone()))
                    as Arc<dyn CarrierAdapter>
            })
            .collect();
    }

    vec![
        Arc::new(UpsAdapter::new(config.ups.clone()).with_timeout_ms(config.provider_timeout_ms)),
        Arc::new(
            FedexAdapter::new(config.fedex.clone()).with_timeout_ms(config.provider_timeout_ms),
        ),
    ]
}
