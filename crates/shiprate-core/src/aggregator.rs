//! Fan-out over carrier adapters with a write-through quote cache.
//!
//! A live aggregation derives the cache key, serves fresh cached quotes when
//! present, and otherwise runs every selected adapter as its own task. The
//! call waits for every task to settle, merges the successes, sorts them by
//! cost (stable) and writes them back to the store. Only a run with zero
//! usable quotes is an error.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::Serialize;
use time::Duration;

use crate::carrier_adapter::{CarrierAdapter, CarrierError, RateBatch};
use crate::quote_store::{CacheError, HistoryLimit, QuoteHistoryEntry, QuoteStore, QuoteWrite};
use crate::{
    cache_key_for, CarrierId, CarrierSelector, Clock, MockRateGenerator, RateQuote,
    ShipmentRequest, DEFAULT_CACHE_TTL_SECS,
};

/// One carrier's reason for contributing no quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterFailure {
    pub carrier: CarrierId,
    pub code: &'static str,
    pub message: String,
}

impl AdapterFailure {
    fn from_carrier_error(error: &CarrierError) -> Self {
        Self {
            carrier: error.carrier(),
            code: error.code(),
            message: error.message().to_owned(),
        }
    }

    fn new(carrier: CarrierId, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            carrier,
            code,
            message: message.into(),
        }
    }
}

/// Every selected carrier failed or returned nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationError {
    failures: Vec<AdapterFailure>,
}

impl AggregationError {
    pub fn failures(&self) -> &[AdapterFailure] {
        &self.failures
    }
}

impl Display for AggregationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.failures.is_empty() {
            return f.write_str("no carrier produced rates");
        }
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", failure.carrier, failure.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregationError {}

/// Result of one aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOutcome {
    /// Cost-ascending quotes.
    pub quotes: Vec<RateQuote>,
    /// `true` when served from the quote store without calling any adapter.
    pub cached: bool,
    /// Carriers that failed while others succeeded.
    pub partial_failures: Vec<AdapterFailure>,
}

/// Result of probing every carrier's authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub ups: bool,
    pub fedex: bool,
}

/// Adapter registry, quote store and mock generator behind one entry point.
pub struct RateAggregator {
    adapters: HashMap<CarrierId, Arc<dyn CarrierAdapter>>,
    store: Arc<dyn QuoteStore>,
    mock: MockRateGenerator,
    clock: Arc<dyn Clock>,
    cache_ttl: Duration,
}

impl RateAggregator {
    pub fn new(
        adapters: Vec<Arc<dyn CarrierAdapter>>,
        store: Arc<dyn QuoteStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.carrier(), adapter))
            .collect();
        Self {
            adapters,
            store,
            mock: MockRateGenerator::new(Arc::clone(&clock)),
            clock,
            cache_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
        }
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn adapter(&self, carrier: CarrierId) -> Option<&Arc<dyn CarrierAdapter>> {
        self.adapters.get(&carrier)
    }

    /// Aggregates quotes for `selector`. With `use_mock` the synthetic
    /// generator answers directly and the cache is neither read nor written.
    pub async fn aggregate(
        &self,
        selector: CarrierSelector,
        shipment: &ShipmentRequest,
        customer_id: Option<&str>,
        use_mock: bool,
    ) -> Result<AggregateOutcome, AggregationError> {
        if use_mock {
            return Ok(AggregateOutcome {
                quotes: self.mock.generate(selector, shipment),
                cached: false,
                partial_failures: Vec::new(),
            });
        }

        let key = cache_key_for(selector, shipment);
        match self.store.lookup_fresh(&key, self.clock.now()).await {
            Ok(quotes) if !quotes.is_empty() => {
                tracing::info!(cache_key = %key, quotes = quotes.len(), "serving rates from cache");
                return Ok(AggregateOutcome {
                    quotes,
                    cached: true,
                    partial_failures: Vec::new(),
                });
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(cache_key = %key, error = %error, "cache lookup failed; treating as miss");
            }
        }

        let (batches, mut failures) = self.fan_out(selector, shipment).await;

        let mut quotes: Vec<RateQuote> = Vec::new();
        let mut raw_responses = BTreeMap::new();
        for batch in &batches {
            quotes.extend(batch.quotes.iter().cloned());
            if let Some(raw) = &batch.raw_response {
                raw_responses.insert(batch.carrier.display_name().to_owned(), raw.clone());
            }
        }

        if quotes.is_empty() {
            for batch in &batches {
                failures.push(AdapterFailure::new(
                    batch.carrier,
                    "carrier.no_rates",
                    "no rates returned",
                ));
            }
            failures.sort_by_key(|failure| failure.carrier);
            return Err(AggregationError { failures });
        }

        RateQuote::sort_by_cost(&mut quotes);

        let created_at = self.clock.now();
        let write = QuoteWrite {
            cache_key: key.clone(),
            customer_id: customer_id.map(str::to_owned),
            shipment: shipment.clone(),
            quotes: quotes.clone(),
            raw_responses,
            created_at,
            expires_at: created_at.saturating_add(self.cache_ttl),
        };
        if let Err(error) = self.store.replace(write).await {
            tracing::warn!(cache_key = %key, error = %error, "failed to cache rates");
        }

        Ok(AggregateOutcome {
            quotes,
            cached: false,
            partial_failures: failures,
        })
    }

    /// Runs each selected adapter on its own task and waits for all of them.
    /// Results come back in selector order regardless of completion order.
    async fn fan_out(
        &self,
        selector: CarrierSelector,
        shipment: &ShipmentRequest,
    ) -> (Vec<RateBatch>, Vec<AdapterFailure>) {
        let shipment = Arc::new(shipment.clone());
        let mut handles = Vec::with_capacity(selector.carriers().len());
        let mut failures = Vec::new();

        for carrier in selector.carriers() {
            let Some(adapter) = self.adapters.get(carrier) else {
                failures.push(AdapterFailure::new(
                    *carrier,
                    "carrier.internal",
                    "carrier adapter not configured",
                ));
                continue;
            };
            let adapter = Arc::clone(adapter);
            let shipment = Arc::clone(&shipment);
            handles.push((
                *carrier,
                tokio::spawn(async move { adapter.rates(&shipment).await }),
            ));
        }

        let mut batches = Vec::with_capacity(handles.len());
        for (carrier, handle) in handles {
            match handle.await {
                Ok(Ok(batch)) => batches.push(batch),
                Ok(Err(error)) => {
                    tracing::warn!(
                        carrier = %carrier,
                        code = error.code(),
                        error = %error.message(),
                        "carrier rate lookup failed"
                    );
                    failures.push(AdapterFailure::from_carrier_error(&error));
                }
                Err(join_error) => {
                    tracing::error!(carrier = %carrier, error = %join_error, "carrier task aborted");
                    failures.push(AdapterFailure::new(
                        carrier,
                        "carrier.internal",
                        format!("rate task failed: {join_error}"),
                    ));
                }
            }
        }

        (batches, failures)
    }

    /// Probes every registered adapter concurrently; unregistered carriers report `false`.
    pub async fn test_connections(&self) -> ConnectionReport {
        let probe = |carrier: CarrierId| {
            let adapter = self.adapters.get(&carrier).cloned();
            async move {
                match adapter {
                    Some(adapter) => adapter.test_connection().await,
                    None => false,
                }
            }
        };
        let (ups, fedex) = tokio::join!(probe(CarrierId::Ups), probe(CarrierId::Fedex));
        ConnectionReport { ups, fedex }
    }

    pub async fn history(
        &self,
        customer_id: &str,
        limit: HistoryLimit,
    ) -> Result<Vec<QuoteHistoryEntry>, CacheError> {
        self.store.history_by_customer(customer_id, limit).await
    }

    /// Removes expired quotes and returns how many were deleted.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let removed = self.store.purge_expired(self.clock.now()).await?;
        tracing::info!(removed, "purged expired quotes");
        Ok(removed)
    }
}
