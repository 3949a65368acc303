//! Persisted quote cache: freshness lookup, replace-by-key, expiry purge and
//! customer history.
//!
//! [`QuoteStore`] is the seam between the aggregator and storage. The
//! production implementation wraps the `DuckDB` warehouse; the in-memory one
//! backs tests and ephemeral runs. Both share the row mapping below, so a
//! quote reads back identically from either.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;
use shiprate_warehouse::{
    NewQuoteRecord, PartyColumns, QuoteWarehouse, StoredQuoteRecord, WarehouseError,
};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::{
    CacheKey, Party, RateQuote, ShipmentRequest, UtcDateTime, ValidationError, UNAVAILABLE,
};

/// Store failure. Logged by callers on the rate path, never surfaced there.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("quote store task failed: {0}")]
    Task(String),

    #[error("quote store rejected the request: {0}")]
    Rejected(String),
}

/// Maximum number of history rows returned, within `[1, 50]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimit(usize);

impl HistoryLimit {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 50;
    pub const DEFAULT: Self = Self(10);

    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(ValidationError::InvalidHistoryLimit { value });
        }
        usize::try_from(value)
            .map(Self)
            .map_err(|_| ValidationError::InvalidHistoryLimit { value })
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl Default for HistoryLimit {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Everything written for one cache key in one aggregation.
#[derive(Debug, Clone)]
pub struct QuoteWrite {
    pub cache_key: CacheKey,
    pub customer_id: Option<String>,
    pub shipment: ShipmentRequest,
    pub quotes: Vec<RateQuote>,
    /// Raw provider payloads keyed by carrier brand name.
    pub raw_responses: BTreeMap<String, serde_json::Value>,
    pub created_at: UtcDateTime,
    pub expires_at: UtcDateTime,
}

/// One stored quote as returned by the history query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteHistoryEntry {
    pub record_id: i64,
    pub cache_key: String,
    pub customer_id: Option<String>,
    #[serde(flatten)]
    pub quote: RateQuote,
    pub shipper: PartyColumns,
    pub recipient: PartyColumns,
    pub packages: serde_json::Value,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
    pub expires_at: UtcDateTime,
}

/// Storage port used by the aggregator and the service facade.
pub trait QuoteStore: Send + Sync {
    /// Quotes stored under `key` with `expires_at > now`.
    fn lookup_fresh<'a>(
        &'a self,
        key: &'a CacheKey,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RateQuote>, CacheError>> + Send + 'a>>;

    /// Deletes every row of `write.cache_key` and inserts the new quotes.
    fn replace<'a>(
        &'a self,
        write: QuoteWrite,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>>;

    /// Deletes rows with `expires_at < now` and returns how many went away.
    fn purge_expired<'a>(
        &'a self,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>>;

    fn history_by_customer<'a>(
        &'a self,
        customer_id: &'a str,
        limit: HistoryLimit,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QuoteHistoryEntry>, CacheError>> + Send + 'a>>;
}

/// [`QuoteStore`] over the `DuckDB` warehouse; each call runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct WarehouseQuoteStore {
    warehouse: QuoteWarehouse,
}

impl WarehouseQuoteStore {
    pub fn new(warehouse: QuoteWarehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &QuoteWarehouse {
        &self.warehouse
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, CacheError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WarehouseError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| CacheError::Task(error.to_string()))?
        .map_err(CacheError::from)
}

impl QuoteStore for WarehouseQuoteStore {
    fn lookup_fresh<'a>(
        &'a self,
        key: &'a CacheKey,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RateQuote>, CacheError>> + Send + 'a>> {
        let warehouse = self.warehouse.clone();
        let key = key.as_str().to_owned();
        Box::pin(async move {
            let rows =
                run_blocking(move || warehouse.fresh_quotes(&key, now.unix_millis())).await?;
            Ok(rows.iter().map(quote_from_record).collect())
        })
    }

    fn replace<'a>(
        &'a self,
        write: QuoteWrite,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        let warehouse = self.warehouse.clone();
        Box::pin(async move {
            let records = records_for(&write)?;
            let key = write.cache_key.as_str().to_owned();
            let created_at = write.created_at.unix_millis();
            let expires_at = write.expires_at.unix_millis();
            run_blocking(move || warehouse.replace_quotes(&key, &records, created_at, expires_at))
                .await
        })
    }

    fn purge_expired<'a>(
        &'a self,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        let warehouse = self.warehouse.clone();
        Box::pin(async move {
            run_blocking(move || warehouse.purge_expired(now.unix_millis())).await
        })
    }

    fn history_by_customer<'a>(
        &'a self,
        customer_id: &'a str,
        limit: HistoryLimit,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QuoteHistoryEntry>, CacheError>> + Send + 'a>>
    {
        let warehouse = self.warehouse.clone();
        let customer_id = customer_id.to_owned();
        Box::pin(async move {
            let rows = run_blocking(move || {
                warehouse.history_by_customer(&customer_id, limit.get())
            })
            .await?;
            Ok(rows.iter().map(history_entry_from_record).collect())
        })
    }
}

/// Process-local [`QuoteStore`] with the same semantics as the warehouse.
#[derive(Debug, Default)]
pub struct InMemoryQuoteStore {
    rows: RwLock<Vec<StoredQuoteRecord>>,
    next_id: AtomicI64,
}

impl InMemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

impl QuoteStore for InMemoryQuoteStore {
    fn lookup_fresh<'a>(
        &'a self,
        key: &'a CacheKey,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RateQuote>, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let now_ms = now.unix_millis();
            let rows = self.rows.read().await;
            Ok(rows
                .iter()
                .filter(|row| row.cache_key == key.as_str() && row.expires_at_ms > now_ms)
                .map(quote_from_record)
                .collect())
        })
    }

    fn replace<'a>(
        &'a self,
        write: QuoteWrite,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let records = records_for(&write)?;
            let created_at_ms = write.created_at.unix_millis();
            let expires_at_ms = write.expires_at.unix_millis();
            let key = write.cache_key.as_str();

            let mut rows = self.rows.write().await;
            rows.retain(|row| row.cache_key != key);
            let inserted = records.len();
            for record in records {
                rows.push(StoredQuoteRecord {
                    id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
                    cache_key: key.to_owned(),
                    record,
                    created_at_ms,
                    updated_at_ms: created_at_ms,
                    expires_at_ms,
                });
            }
            Ok(inserted)
        })
    }

    fn purge_expired<'a>(
        &'a self,
        now: UtcDateTime,
    ) -> Pin<Box<dyn Future<Output = Result<usize, CacheError>> + Send + 'a>> {
        Box::pin(async move {
            let now_ms = now.unix_millis();
            let mut rows = self.rows.write().await;
            let before = rows.len();
            rows.retain(|row| row.expires_at_ms >= now_ms);
            Ok(before - rows.len())
        })
    }

    fn history_by_customer<'a>(
        &'a self,
        customer_id: &'a str,
        limit: HistoryLimit,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<QuoteHistoryEntry>, CacheError>> + Send + 'a>>
    {
        Box::pin(async move {
            let rows = self.rows.read().await;
            let mut matching: Vec<&StoredQuoteRecord> = rows
                .iter()
                .filter(|row| row.record.customer_id.as_deref() == Some(customer_id))
                .collect();
            matching.sort_by(|left, right| {
                right
                    .created_at_ms
                    .cmp(&left.created_at_ms)
                    .then(right.id.cmp(&left.id))
            });
            Ok(matching
                .into_iter()
                .take(limit.get())
                .map(history_entry_from_record)
                .collect())
        })
    }
}

fn party_columns(party: &Party) -> PartyColumns {
    let address = party.address();
    PartyColumns {
        name: party.name().to_owned(),
        street: address.street().to_owned(),
        city: address.city().to_owned(),
        state: address.state().to_owned(),
        zip_code: address.zip_code().to_owned(),
        country: address.country().to_owned(),
    }
}

fn records_for(write: &QuoteWrite) -> Result<Vec<NewQuoteRecord>, CacheError> {
    let packages_json = serde_json::to_string(write.shipment.packages())
        .map_err(|error| CacheError::Rejected(format!("packages: {error}")))?;
    let shipper = party_columns(write.shipment.shipper());
    let recipient = party_columns(write.shipment.recipient());

    Ok(write
        .quotes
        .iter()
        .map(|quote| NewQuoteRecord {
            customer_id: write.customer_id.clone(),
            quote_id: quote.id.clone(),
            carrier: quote.carrier.clone(),
            service_code: quote.service_code.clone(),
            service_name: quote.service_name.clone(),
            cost: quote.cost,
            currency: quote.currency.clone(),
            transit_time: Some(quote.transit_time.clone()),
            delivery_date: quote.delivery_date.clone(),
            estimated_delivery: quote.estimated_delivery.clone(),
            shipper: shipper.clone(),
            recipient: recipient.clone(),
            packages_json: packages_json.clone(),
            raw_response: write
                .raw_responses
                .get(&quote.carrier)
                .map(|raw| raw.to_string()),
        })
        .collect())
}

fn quote_from_record(row: &StoredQuoteRecord) -> RateQuote {
    let record = &row.record;
    RateQuote {
        id: record.quote_id.clone(),
        carrier: record.carrier.clone(),
        service_code: record.service_code.clone(),
        service_name: record.service_name.clone(),
        cost: record.cost,
        currency: record.currency.clone(),
        transit_time: record
            .transit_time
            .clone()
            .unwrap_or_else(|| UNAVAILABLE.to_owned()),
        delivery_date: record.delivery_date.clone(),
        estimated_delivery: record.estimated_delivery.clone(),
    }
}

fn timestamp_from_millis(millis: i64) -> UtcDateTime {
    UtcDateTime::from_unix_millis(millis).unwrap_or_else(|_| UtcDateTime::now())
}

fn history_entry_from_record(row: &StoredQuoteRecord) -> QuoteHistoryEntry {
    let packages = serde_json::from_str(&row.record.packages_json)
        .unwrap_or_else(|_| serde_json::Value::String(row.record.packages_json.clone()));

    QuoteHistoryEntry {
        record_id: row.id,
        cache_key: row.cache_key.clone(),
        customer_id: row.record.customer_id.clone(),
        quote: quote_from_record(row),
        shipper: row.record.shipper.clone(),
        recipient: row.record.recipient.clone(),
        packages,
        created_at: timestamp_from_millis(row.created_at_ms),
        updated_at: timestamp_from_millis(row.updated_at_ms),
        expires_at: timestamp_from_millis(row.expires_at_ms),
    }
}
