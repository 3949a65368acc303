//! # Shiprate Warehouse
//!
//! DuckDB-backed persistence for cached carrier rate quotes.
//!
//! ## Overview
//!
//! Every quote returned by a carrier is stored as one row of the
//! `shipping_quotes` table, tagged with the cache key of the request that
//! produced it and an absolute expiry. The table serves two readers:
//!
//! - the rate cache, which looks up unexpired rows by cache key
//! - the quote history, which lists a customer's rows newest first
//!
//! ## Security
//!
//! Every caller-supplied value (cache keys, customer ids, addresses) is bound
//! as a query parameter. The only interpolated value is the numeric row limit.
//!
//! ```rust,no_run
//! use shiprate_warehouse::{QuoteWarehouse, WarehouseConfig};
//!
//! let warehouse = QuoteWarehouse::open(WarehouseConfig::default())?;
//! let history = warehouse.history_by_customer("cust'; DROP TABLE shipping_quotes; --", 10)?;
//! assert!(history.is_empty());
//! # Ok::<(), shiprate_warehouse::WarehouseError>(())
//! ```

pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use ::duckdb::{Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A record was rejected before reaching the database.
    #[error("record rejected: {0}")]
    Rejected(String),

    /// The shared connection was poisoned by a panicking writer.
    #[error("warehouse connection lock poisoned")]
    Poisoned,
}

/// Configuration for the quote warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for shiprate data.
    pub shiprate_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::for_home(resolve_shiprate_home())
    }
}

impl WarehouseConfig {
    /// Builds a configuration rooted at `shiprate_home`.
    pub fn for_home(shiprate_home: impl Into<PathBuf>) -> Self {
        let shiprate_home = shiprate_home.into();
        let db_path = shiprate_home.join("cache").join("quotes.duckdb");
        Self {
            shiprate_home,
            db_path,
        }
    }
}

/// Address columns flattened into a quote row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyColumns {
    pub name: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
}

/// A quote row ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuoteRecord {
    pub customer_id: Option<String>,
    /// Quote id as returned to callers, e.g. `ups_03`.
    pub quote_id: String,
    pub carrier: String,
    pub service_code: String,
    pub service_name: String,
    pub cost: f64,
    pub currency: String,
    pub transit_time: Option<String>,
    pub delivery_date: Option<String>,
    pub estimated_delivery: Option<String>,
    pub shipper: PartyColumns,
    pub recipient: PartyColumns,
    /// JSON array of the request packages.
    pub packages_json: String,
    /// Raw carrier payload the quote was parsed from, when one exists.
    pub raw_response: Option<String>,
}

/// A quote row as read back from the warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredQuoteRecord {
    pub id: i64,
    pub cache_key: String,
    #[serde(flatten)]
    pub record: NewQuoteRecord,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Quote persistence backed by a single `DuckDB` connection.
#[derive(Clone)]
pub struct QuoteWarehouse {
    db_path: Option<PathBuf>,
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for QuoteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteWarehouse")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl QuoteWarehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the database file named by `config`.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&config.db_path)?;
        Self::from_connection(connection, Some(config.db_path))
    }

    /// Open a throwaway in-memory warehouse.
    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(
        connection: Connection,
        db_path: Option<PathBuf>,
    ) -> Result<Self, WarehouseError> {
        migrations::apply_migrations(&connection)?;
        Ok(Self {
            db_path,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Path of the backing database file, `None` for in-memory warehouses.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Replaces every row stored under `cache_key` with `rows`.
    ///
    /// The delete and the inserts run in one transaction, so readers never
    /// observe a half-written key. Returns the number of inserted rows.
    pub fn replace_quotes(
        &self,
        cache_key: &str,
        rows: &[NewQuoteRecord],
        now_ms: i64,
        expires_at_ms: i64,
    ) -> Result<usize, WarehouseError> {
        if cache_key.trim().is_empty() {
            return Err(WarehouseError::Rejected(String::from(
                "cache key must not be empty",
            )));
        }
        if let Some(row) = rows.iter().find(|row| !row.cost.is_finite()) {
            return Err(WarehouseError::Rejected(format!(
                "non-finite cost for {} {}",
                row.carrier, row.service_code
            )));
        }

        let connection = self.lock()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            connection.execute(
                "DELETE FROM shipping_quotes WHERE cache_key = ?",
                [cache_key],
            )?;

            for row in rows {
                let params: [&dyn ToSql; 28] = [
                    &cache_key,
                    &row.customer_id,
                    &row.quote_id,
                    &row.carrier,
                    &row.service_code,
                    &row.service_name,
                    &row.cost,
                    &row.currency,
                    &row.transit_time,
                    &row.delivery_date,
                    &row.estimated_delivery,
                    &row.shipper.name,
                    &row.shipper.street,
                    &row.shipper.city,
                    &row.shipper.state,
                    &row.shipper.zip_code,
                    &row.shipper.country,
                    &row.recipient.name,
                    &row.recipient.street,
                    &row.recipient.city,
                    &row.recipient.state,
                    &row.recipient.zip_code,
                    &row.recipient.country,
                    &row.packages_json,
                    &row.raw_response,
                    &now_ms,
                    &now_ms,
                    &expires_at_ms,
                ];
                connection.execute(
                    "INSERT INTO shipping_quotes (\
                     cache_key, customer_id, quote_id, carrier, service_code, service_name, cost, currency, \
                     transit_time, delivery_date, estimated_delivery, \
                     shipper_name, shipper_street, shipper_city, shipper_state, shipper_zip_code, shipper_country, \
                     recipient_name, recipient_street, recipient_city, recipient_state, recipient_zip_code, recipient_country, \
                     packages, raw_api_response, created_at_ms, updated_at_ms, expires_at_ms) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params.as_slice(),
                )?;
            }

            Ok(rows.len())
        })();

        finalize_transaction(&connection, result)
    }

    /// Rows stored under `cache_key` whose expiry is strictly after `now_ms`.
    pub fn fresh_quotes(
        &self,
        cache_key: &str,
        now_ms: i64,
    ) -> Result<Vec<StoredQuoteRecord>, WarehouseError> {
        let connection = self.lock()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM shipping_quotes \
             WHERE cache_key = ? AND expires_at_ms > ? \
             ORDER BY id ASC"
        );
        let mut statement = connection.prepare(&sql)?;
        let params: [&dyn ToSql; 2] = [&cache_key, &now_ms];
        let rows = statement.query_map(params.as_slice(), read_stored_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Deletes every row whose expiry is strictly before `now_ms`.
    pub fn purge_expired(&self, now_ms: i64) -> Result<usize, WarehouseError> {
        let connection = self.lock()?;
        let removed = connection.execute(
            "DELETE FROM shipping_quotes WHERE expires_at_ms < ?",
            [now_ms],
        )?;
        Ok(removed)
    }

    /// A customer's stored quotes, newest first, at most `limit` rows.
    pub fn history_by_customer(
        &self,
        customer_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredQuoteRecord>, WarehouseError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let connection = self.lock()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM shipping_quotes \
             WHERE customer_id = ? \
             ORDER BY created_at_ms DESC, id DESC \
             LIMIT {limit}"
        );
        let mut statement = connection.prepare(&sql)?;
        let rows = statement.query_map([customer_id], read_stored_record)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Total number of stored rows, expired or not.
    pub fn count_quotes(&self) -> Result<usize, WarehouseError> {
        let connection = self.lock()?;
        let count: i64 =
            connection.query_row("SELECT COUNT(*) FROM shipping_quotes", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, WarehouseError> {
        self.connection.lock().map_err(|_| WarehouseError::Poisoned)
    }
}

const SELECT_COLUMNS: &str = "id, cache_key, customer_id, quote_id, carrier, service_code, service_name, cost, currency, \
     transit_time, delivery_date, estimated_delivery, \
     shipper_name, shipper_street, shipper_city, shipper_state, shipper_zip_code, shipper_country, \
     recipient_name, recipient_street, recipient_city, recipient_state, recipient_zip_code, recipient_country, \
     packages, raw_api_response, created_at_ms, updated_at_ms, expires_at_ms";

fn read_stored_record(row: &Row<'_>) -> Result<StoredQuoteRecord, ::duckdb::Error> {
    Ok(StoredQuoteRecord {
        id: row.get(0)?,
        cache_key: row.get(1)?,
        record: NewQuoteRecord {
            customer_id: row.get(2)?,
            quote_id: row.get(3)?,
            carrier: row.get(4)?,
            service_code: row.get(5)?,
            service_name: row.get(6)?,
            cost: row.get(7)?,
            currency: row.get(8)?,
            transit_time: row.get(9)?,
            delivery_date: row.get(10)?,
            estimated_delivery: row.get(11)?,
            shipper: PartyColumns {
                name: row.get(12)?,
                street: row.get(13)?,
                city: row.get(14)?,
                state: row.get(15)?,
                zip_code: row.get(16)?,
                country: row.get(17)?,
            },
            recipient: PartyColumns {
                name: row.get(18)?,
                street: row.get(19)?,
                city: row.get(20)?,
                state: row.get(21)?,
                zip_code: row.get(22)?,
                country: row.get(23)?,
            },
            packages_json: row.get(24)?,
            raw_response: row.get(25)?,
        },
        created_at_ms: row.get(26)?,
        updated_at_ms: row.get(27)?,
        expires_at_ms: row.get(28)?,
    })
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the shiprate home directory from environment or default.
pub fn resolve_shiprate_home() -> PathBuf {
    if let Some(path) = env::var_os("SHIPRATE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".shiprate");
    }

    PathBuf::from(".shiprate")
}
