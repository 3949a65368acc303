//! Core contracts for shiprate.
//!
//! This crate contains:
//! - Validated shipment and quote models
//! - Carrier identifiers, adapters and the HTTP transport seam
//! - Deterministic cache keys and the quote store port
//! - The rate aggregator and the request/response service facade

pub mod adapters;
pub mod aggregator;
pub mod cache_key;
pub mod carrier;
pub mod carrier_adapter;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod mock;
pub mod quote_store;
pub mod service;
pub mod token;

pub use adapters::{FedexAdapter, MockCarrierAdapter, UpsAdapter};
pub use aggregator::{
    AdapterFailure, AggregateOutcome, AggregationError, ConnectionReport, RateAggregator,
};
pub use cache_key::{cache_key_for, CacheKey};
pub use carrier::{CarrierId, CarrierSelector};
pub use carrier_adapter::{CarrierAdapter, CarrierError, CarrierErrorKind, RateBatch};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    CarrierSettings, ShippingConfig, DEFAULT_CACHE_TTL_SECS, DEFAULT_FEDEX_BASE_URL,
    DEFAULT_PROVIDER_TIMEOUT_MS, DEFAULT_UPS_BASE_URL,
};
pub use domain::{
    add_business_days, format_date, round_cents, Address, Dimensions, Package, Party, RateQuote,
    ShipmentRequest, UtcDateTime, DEFAULT_COUNTRY, DEFAULT_PACKAGING_TYPE,
    MAX_PACKAGE_DIMENSION_IN, MAX_PACKAGE_WEIGHT_LB, UNAVAILABLE,
};
pub use error::{CoreError, ValidationError};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use mock::MockRateGenerator;
pub use quote_store::{
    CacheError, HistoryLimit, InMemoryQuoteStore, QuoteHistoryEntry, QuoteStore, QuoteWrite,
    WarehouseQuoteStore,
};
pub use service::{
    HealthReport, PurgeReport, QuoteHistoryResponse, RateLookupRequest, RateLookupResponse,
    ShippingService,
};
pub use shiprate_warehouse::{QuoteWarehouse, WarehouseConfig, WarehouseError};
pub use token::{ProviderToken, TokenCache};
