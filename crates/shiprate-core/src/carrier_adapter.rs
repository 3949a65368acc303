//! Carrier adapter contract and the adapter-level error type.
//!
//! Every carrier brand (UPS, FedEx and the offline mock) implements
//! [`CarrierAdapter`]. The aggregator only ever talks to this trait, so the
//! per-carrier wire schemas stay private to their adapter module.
//!
//! | Operation | Result | Notes |
//! |-----------|--------|-------|
//! | `authenticate` | access token | cached until expiry |
//! | `rates` | [`RateBatch`] | one quote per service option |
//! | `test_connection` | `bool` | any failure reduces to `false` |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use crate::{CarrierId, HttpError, RateQuote, ShipmentRequest};

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierErrorKind {
    Authentication,
    ProviderRequest,
    Timeout,
    InvalidResponse,
    InvalidRequest,
    Internal,
}

/// Structured carrier error collected by the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierError {
    carrier: CarrierId,
    kind: CarrierErrorKind,
    message: String,
}

impl CarrierError {
    pub fn new(carrier: CarrierId, kind: CarrierErrorKind, message: impl Into<String>) -> Self {
        Self {
            carrier,
            kind,
            message: message.into(),
        }
    }

    pub fn authentication(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::Authentication, message)
    }

    pub fn provider_request(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::ProviderRequest, message)
    }

    pub fn timeout(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::Timeout, message)
    }

    pub fn invalid_response(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::InvalidResponse, message)
    }

    pub fn invalid_request(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::InvalidRequest, message)
    }

    pub fn internal(carrier: CarrierId, message: impl Into<String>) -> Self {
        Self::new(carrier, CarrierErrorKind::Internal, message)
    }

    /// Maps a transport failure, keeping timeouts distinguishable.
    pub fn from_transport(carrier: CarrierId, context: &str, error: &HttpError) -> Self {
        let message = format!("{context}: {}", error.message());
        if error.timed_out() {
            Self::timeout(carrier, message)
        } else {
            Self::provider_request(carrier, message)
        }
    }

    pub const fn carrier(&self) -> CarrierId {
        self.carrier
    }

    pub const fn kind(&self) -> CarrierErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            CarrierErrorKind::Authentication => "carrier.authentication",
            CarrierErrorKind::ProviderRequest => "carrier.provider_request",
            CarrierErrorKind::Timeout => "carrier.timeout",
            CarrierErrorKind::InvalidResponse => "carrier.invalid_response",
            CarrierErrorKind::InvalidRequest => "carrier.invalid_request",
            CarrierErrorKind::Internal => "carrier.internal",
        }
    }
}

impl Display for CarrierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.carrier, self.message, self.code())
    }
}

impl std::error::Error for CarrierError {}

/// Quotes returned by one carrier for one shipment.
#[derive(Debug, Clone, PartialEq)]
pub struct RateBatch {
    pub carrier: CarrierId,
    pub quotes: Vec<RateQuote>,
    /// Provider payload the quotes were parsed from; `None` for synthetic quotes.
    pub raw_response: Option<serde_json::Value>,
}

impl RateBatch {
    pub fn new(carrier: CarrierId, quotes: Vec<RateQuote>) -> Self {
        Self {
            carrier,
            quotes,
            raw_response: None,
        }
    }

    pub fn with_raw_response(mut self, raw: serde_json::Value) -> Self {
        self.raw_response = Some(raw);
        self
    }
}

/// Shared capability of every carrier brand.
pub trait CarrierAdapter: Send + Sync {
    fn carrier(&self) -> CarrierId;

    /// Returns a usable access token, refreshing it only when absent or expired.
    fn authenticate<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<String, CarrierError>> + Send + 'a>>;

    /// Maps `shipment` to the carrier's wire format and normalizes the reply.
    fn rates<'a>(
        &'a self,
        shipment: &'a ShipmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<RateBatch, CarrierError>> + Send + 'a>>;

    fn test_connection<'a>(&'a self) -> Pin<Box<dyn Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
            match self.authenticate().await {
                Ok(_) => true,
                Err(error) => {
                    tracing::warn!(
                        carrier = %self.carrier(),
                        code = error.code(),
                        error = %error.message(),
                        "carrier connection test failed"
                    );
                    false
                }
            }
        })
    }
}
