use thiserror::Error;

/// Validation and contract errors exposed by `shiprate-core`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("state must be exactly 2 characters: '{value}'")]
    InvalidState { value: String },
    #[error("country must be exactly 2 characters: '{value}'")]
    InvalidCountry { value: String },
    #[error("zip code must be 5 digits or 5+4 digits: '{value}'")]
    InvalidZipCode { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("package weight {value} must be within (0, 150] lb")]
    WeightOutOfRange { value: f64 },
    #[error("package {field} {value} must be within (0, 108] in")]
    DimensionOutOfRange { field: &'static str, value: f64 },
    #[error("declared value {value} must be non-negative")]
    NegativeDeclaredValue { value: f64 },
    #[error("at least one package is required")]
    EmptyPackages,

    #[error("invalid carrier '{value}', expected one of ups, fedex, all")]
    InvalidCarrier { value: String },

    #[error("customer id cannot be empty")]
    EmptyCustomerId,
    #[error("history limit {value} must be within [1, 50]")]
    InvalidHistoryLimit { value: i64 },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("invalid configuration value for {key}: '{value}'")]
    InvalidConfig { key: &'static str, value: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Aggregation(#[from] crate::AggregationError),

    #[error("quote store error: {0}")]
    Store(#[from] crate::CacheError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
