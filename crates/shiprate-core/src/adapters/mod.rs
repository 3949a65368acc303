//! Carrier adapter implementations.

pub mod fedex;
pub mod mock;
pub mod ups;

pub use fedex::FedexAdapter;
pub use mock::MockCarrierAdapter;
pub use ups::UpsAdapter;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::{CarrierError, CarrierId, HttpResponse};

/// OAuth client-credentials reply shared by both carriers.
#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(deserialize_with = "u64_from_string_or_number")]
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    errors: Vec<ProviderErrorEntry>,
    #[serde(default)]
    response: Option<Box<ProviderErrorBody>>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEntry {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Parses a reply body into its schema, keeping the raw JSON alongside.
fn parse_body<T: DeserializeOwned>(
    carrier: CarrierId,
    body: &str,
    what: &str,
) -> Result<(T, serde_json::Value), CarrierError> {
    let raw: serde_json::Value = serde_json::from_str(body).map_err(|error| {
        CarrierError::invalid_response(carrier, format!("{what} is not valid JSON: {error}"))
    })?;
    let parsed = serde_json::from_value(raw.clone()).map_err(|error| {
        CarrierError::invalid_response(carrier, format!("unexpected {what} shape: {error}"))
    })?;
    Ok((parsed, raw))
}

/// Folds `errors[]{code,message}` (top level or under `response`) into one line.
fn provider_error_summary(body: &str) -> Option<String> {
    let parsed: ProviderErrorBody = serde_json::from_str(body).ok()?;
    let entries = if parsed.errors.is_empty() {
        parsed.response.map(|inner| inner.errors).unwrap_or_default()
    } else {
        parsed.errors
    };

    let parts: Vec<String> = entries
        .into_iter()
        .filter_map(|entry| match (entry.code, entry.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn status_error(carrier: CarrierId, context: &str, response: &HttpResponse) -> CarrierError {
    let message = match provider_error_summary(&response.body) {
        Some(summary) => format!("{context} returned status {}: {summary}", response.status),
        None => format!("{context} returned status {}", response.status),
    };
    CarrierError::provider_request(carrier, message)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Text(String),
    Unsigned(u64),
    Float(f64),
}

fn u64_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Unsigned(value) => Ok(value),
        StringOrNumber::Float(value) if value.is_finite() && value >= 0.0 => Ok(value as u64),
        StringOrNumber::Float(value) => Err(serde::de::Error::custom(format!(
            "expected a non-negative number, got {value}"
        ))),
    }
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<StringOrNumber>::deserialize(deserializer)? {
        Some(StringOrNumber::Text(text)) => Some(text),
        Some(StringOrNumber::Unsigned(value)) => Some(value.to_string()),
        Some(StringOrNumber::Float(value)) => Some(value.to_string()),
        None => None,
    })
}
