//! Runtime configuration resolved from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `SHIPPING_USE_MOCK` | `true` |
//! | `UPS_BASE_URL` | `https://wwwcie.ups.com/api` |
//! | `UPS_CLIENT_ID`, `UPS_CLIENT_SECRET`, `UPS_ACCOUNT_NUMBER` | empty |
//! | `FEDEX_BASE_URL` | `https://apis-sandbox.fedex.com` |
//! | `FEDEX_API_KEY`, `FEDEX_SECRET_KEY`, `FEDEX_ACCOUNT_NUMBER` | empty |
//! | `SHIPRATE_CACHE_TTL_SECS` | `300` |
//! | `SHIPRATE_PROVIDER_TIMEOUT_MS` | `30000` |
//! | `SHIPRATE_HOME` | `$HOME/.shiprate` |

use std::path::PathBuf;

use time::Duration;

use crate::ValidationError;

pub const DEFAULT_UPS_BASE_URL: &str = "https://wwwcie.ups.com/api";
pub const DEFAULT_FEDEX_BASE_URL: &str = "https://apis-sandbox.fedex.com";
pub const DEFAULT_CACHE_TTL_SECS: i64 = 300;
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 30_000;

/// Endpoint and client credentials of one carrier API.
#[derive(Clone, PartialEq, Eq)]
pub struct CarrierSettings {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub account_number: Option<String>,
}

impl std::fmt::Debug for CarrierSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierSettings")
            .field("base_url", &self.base_url)
            .field("has_client_id", &!self.client_id.is_empty())
            .field("has_client_secret", &!self.client_secret.is_empty())
            .field("account_number", &self.account_number)
            .finish()
    }
}

impl CarrierSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client_id: String::new(),
            client_secret: String::new(),
            account_number: None,
        }
    }

    pub fn with_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_account_number(mut self, account_number: impl Into<String>) -> Self {
        let account_number = account_number.into();
        self.account_number = (!account_number.trim().is_empty()).then_some(account_number);
        self
    }

    pub fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// Everything the service needs to build its adapters and quote store.
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    pub use_mock: bool,
    pub ups: CarrierSettings,
    pub fedex: CarrierSettings,
    pub cache_ttl: Duration,
    pub provider_timeout_ms: u64,
    pub shiprate_home: PathBuf,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            use_mock: true,
            ups: CarrierSettings::new(DEFAULT_UPS_BASE_URL),
            fedex: CarrierSettings::new(DEFAULT_FEDEX_BASE_URL),
            cache_ttl: Duration::seconds(DEFAULT_CACHE_TTL_SECS),
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            shiprate_home: shiprate_warehouse::resolve_shiprate_home(),
        }
    }
}

impl ShippingConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get("SHIPPING_USE_MOCK") {
            config.use_mock = parse_flag("SHIPPING_USE_MOCK", &value)?;
        }

        config.ups = CarrierSettings::new(
            get("UPS_BASE_URL").unwrap_or_else(|| DEFAULT_UPS_BASE_URL.to_owned()),
        )
        .with_credentials(
            get("UPS_CLIENT_ID").unwrap_or_default(),
            get("UPS_CLIENT_SECRET").unwrap_or_default(),
        )
        .with_account_number(get("UPS_ACCOUNT_NUMBER").unwrap_or_default());

        config.fedex = CarrierSettings::new(
            get("FEDEX_BASE_URL").unwrap_or_else(|| DEFAULT_FEDEX_BASE_URL.to_owned()),
        )
        .with_credentials(
            get("FEDEX_API_KEY").unwrap_or_default(),
            get("FEDEX_SECRET_KEY").unwrap_or_default(),
        )
        .with_account_number(get("FEDEX_ACCOUNT_NUMBER").unwrap_or_default());

        if let Some(value) = get("SHIPRATE_CACHE_TTL_SECS") {
            let secs: i64 = parse_positive("SHIPRATE_CACHE_TTL_SECS", &value)?;
            config.cache_ttl = Duration::seconds(secs);
        }

        if let Some(value) = get("SHIPRATE_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout_ms = parse_positive("SHIPRATE_PROVIDER_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = get("SHIPRATE_HOME") {
            config.shiprate_home = PathBuf::from(value);
        }

        Ok(config)
    }

    pub fn with_mock_mode(mut self, use_mock: bool) -> Self {
        self.use_mock = use_mock;
        self
    }

    pub fn with_ups_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.ups = self.ups.with_credentials(client_id, client_secret);
        self
    }

    pub fn with_fedex_credentials(
        mut self,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.fedex = self.fedex.with_credentials(api_key, secret_key);
        self
    }

    pub fn with_cache_ttl(mut self, cache_ttl: Duration) -> Self {
        self.cache_ttl = cache_ttl;
        self
    }

    pub fn with_provider_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.provider_timeout_ms = timeout_ms;
        self
    }

    pub fn with_home(mut self, shiprate_home: impl Into<PathBuf>) -> Self {
        self.shiprate_home = shiprate_home.into();
        self
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::InvalidConfig {
            key,
            value: value.to_owned(),
        }),
    }
}

fn parse_positive<T>(key: &'static str, value: &str) -> Result<T, ValidationError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed > T::default() => Ok(parsed),
        _ => Err(ValidationError::InvalidConfig {
            key,
            value: value.to_owned(),
        }),
    }
}
