use std::future::Future;
use std::sync::Arc;

use time::Duration;
use tokio::sync::Mutex;

use crate::{CarrierError, Clock, UtcDateTime};

/// OAuth access token held by exactly one adapter instance.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderToken {
    access_token: String,
    expires_at: UtcDateTime,
}

impl std::fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl ProviderToken {
    pub fn new(access_token: impl Into<String>, expires_at: UtcDateTime) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Token issued at `issued_at` that lives for `lifetime`.
    pub fn expiring_in(
        access_token: impl Into<String>,
        issued_at: UtcDateTime,
        lifetime: Duration,
    ) -> Self {
        Self::new(access_token, issued_at.saturating_add(lifetime))
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub const fn expires_at(&self) -> UtcDateTime {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: UtcDateTime) -> bool {
        now < self.expires_at
    }
}

/// Cached-credential state machine: unauthenticated, authenticating, authenticated.
///
/// The lock is held across a refresh, so concurrent callers wait for the
/// in-flight token instead of requesting their own.
pub struct TokenCache {
    token: Mutex<Option<ProviderToken>>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            token: Mutex::new(None),
            clock,
        }
    }

    /// Returns the cached token, or runs `refresh` when none is valid.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<String, CarrierError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ProviderToken, CarrierError>>,
    {
        let mut slot = self.token.lock().await;
        let now = self.clock.now();
        if let Some(token) = slot.as_ref().filter(|token| token.is_valid_at(now)) {
            return Ok(token.access_token.clone());
        }

        *slot = None;
        let token = refresh().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    /// Forgets the token so the next call re-authenticates.
    pub async fn clear(&self) {
        *self.token.lock().await = None;
    }

    pub async fn current(&self) -> Option<ProviderToken> {
        self.token.lock().await.clone()
    }

    pub fn now(&self) -> UtcDateTime {
        self.clock.now()
    }
}
