//! Time source used for cache freshness, token expiry and delivery estimates.

use std::sync::Mutex;

use time::Duration;

use crate::UtcDateTime;

/// Provides the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> UtcDateTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UtcDateTime {
        UtcDateTime::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<UtcDateTime>,
}

impl FixedClock {
    pub fn new(now: UtcDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: UtcDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = now.saturating_add(by);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UtcDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
