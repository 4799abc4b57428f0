//! # Staleness Policy
//!
//! Bounds network use while keeping long-idle devices reasonably current.
//!
//! ```text
//! saved at T                    T+30min
//!    │◄──────── fresh ─────────►│◄──────── stale ────────►
//!    │                          │
//!    │  offline: no refresh     │  offline: refresh on next access
//!    │  online:  no refresh     │  online:  no passive refresh
//!                                           (operator/app-start sync only)
//! ```

use chrono::{DateTime, Duration, Utc};

use crate::CATALOG_STALENESS_MINUTES;

/// Passive refresh policy for cached data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
    window: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        StalenessPolicy::new(Duration::minutes(CATALOG_STALENESS_MINUTES))
    }
}

impl StalenessPolicy {
    pub fn new(window: Duration) -> Self {
        StalenessPolicy { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when a value saved at `saved_at` is older than the window.
    /// A value never saved is stale.
    pub fn is_stale(&self, saved_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match saved_at {
            Some(saved_at) => now - saved_at > self.window,
            None => true,
        }
    }

    /// True when a passive refresh should be attempted: only while offline
    /// and only once the cached value is stale.
    pub fn should_refresh(
        &self,
        operating_offline: bool,
        saved_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        operating_offline && self.is_stale(saved_at, now)
    }
}
