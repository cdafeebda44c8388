//! Fixed-window request counting.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Window length and ceiling for the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Window duration in milliseconds.
    #[serde(alias = "interval_ms")]
    pub interval_ms: u64,
    /// Requests admitted per window.
    #[serde(alias = "max_requests")]
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval_ms: 60_000,
            max_requests: 10,
        }
    }
}

impl RateLimitConfig {
    /// Window duration.
    #[must_use]
    pub fn interval(&self) -> TimeDelta {
        TimeDelta::milliseconds(i64::try_from(self.interval_ms).unwrap_or(i64::MAX))
    }

    /// End of a window starting at `now`.
    #[must_use]
    pub fn reset_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.interval())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Counter state for one caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests seen in the current window.
    pub count: u32,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

impl RateWindow {
    /// An empty window starting at `now`.
    #[must_use]
    pub fn start(now: DateTime<Utc>, config: &RateLimitConfig) -> Self {
        Self {
            count: 0,
            reset_at: config.reset_from(now),
        }
    }

    /// Whether the window has ended as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.reset_at < now
    }

    /// Counts one request, restarting the window first if it has ended.
    pub fn register(&mut self, now: DateTime<Utc>, config: &RateLimitConfig) -> RateDecision {
        if self.is_expired(now) {
            *self = Self::start(now, config);
        }
        self.count = self.count.saturating_add(1);

        RateDecision {
            admitted: self.count <= config.max_requests,
            remaining: config.max_requests.saturating_sub(self.count),
            reset_at: self.reset_at,
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    /// Whether the request is within the ceiling.
    pub admitted: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window ends.
    pub reset_at: DateTime<Utc>,
}

impl RateDecision {
    /// Admits with a full allowance; used when the window store fails.
    #[must_use]
    pub fn fail_open(now: DateTime<Utc>, config: &RateLimitConfig) -> Self {
        Self {
            admitted: true,
            remaining: config.max_requests,
            reset_at: config.reset_from(now),
        }
    }
}
