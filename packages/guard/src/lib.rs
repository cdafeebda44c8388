#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Request admission for the lookup API.
//!
//! A [`Guard`] applies a fixed-window rate limit per caller identity and
//! then inspects the caller's recent query history for scraping patterns.
//! Both stores sit behind traits so they can live outside the process;
//! failures in either one admit the request rather than lock callers out.

pub mod abuse;
pub mod rate;
pub mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use abuse::{AbuseConfig, AbuseFinding, AbuseReason, QueryHistoryEntry};
pub use rate::{RateDecision, RateLimitConfig, RateWindow};
pub use store::{MemoryQueryHistory, MemoryRateWindows, QueryHistoryStore, RateWindowStore};

/// Errors from the guard's stores.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Guard store error: {message}")]
    Backend { message: String },

    #[error("Guard store lock poisoned")]
    Poisoned,
}

/// Guard settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GuardConfig {
    #[serde(alias = "rate_limit")]
    pub rate_limit: RateLimitConfig,
    pub abuse: AbuseConfig,
    /// Stale state is swept once every this many checks. Zero disables it.
    #[serde(alias = "cleanup_every")]
    pub cleanup_every: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            abuse: AbuseConfig::default(),
            cleanup_every: 100,
        }
    }
}

/// Outcome of admitting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub admitted: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Set when the caller's history looks automated, whether or not the
    /// request itself was admitted.
    pub abuse: Option<AbuseFinding>,
}

/// Caller key for rate limiting: the authenticated user when known,
/// otherwise the network address.
#[must_use]
pub fn identity_for(user: Option<&str>, address: &str) -> String {
    match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) => format!("user:{user}"),
        None => format!("ip:{}", address.trim()),
    }
}

/// Rate limiter and abuse detector over shared stores.
pub struct Guard {
    windows: Arc<dyn RateWindowStore>,
    history: Arc<dyn QueryHistoryStore>,
    config: GuardConfig,
    checks: AtomicU64,
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("config", &self.config)
            .field("checks", &self.checks)
            .finish_non_exhaustive()
    }
}

impl Guard {
    #[must_use]
    pub fn new(
        windows: Arc<dyn RateWindowStore>,
        history: Arc<dyn QueryHistoryStore>,
        config: GuardConfig,
    ) -> Self {
        Self {
            windows,
            history,
            config,
            checks: AtomicU64::new(0),
        }
    }

    /// A guard backed by in-process stores.
    #[must_use]
    pub fn in_memory(config: GuardConfig) -> Self {
        Self::new(
            Arc::new(MemoryRateWindows::new()),
            Arc::new(MemoryQueryHistory::new(
                config.abuse.max_history_per_identity,
            )),
            config,
        )
    }

    #[must_use]
    pub const fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Admits or rejects one request from `identity` for `query`.
    pub async fn check(&self, identity: &str, query: &str) -> AdmissionDecision {
        self.check_at(identity, query, Utc::now()).await
    }

    /// [`Self::check`] at an explicit instant.
    ///
    /// Every request is added to the caller's history and inspected,
    /// including ones the rate limiter rejects.
    pub async fn check_at(
        &self,
        identity: &str,
        query: &str,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        self.maybe_cleanup(now).await;

        let rate = match self
            .windows
            .hit(identity, now, &self.config.rate_limit)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!("Rate window store failed for {identity}, admitting: {e}");
                RateDecision::fail_open(now, &self.config.rate_limit)
            }
        };

        if !rate.admitted {
            log::info!("Rate limit exceeded for {identity} until {}", rate.reset_at);
        }

        AdmissionDecision {
            admitted: rate.admitted,
            remaining: rate.remaining,
            reset_at: rate.reset_at,
            abuse: self.inspect_history(identity, query, now).await,
        }
    }

    async fn inspect_history(
        &self,
        identity: &str,
        query: &str,
        now: DateTime<Utc>,
    ) -> Option<AbuseFinding> {
        let entry = QueryHistoryEntry {
            address: query.to_string(),
            at: now,
        };
        if let Err(e) = self.history.append(identity, entry).await {
            log::warn!("Query history append failed for {identity}: {e}");
        }

        let since = self.config.abuse.lookback_start(now);
        let history = match self.history.recent(identity, since).await {
            Ok(history) => history,
            Err(e) => {
                log::warn!("Query history read failed for {identity}, skipping abuse check: {e}");
                return None;
            }
        };

        let finding = abuse::detect(&history, now, &self.config.abuse);
        if let Some(finding) = finding {
            log::warn!(
                "Suspected abuse from {identity}: {} (suggested block {} min)",
                finding.message(),
                finding.block_minutes
            );
        }
        finding
    }

    async fn maybe_cleanup(&self, now: DateTime<Utc>) {
        let every = self.config.cleanup_every;
        if every == 0 {
            return;
        }
        let n = self.checks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % every != 0 {
            return;
        }

        match self.windows.purge_expired(now).await {
            Ok(dropped) => log::debug!("Purged {dropped} expired rate windows"),
            Err(e) => log::warn!("Rate window purge failed: {e}"),
        }
        match self
            .history
            .purge_before(self.config.abuse.lookback_start(now))
            .await
        {
            Ok(dropped) => log::debug!("Purged {dropped} stale history entries"),
            Err(e) => log::warn!("Query history purge failed: {e}"),
        }
    }
}
