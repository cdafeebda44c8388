//! Persistence seams for rate windows and query history, plus the
//! in-process implementations used by the server.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::GuardError;
use crate::abuse::QueryHistoryEntry;
use crate::rate::{RateDecision, RateLimitConfig, RateWindow};

/// Per-identity fixed-window counters.
///
/// `hit` must be atomic per identity: concurrent hits for the same
/// identity never admit more than the configured ceiling.
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Counts one request for `identity` and reports the decision.
    ///
    /// # Errors
    ///
    /// * If the backing store cannot be read or written
    async fn hit(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<RateDecision, GuardError>;

    /// Drops windows that ended before `now`. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// * If the backing store cannot be written
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, GuardError>;
}

/// Per-identity query history.
#[async_trait]
pub trait QueryHistoryStore: Send + Sync {
    /// Appends an entry for `identity`.
    ///
    /// # Errors
    ///
    /// * If the backing store cannot be written
    async fn append(&self, identity: &str, entry: QueryHistoryEntry) -> Result<(), GuardError>;

    /// Entries for `identity` at or after `since`, oldest first.
    ///
    /// # Errors
    ///
    /// * If the backing store cannot be read
    async fn recent(
        &self,
        identity: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<QueryHistoryEntry>, GuardError>;

    /// Drops entries older than `cutoff`. Returns how many were dropped.
    ///
    /// # Errors
    ///
    /// * If the backing store cannot be written
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, GuardError>;
}

/// Rate windows held in process memory.
#[derive(Debug, Default)]
pub struct MemoryRateWindows {
    windows: Mutex<BTreeMap<String, RateWindow>>,
}

impl MemoryRateWindows {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of identities with a live or stale window.
    ///
    /// # Errors
    ///
    /// * If the lock is poisoned
    pub fn len(&self) -> Result<usize, GuardError> {
        Ok(self.windows.lock().map_err(|_| GuardError::Poisoned)?.len())
    }

    /// # Errors
    ///
    /// * If the lock is poisoned
    pub fn is_empty(&self) -> Result<bool, GuardError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RateWindowStore for MemoryRateWindows {
    async fn hit(
        &self,
        identity: &str,
        now: DateTime<Utc>,
        config: &RateLimitConfig,
    ) -> Result<RateDecision, GuardError> {
        let mut windows = self.windows.lock().map_err(|_| GuardError::Poisoned)?;
        let window = windows
            .entry(identity.to_string())
            .or_insert_with(|| RateWindow::start(now, config));
        Ok(window.register(now, config))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, GuardError> {
        let mut windows = self.windows.lock().map_err(|_| GuardError::Poisoned)?;
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now));
        Ok(before - windows.len())
    }
}

/// Query history held in process memory, capped per identity.
#[derive(Debug)]
pub struct MemoryQueryHistory {
    entries: Mutex<BTreeMap<String, VecDeque<QueryHistoryEntry>>>,
    max_per_identity: usize,
}

impl MemoryQueryHistory {
    #[must_use]
    pub fn new(max_per_identity: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            max_per_identity,
        }
    }
}

#[async_trait]
impl QueryHistoryStore for MemoryQueryHistory {
    async fn append(&self, identity: &str, entry: QueryHistoryEntry) -> Result<(), GuardError> {
        let mut entries = self.entries.lock().map_err(|_| GuardError::Poisoned)?;
        let history = entries.entry(identity.to_string()).or_default();
        history.push_back(entry);
        while history.len() > self.max_per_identity {
            history.pop_front();
        }
        Ok(())
    }

    async fn recent(
        &self,
        identity: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<QueryHistoryEntry>, GuardError> {
        let entries = self.entries.lock().map_err(|_| GuardError::Poisoned)?;
        let mut recent: Vec<_> = entries
            .get(identity)
            .map(|h| h.iter().filter(|e| e.at >= since).cloned().collect())
            .unwrap_or_default();
        recent.sort_by_key(|e| e.at);
        Ok(recent)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, GuardError> {
        let mut entries = self.entries.lock().map_err(|_| GuardError::Poisoned)?;
        let mut dropped = 0;
        for history in entries.values_mut() {
            let before = history.len();
            history.retain(|e| e.at >= cutoff);
            dropped += before - history.len();
        }
        entries.retain(|_, h| !h.is_empty());
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn entry(address: &str, at: DateTime<Utc>) -> QueryHistoryEntry {
        QueryHistoryEntry {
            address: address.to_string(),
            at,
        }
    }

    #[tokio::test]
    async fn windows_are_tracked_per_identity() {
        let store = MemoryRateWindows::new();
        let config = RateLimitConfig {
            interval_ms: 1_000,
            max_requests: 1,
        };

        assert!(store.hit("ip:a", t0(), &config).await.unwrap().admitted);
        assert!(!store.hit("ip:a", t0(), &config).await.unwrap().admitted);
        assert!(store.hit("ip:b", t0(), &config).await.unwrap().admitted);
        assert_eq!(store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_windows() {
        let store = MemoryRateWindows::new();
        let config = RateLimitConfig::default();
        store.hit("ip:old", t0(), &config).await.unwrap();
        store
            .hit("ip:new", t0() + TimeDelta::seconds(50), &config)
            .await
            .unwrap();

        let dropped = store
            .purge_expired(t0() + TimeDelta::seconds(61))
            .await
            .unwrap();
        assert_eq!(dropped, 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn history_is_capped_per_identity() {
        let store = MemoryQueryHistory::new(3);
        for i in 0..5 {
            store
                .append("ip:a", entry(&format!("{i} Elm St"), t0() + TimeDelta::seconds(i)))
                .await
                .unwrap();
        }

        let recent = store.recent("ip:a", t0()).await.unwrap();
        let addresses: Vec<_> = recent.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addresses, vec!["2 Elm St", "3 Elm St", "4 Elm St"]);
    }

    #[tokio::test]
    async fn recent_filters_by_time_and_identity() {
        let store = MemoryQueryHistory::new(10);
        store.append("ip:a", entry("1 Elm St", t0())).await.unwrap();
        store
            .append("ip:a", entry("2 Elm St", t0() + TimeDelta::minutes(10)))
            .await
            .unwrap();
        store.append("ip:b", entry("3 Elm St", t0())).await.unwrap();

        let recent = store
            .recent("ip:a", t0() + TimeDelta::minutes(5))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].address, "2 Elm St");
        assert!(store.recent("ip:c", t0()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn purge_before_drops_old_entries_and_empty_identities() {
        let store = MemoryQueryHistory::new(10);
        store.append("ip:a", entry("1 Elm St", t0())).await.unwrap();
        store
            .append("ip:b", entry("2 Elm St", t0() + TimeDelta::hours(2)))
            .await
            .unwrap();

        let dropped = store
            .purge_before(t0() + TimeDelta::hours(1))
            .await
            .unwrap();
        assert_eq!(dropped, 1);
        assert!(store.recent("ip:a", t0()).await.unwrap().is_empty());
        assert_eq!(store.recent("ip:b", t0()).await.unwrap().len(), 1);
    }
}
