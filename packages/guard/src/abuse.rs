//! Scraping-pattern detection over a caller's recent query history.
//!
//! Three heuristics run in order and the first one that fires wins:
//! a burst of requests in a short window, many requests over very few
//! distinct addresses, and walking house numbers in small steps.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Leading house number of an address.
static HOUSE_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)").expect("valid regex"));

/// Thresholds for the abuse heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AbuseConfig {
    /// How far back history is examined.
    #[serde(alias = "lookback_minutes")]
    pub lookback_minutes: u32,
    /// Entries retained per identity.
    #[serde(alias = "max_history_per_identity")]
    pub max_history_per_identity: usize,
    #[serde(alias = "burst_window_minutes")]
    pub burst_window_minutes: u32,
    /// Requests in the burst window above which a caller is flagged.
    #[serde(alias = "burst_threshold")]
    pub burst_threshold: usize,
    #[serde(alias = "burst_block_minutes")]
    pub burst_block_minutes: u32,
    /// Requests in the lookback above which repetition is checked.
    #[serde(alias = "repetition_threshold")]
    pub repetition_threshold: usize,
    /// Distinct addresses below which those requests count as repetition.
    #[serde(alias = "repetition_min_distinct")]
    pub repetition_min_distinct: usize,
    #[serde(alias = "repetition_block_minutes")]
    pub repetition_block_minutes: u32,
    /// House numbers needed before the sequential check runs.
    #[serde(alias = "sequential_min_numbers")]
    pub sequential_min_numbers: usize,
    /// Largest step between consecutive house numbers counted as sequential.
    #[serde(alias = "sequential_max_gap")]
    pub sequential_max_gap: u64,
    /// Share of consecutive pairs that must be sequential.
    #[serde(alias = "sequential_ratio")]
    pub sequential_ratio: f64,
    #[serde(alias = "sequential_block_minutes")]
    pub sequential_block_minutes: u32,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            lookback_minutes: 60,
            max_history_per_identity: 100,
            burst_window_minutes: 5,
            burst_threshold: 50,
            burst_block_minutes: 60,
            repetition_threshold: 20,
            repetition_min_distinct: 5,
            repetition_block_minutes: 30,
            sequential_min_numbers: 10,
            sequential_max_gap: 5,
            sequential_ratio: 0.7,
            sequential_block_minutes: 120,
        }
    }
}

impl AbuseConfig {
    /// Start of the examined history as of `now`.
    #[must_use]
    pub fn lookback_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - TimeDelta::minutes(i64::from(self.lookback_minutes))
    }
}

/// One query made by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryHistoryEntry {
    pub address: String,
    pub at: DateTime<Utc>,
}

/// Which heuristic flagged a caller.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AbuseReason {
    Burst,
    Repetition,
    SequentialScan,
}

impl AbuseReason {
    /// Human-readable explanation returned to operators.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Burst => "Excessive requests detected (possible scraping)",
            Self::Repetition => "Repeated identical lookups detected",
            Self::SequentialScan => "Sequential address pattern detected (bot behavior)",
        }
    }
}

/// A positive abuse verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbuseFinding {
    pub reason: AbuseReason,
    /// Suggested block duration.
    pub block_minutes: u32,
}

impl AbuseFinding {
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.reason.message()
    }
}

/// Runs the heuristics over `history` as of `now`.
///
/// Entries older than the configured lookback are ignored, so callers may
/// pass an unfiltered history.
#[must_use]
pub fn detect(
    history: &[QueryHistoryEntry],
    now: DateTime<Utc>,
    config: &AbuseConfig,
) -> Option<AbuseFinding> {
    let since = config.lookback_start(now);
    let mut recent: Vec<&QueryHistoryEntry> = history.iter().filter(|e| e.at >= since).collect();
    recent.sort_by_key(|e| e.at);

    let burst_since = now - TimeDelta::minutes(i64::from(config.burst_window_minutes));
    let burst = recent.iter().filter(|e| e.at >= burst_since).count();
    if burst > config.burst_threshold {
        return Some(AbuseFinding {
            reason: AbuseReason::Burst,
            block_minutes: config.burst_block_minutes,
        });
    }

    if recent.len() > config.repetition_threshold {
        let distinct: BTreeSet<&str> = recent.iter().map(|e| e.address.as_str()).collect();
        if distinct.len() < config.repetition_min_distinct {
            return Some(AbuseFinding {
                reason: AbuseReason::Repetition,
                block_minutes: config.repetition_block_minutes,
            });
        }
    }

    let numbers: Vec<u64> = recent
        .iter()
        .filter_map(|e| house_number(&e.address))
        .collect();
    if is_sequential(&numbers, config) {
        return Some(AbuseFinding {
            reason: AbuseReason::SequentialScan,
            block_minutes: config.sequential_block_minutes,
        });
    }

    None
}

/// Leading house number of `address`, if it has one.
#[must_use]
pub fn house_number(address: &str) -> Option<u64> {
    HOUSE_NUMBER_RE
        .captures(address)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[allow(clippy::cast_precision_loss)]
fn is_sequential(numbers: &[u64], config: &AbuseConfig) -> bool {
    if numbers.len() < config.sequential_min_numbers.max(2) {
        return false;
    }
    let pairs = numbers.len() - 1;
    let close = numbers
        .windows(2)
        .filter(|w| w[0].abs_diff(w[1]) <= config.sequential_max_gap)
        .count();

    close as f64 / pairs as f64 > config.sequential_ratio
}
