//! Capabilities the engine consumes from its collaborators.
//!
//! The record dataset, its spatial index, coverage boundaries, and usage
//! accounting all live outside the engine. Each is a trait so the backing
//! implementation (in-process index, database, remote service) can be
//! swapped without touching the scoring logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use septic_map_lookup_models::{Classification, Coordinate, CoverageRegion, NearbyRecord};
use serde::Serialize;

/// Failure of a consumed capability.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing service or database returned an error.
    #[error("Store backend error: {message}")]
    Backend {
        /// Description of what went wrong.
        message: String,
    },

    /// A lock guarding shared state was poisoned.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Radius search over septic records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record within `radius_meters` of `point`, nearest
    /// first, with great-circle distances in meters.
    ///
    /// An empty result is a valid answer, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    async fn nearby(
        &self,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<NearbyRecord>, StoreError>;
}

/// Point-in-region lookup against coverage boundaries.
#[async_trait]
pub trait CoverageLookup: Send + Sync {
    /// Returns every coverage region whose boundary contains `point`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the boundaries cannot be queried.
    async fn covering_regions(&self, point: Coordinate)
    -> Result<Vec<CoverageRegion>, StoreError>;
}

/// Metadata about one completed lookup, for usage accounting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEntry {
    /// Opaque caller key, if known.
    pub identity: Option<String>,
    /// Address text the caller searched for, if any.
    pub address: Option<String>,
    /// Coordinate that was looked up.
    pub point: Coordinate,
    /// Resulting classification.
    pub classification: Classification,
    /// Resulting confidence.
    pub confidence: f64,
    /// Whether the point was covered.
    pub is_covered: bool,
    /// Distance to the nearest record, if any.
    pub nearest_distance_meters: Option<f64>,
    /// When the lookup completed.
    pub recorded_at: DateTime<Utc>,
}

/// Best-effort sink for lookup metadata.
#[async_trait]
pub trait UsageRecorder: Send + Sync {
    /// Persists one usage entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the entry could not be written. Callers
    /// log and discard the error.
    async fn record(&self, entry: &UsageEntry) -> Result<(), StoreError>;
}
