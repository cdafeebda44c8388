#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! In-memory spatial index for septic lookups.
//!
//! Loads septic record points and coverage boundary polygons from `DuckDB`
//! at startup, builds R-tree indexes, and serves the radius search and
//! point-in-region queries the lookup engine consumes.

pub mod geometry;
pub mod load;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use geo::{Intersects as _, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use septic_map_lookup::distance::haversine_meters;
use septic_map_lookup::store::{CoverageLookup, RecordStore};
use septic_map_lookup::StoreError;
use septic_map_lookup_models::{Coordinate, CoverageRegion, NearbyRecord, SepticRecord};

use crate::geometry::{compute_envelope, search_envelopes};

/// Errors from building the index.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error(transparent)]
    Database(#[from] duckdb::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },
}

/// A record point stored in the R-tree.
struct RecordEntry {
    position: [f64; 2],
    record: Arc<SepticRecord>,
}

impl RTreeObject for RecordEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

/// A coverage boundary stored in the R-tree with its metadata.
struct RegionEntry {
    region: CoverageRegion,
    envelope: AABB<[f64; 2]>,
    boundary: MultiPolygon<f64>,
}

impl RTreeObject for RegionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built spatial indexes for septic records and coverage regions.
///
/// Constructed once and shared across all lookups.
pub struct SpatialIndex {
    records: RTree<RecordEntry>,
    regions: RTree<RegionEntry>,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("records", &self.records.size())
            .field("regions", &self.regions.size())
            .finish()
    }
}

impl SpatialIndex {
    /// Opens a `DuckDB` file read-only and loads it.
    ///
    /// # Errors
    ///
    /// * If the file cannot be opened
    /// * If either table cannot be read
    pub fn open(path: &Path) -> Result<Self, SpatialError> {
        let conn = duckdb::Connection::open_with_flags(
            path,
            duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
        )?;
        Self::load(&conn)
    }

    /// Loads records and boundaries from `conn` and builds the R-trees.
    ///
    /// # Errors
    ///
    /// * If either table cannot be read
    pub fn load(conn: &duckdb::Connection) -> Result<Self, SpatialError> {
        let records = load::load_records(conn)?;
        let regions = load::load_regions(conn)?;
        let index = Self::from_parts(records, regions);

        log::info!(
            "Loaded {} septic records and {} coverage regions into spatial index",
            index.record_count(),
            index.region_count()
        );
        Ok(index)
    }

    /// Builds the index from already-loaded data.
    #[must_use]
    pub fn from_parts(
        records: Vec<SepticRecord>,
        regions: Vec<(CoverageRegion, MultiPolygon<f64>)>,
    ) -> Self {
        let record_entries = records
            .into_iter()
            .map(|record| RecordEntry {
                position: [record.location.lng(), record.location.lat()],
                record: Arc::new(record),
            })
            .collect();

        let region_entries = regions
            .into_iter()
            .filter_map(|(region, boundary)| {
                let Some(envelope) = compute_envelope(&boundary) else {
                    log::warn!("Coverage region {} has an empty boundary", region.id);
                    return None;
                };
                Some(RegionEntry {
                    region,
                    envelope,
                    boundary,
                })
            })
            .collect();

        Self {
            records: RTree::bulk_load(record_entries),
            regions: RTree::bulk_load(region_entries),
        }
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.size()
    }

    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.size()
    }

    /// Records within `radius_meters` of `point`, nearest first. Equal
    /// distances are ordered by record id.
    #[must_use]
    pub fn records_within(&self, point: Coordinate, radius_meters: f64) -> Vec<NearbyRecord> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Vec::new();
        }

        let mut nearby: Vec<NearbyRecord> = search_envelopes(point, radius_meters)
            .iter()
            .flat_map(|env| self.records.locate_in_envelope(env))
            .filter_map(|entry| {
                let distance_meters = haversine_meters(point, entry.record.location);
                (distance_meters <= radius_meters).then(|| NearbyRecord {
                    record: Arc::clone(&entry.record),
                    distance_meters,
                })
            })
            .collect();

        nearby.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        nearby
    }

    /// Every coverage region whose boundary contains `point`, including
    /// points on the boundary itself. Ordered by region id.
    #[must_use]
    pub fn regions_containing(&self, point: Coordinate) -> Vec<CoverageRegion> {
        let target = geo::Point::new(point.lng(), point.lat());
        let query_env = AABB::from_point([point.lng(), point.lat()]);

        let mut regions: Vec<CoverageRegion> = self
            .regions
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.boundary.intersects(&target))
            .map(|entry| entry.region.clone())
            .collect();
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions
    }
}

#[async_trait]
impl RecordStore for SpatialIndex {
    async fn nearby(
        &self,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<NearbyRecord>, StoreError> {
        Ok(self.records_within(point, radius_meters))
    }
}

#[async_trait]
impl CoverageLookup for SpatialIndex {
    async fn covering_regions(
        &self,
        point: Coordinate,
    ) -> Result<Vec<CoverageRegion>, StoreError> {
        Ok(self.regions_containing(point))
    }
}
