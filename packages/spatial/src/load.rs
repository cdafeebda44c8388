//! Reading records and coverage boundaries out of `DuckDB`.
//!
//! Expected tables:
//!
//! ```sql
//! CREATE TABLE septic_records (
//!     id VARCHAR NOT NULL, source_id VARCHAR NOT NULL,
//!     county VARCHAR, state VARCHAR,
//!     lat DOUBLE, lng DOUBLE,
//!     parcel_id VARCHAR, address VARCHAR,
//!     quality VARCHAR,          -- VERIFIED_PERMIT | ESTIMATED_INVENTORY | NULL
//!     data_source VARCHAR,
//!     attributes VARCHAR        -- JSON object
//! );
//! CREATE TABLE coverage_regions (
//!     id VARCHAR NOT NULL, name VARCHAR NOT NULL, state VARCHAR NOT NULL,
//!     county VARCHAR, quality VARCHAR NOT NULL, record_count BIGINT,
//!     boundary_geojson VARCHAR  -- Polygon or MultiPolygon
//! );
//! ```

use std::str::FromStr as _;

use geo::MultiPolygon;
use septic_map_lookup_models::{
    AttributeValue, Attributes, Coordinate, CoverageRegion, QualityTier, SepticRecord,
};

use crate::SpatialError;
use crate::geometry::parse_geojson_to_multipolygon;

const RECORDS_QUERY: &str = "SELECT id, source_id, county, state, lat, lng, parcel_id, \
     address, quality, data_source, attributes \
     FROM septic_records WHERE lat IS NOT NULL AND lng IS NOT NULL";

const REGIONS_QUERY: &str = "SELECT id, name, state, county, quality, record_count, \
     boundary_geojson \
     FROM coverage_regions WHERE boundary_geojson IS NOT NULL";

/// Column values of one `septic_records` row.
struct RecordRow {
    id: String,
    source_id: String,
    county: Option<String>,
    state: Option<String>,
    lat: f64,
    lng: f64,
    parcel_id: Option<String>,
    address: Option<String>,
    quality: Option<String>,
    data_source: Option<String>,
    attributes: Option<String>,
}

/// Loads every well-formed septic record. Malformed rows are logged and
/// skipped.
///
/// # Errors
///
/// * If the query fails or a column has an unexpected type
pub fn load_records(conn: &duckdb::Connection) -> Result<Vec<SepticRecord>, SpatialError> {
    let mut stmt = conn.prepare(RECORDS_QUERY)?;
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    let mut skipped = 0_usize;

    while let Some(row) = rows.next()? {
        let raw = RecordRow {
            id: row.get(0)?,
            source_id: row.get(1)?,
            county: row.get(2)?,
            state: row.get(3)?,
            lat: row.get(4)?,
            lng: row.get(5)?,
            parcel_id: row.get(6)?,
            address: row.get(7)?,
            quality: row.get(8)?,
            data_source: row.get(9)?,
            attributes: row.get(10)?,
        };

        match record_from_row(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::warn!("Skipping septic record: {e}");
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!("Skipped {skipped} malformed septic records");
    }
    Ok(records)
}

/// Loads every coverage region with a parseable boundary.
///
/// # Errors
///
/// * If the query fails or a column has an unexpected type
pub fn load_regions(
    conn: &duckdb::Connection,
) -> Result<Vec<(CoverageRegion, MultiPolygon<f64>)>, SpatialError> {
    let mut stmt = conn.prepare(REGIONS_QUERY)?;
    let mut rows = stmt.query([])?;
    let mut regions = Vec::new();

    while let Some(row) = rows.next()? {
        let id: String = row.get(0)?;
        let name: String = row.get(1)?;
        let state: String = row.get(2)?;
        let county: Option<String> = row.get(3)?;
        let quality: String = row.get(4)?;
        let record_count: Option<i64> = row.get(5)?;
        let geojson_str: String = row.get(6)?;

        let Ok(quality) = QualityTier::from_str(quality.trim()) else {
            log::warn!("Unknown quality tier {quality:?} for coverage region {id}");
            continue;
        };
        let Some(boundary) = parse_geojson_to_multipolygon(&geojson_str) else {
            log::warn!("Failed to parse GeoJSON for coverage region {id}");
            continue;
        };

        regions.push((
            CoverageRegion {
                id,
                name,
                state,
                county: county.filter(|c| !c.trim().is_empty()),
                quality,
                record_count: record_count.and_then(|n| u64::try_from(n).ok()).unwrap_or(0),
            },
            boundary,
        ));
    }

    Ok(regions)
}

fn record_from_row(raw: RecordRow) -> Result<SepticRecord, SpatialError> {
    let location = Coordinate::new(raw.lat, raw.lng).map_err(|e| SpatialError::InvalidRecord {
        message: format!("{}: {e}", raw.id),
    })?;

    let attributes = match raw.attributes.as_deref().map(str::trim) {
        None | Some("") => Attributes::new(),
        Some(json) => parse_attributes(json)?,
    };

    let quality = match raw.quality.as_deref().map(str::trim) {
        None | Some("") => QualityTier::detect(&attributes),
        Some(tier) => Some(QualityTier::from_str(tier).map_err(|_| {
            SpatialError::InvalidRecord {
                message: format!("{}: unknown quality tier {tier:?}", raw.id),
            }
        })?),
    };

    Ok(SepticRecord {
        id: raw.id,
        source_id: raw.source_id,
        county: raw.county.unwrap_or_default(),
        state: raw.state.unwrap_or_default(),
        location,
        parcel_id: raw.parcel_id,
        address: raw.address,
        quality,
        data_source: raw.data_source.unwrap_or_default(),
        attributes,
    })
}

/// Parses a JSON object into an attribute bag.
///
/// # Errors
///
/// * If `json` is not valid JSON or not an object
pub fn parse_attributes(json: &str) -> Result<Attributes, SpatialError> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(json)?;
    Ok(map
        .into_iter()
        .map(|(k, v)| (k, AttributeValue::from(v)))
        .collect())
}
