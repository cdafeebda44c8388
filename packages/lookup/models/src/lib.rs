#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Septic record, coverage, and lookup result types.
//!
//! These are the shared shapes passed between the spatial store, the
//! lookup engine, and the HTTP surface. Records and coverage regions are
//! produced by ingestion and only ever read here; a [`LookupResult`] is
//! built fresh for every request.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A WGS84 coordinate.
///
/// Construction validates the range, so any `Coordinate` in hand is
/// finite with latitude in `[-90, 90]` and longitude in `[-180, 180]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    lat: f64,
    lng: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is non-finite or out of range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinateError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(InvalidCoordinateError::NonFinite { lat, lng });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinateError::LatitudeOutOfRange { lat });
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(InvalidCoordinateError::LongitudeOutOfRange { lng });
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lng(self) -> f64 {
        self.lng
    }
}

#[derive(Deserialize)]
struct RawCoordinate {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = InvalidCoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.lat, raw.lng)
    }
}

/// Error returned when a latitude/longitude pair is not a valid WGS84
/// coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InvalidCoordinateError {
    /// Latitude or longitude is NaN or infinite.
    NonFinite {
        /// The latitude that was provided.
        lat: f64,
        /// The longitude that was provided.
        lng: f64,
    },
    /// Latitude outside `[-90, 90]`.
    LatitudeOutOfRange {
        /// The latitude that was provided.
        lat: f64,
    },
    /// Longitude outside `[-180, 180]`.
    LongitudeOutOfRange {
        /// The longitude that was provided.
        lng: f64,
    },
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite { lat, lng } => {
                write!(f, "coordinate ({lat}, {lng}) is not finite")
            }
            Self::LatitudeOutOfRange { lat } => {
                write!(f, "latitude {lat} out of range: expected -90 to 90")
            }
            Self::LongitudeOutOfRange { lng } => {
                write!(f, "longitude {lng} out of range: expected -180 to 180")
            }
        }
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// A scalar value from a record's source-specific attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Explicit null from the source.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Whole number.
    Integer(i64),
    /// Floating-point number.
    Float(f64),
    /// Free text.
    Text(String),
}

impl AttributeValue {
    /// Returns the text if this is a [`AttributeValue::Text`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Renders non-null, non-blank values as a display string.
    #[must_use]
    pub fn to_display(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Float(v) => Some(v.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
        }
    }

    /// Returns `true` for [`AttributeValue::Null`] and blank text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_display().is_none()
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            serde_json::Value::String(s) => Self::Text(s),
            // Nested structures are kept opaque.
            other @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Text(other.to_string())
            }
        }
    }
}

/// Source-specific key/value data attached to a record.
///
/// Field names differ between jurisdictions, so nothing here is assumed
/// present.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// How much a record or coverage region can be trusted.
///
/// Variants are ordered from least to most trusted, so `min()` over a set
/// of tiers picks the most conservative one.
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
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityTier {
    /// Inferred or statistical inventory (e.g. parcel-level estimates).
    EstimatedInventory,
    /// Sourced from issued permits.
    VerifiedPermit,
}

impl QualityTier {
    /// Derives a tier from a record's attribute bag.
    ///
    /// A permit number (`APNO`) marks a verified permit; `WW =
    /// "LikelySeptic"` marks an estimated inventory entry. Anything else is
    /// undetermined.
    #[must_use]
    pub fn detect(attributes: &Attributes) -> Option<Self> {
        if attributes.get("APNO").is_some_and(|v| !v.is_empty()) {
            return Some(Self::VerifiedPermit);
        }
        if attributes
            .get("WW")
            .and_then(AttributeValue::as_str)
            .is_some_and(|v| v == "LikelySeptic")
        {
            return Some(Self::EstimatedInventory);
        }
        None
    }

    /// Human-readable provenance description.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::VerifiedPermit => "Verified permit records",
            Self::EstimatedInventory => "Estimated inventory",
        }
    }
}

/// A septic-related point record from one jurisdiction's source data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SepticRecord {
    /// Identifier, unique within its source.
    pub id: String,
    /// Source dataset identifier.
    pub source_id: String,
    /// County name.
    pub county: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// Point location.
    pub location: Coordinate,
    /// Parcel identifier, if the source provides one.
    pub parcel_id: Option<String>,
    /// Address on record.
    pub address: Option<String>,
    /// Provenance tier, `None` when ingestion could not determine it.
    pub quality: Option<QualityTier>,
    /// Source dataset name.
    pub data_source: String,
    /// Opaque source attributes (permit number, system type, dates, ...).
    pub attributes: Attributes,
}

/// A record returned by a radius search, with its distance from the query
/// point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyRecord {
    /// Shared reference to the stored record.
    pub record: Arc<SepticRecord>,
    /// Great-circle distance from the query point in meters.
    pub distance_meters: f64,
}

/// A state or county for which the dataset claims meaningful coverage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRegion {
    /// Region identifier.
    pub id: String,
    /// Human-readable name (e.g. "Sonoma County Septic Permits").
    pub name: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// County name, `None` for statewide coverage.
    pub county: Option<String>,
    /// Trust level of the data backing this region.
    pub quality: QualityTier,
    /// Number of records ingested for this region.
    pub record_count: u64,
}

/// System-type verdict for a coordinate.
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
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// A septic record sits on or next to the property.
    Septic,
    /// A septic record exists in the neighbourhood.
    LikelySeptic,
    /// Covered area with no septic record nearby.
    Sewer,
    /// No coverage for this area.
    Unknown,
}

/// Qualitative confidence band.
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
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    /// Weak evidence.
    Low,
    /// Moderate evidence.
    Medium,
    /// Strong evidence.
    High,
}

/// Descriptive label for report consumers, derived from classification and
/// confidence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLabel {
    /// Septic with confidence of at least 0.75.
    Confirmed,
    /// Septic below 0.75 confidence.
    Likely,
    /// Likely septic.
    Probable,
    /// Sewer inferred from coverage.
    SewerLikely,
    /// No coverage.
    InsufficientData,
}

impl RiskLabel {
    /// Confidence at or above which a septic verdict is reported as
    /// confirmed.
    pub const CONFIRMED_THRESHOLD: f64 = 0.75;

    /// Derives the label for a classification and numeric confidence.
    #[must_use]
    pub fn derive(classification: Classification, confidence: f64) -> Self {
        match classification {
            Classification::Septic if confidence >= Self::CONFIRMED_THRESHOLD => Self::Confirmed,
            Classification::Septic => Self::Likely,
            Classification::LikelySeptic => Self::Probable,
            Classification::Sewer => Self::SewerLikely,
            Classification::Unknown => Self::InsufficientData,
        }
    }

    /// Human-readable label for reports.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::Likely => "Likely",
            Self::Probable => "Probable",
            Self::SewerLikely => "Sewer likely",
            Self::InsufficientData => "Insufficient data",
        }
    }
}

/// Risk band derived from the estimated age of a system.
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
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AgeRisk {
    /// 15 years old or younger.
    Low,
    /// 16 to 25 years old.
    Medium,
    /// Older than 25 years.
    High,
}

/// A single value pulled out of the attribute bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemField {
    /// Rendered value.
    pub value: String,
    /// `true` when read from the field the permit schema defines, `false`
    /// when read from a looser alias.
    pub verified: bool,
}

/// Summary of the septic system described by the nearest record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// System type (e.g. "OSTDS Repair").
    pub system_type: Option<SystemField>,
    /// Permit or parcel number.
    pub permit_number: Option<SystemField>,
    /// Design capacity, e.g. "300 GPD".
    pub capacity: Option<SystemField>,
    /// Tank size band estimated from capacity.
    pub estimated_tank_size: Option<String>,
    /// Lot size, e.g. "0.5 acres".
    pub lot_size: Option<SystemField>,
    /// Residential or commercial.
    pub property_type: Option<SystemField>,
    /// Water supply type.
    pub water_supply: Option<SystemField>,
    /// Final system approval status.
    pub approval_status: Option<SystemField>,
    /// Permit or approval date as recorded.
    pub permit_date: Option<SystemField>,
    /// Final inspection date as recorded.
    pub final_inspection_date: Option<SystemField>,
    /// Install date as recorded.
    pub install_date: Option<String>,
    /// Last service date as recorded.
    pub last_service_date: Option<String>,
    /// Tax folio number.
    pub tax_folio: Option<SystemField>,
    /// Address of the system itself.
    pub system_address: Option<String>,
    /// Year the system was permitted or installed, when parseable.
    pub install_year: Option<i32>,
    /// Source dataset name.
    pub data_source: Option<String>,
    /// County of the record.
    pub county: Option<String>,
    /// State of the record.
    pub state: Option<String>,
}

impl SystemInfo {
    /// Estimated age in years as of `current_year`, when plausible (1-99).
    #[must_use]
    pub fn age_years(&self, current_year: i32) -> Option<i32> {
        let age = current_year - self.install_year?;
        (1..100).contains(&age).then_some(age)
    }

    /// Risk band from the estimated age.
    #[must_use]
    pub fn age_risk(&self, current_year: i32) -> Option<AgeRisk> {
        self.age_years(current_year).map(|age| match age {
            a if a > 25 => AgeRisk::High,
            a if a > 15 => AgeRisk::Medium,
            _ => AgeRisk::Low,
        })
    }
}

/// The assembled answer for one coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    /// System-type verdict.
    pub classification: Classification,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    /// Qualitative confidence band.
    pub confidence_level: ConfidenceLevel,
    /// Descriptive label for reports.
    pub risk_label: RiskLabel,
    /// Whether any coverage region contains the point.
    pub is_covered: bool,
    /// Most conservative tier among the covering regions.
    pub coverage_quality: Option<QualityTier>,
    /// Regions containing the point.
    pub coverage_sources: Vec<CoverageRegion>,
    /// Nearest record within the search radius.
    pub nearest: Option<NearbyRecord>,
    /// Distance to the nearest record in meters.
    pub nearest_distance_meters: Option<f64>,
    /// Records within the search radius, nearest first, bounded.
    pub nearby_records: Vec<NearbyRecord>,
    /// System summary extracted from the nearest record.
    pub system_info: Option<SystemInfo>,
    /// Radius that was searched, in meters.
    pub search_radius_meters: f64,
    /// Explanation shown when there is no answer for the area.
    pub message: Option<String>,
}
