#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Septic lookup engine.
//!
//! Given a coordinate, finds nearby septic records, decides whether the
//! area has enough data coverage to answer at all, and turns distances
//! into a calibrated classification:
//!
//! 1. [`distance`]: haversine distance and the distance to confidence and
//!    classification tables.
//! 2. [`coverage`]: which coverage regions contain the point and how much
//!    their data can be trusted.
//! 3. [`context`]: [`LookupEngine`], which runs both dependency calls and
//!    assembles the [`LookupResult`](septic_map_lookup_models::LookupResult).
//!
//! The record dataset and coverage boundaries are reached through the
//! traits in [`store`]; this crate never owns the data.

pub mod config;
pub mod context;
pub mod coverage;
pub mod distance;
pub mod store;
pub mod system_info;

pub use config::EngineConfig;
pub use context::{LookupEngine, LookupRequest};
pub use septic_map_lookup_models::InvalidCoordinateError;
pub use store::StoreError;

/// Errors returned by the lookup engine.
///
/// `Unknown` classification is never used to paper over these: a failing
/// dependency is reported as unavailable so the caller can retry.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The coordinate is malformed or out of range.
    #[error("Invalid coordinate: {0}")]
    InvalidInput(#[from] InvalidCoordinateError),

    /// The search radius is not a positive finite number.
    #[error("Invalid search radius: {radius_meters}")]
    InvalidRadius {
        /// The radius that was requested.
        radius_meters: f64,
    },

    /// The record store could not be queried.
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// The coverage lookup could not be queried.
    #[error("Coverage lookup unavailable: {0}")]
    CoverageUnavailable(#[source] StoreError),
}

impl EngineError {
    /// Returns `true` for dependency failures the caller may retry.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::CoverageUnavailable(_))
    }

    /// Returns `true` for errors caused by the caller's input.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidRadius { .. })
    }
}
