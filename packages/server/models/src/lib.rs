#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the septic map server.
//!
//! These types are serialized to JSON for the REST API. They wrap the
//! engine's result types so the API contract can evolve separately.

use chrono::{DateTime, Utc};
use septic_map_lookup_models::{
    AgeRisk, Classification, ConfidenceLevel, CoverageRegion, LookupResult, QualityTier,
};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Records in the spatial index.
    pub record_count: usize,
    /// Coverage regions in the spatial index.
    pub region_count: usize,
}

/// Query parameters for the coverage endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinateParams {
    pub lat: f64,
    pub lng: f64,
}

/// Body of `POST /api/lookup`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupBody {
    pub lat: f64,
    pub lng: f64,
    /// Address text the caller searched for, if any.
    pub address: Option<String>,
}

/// Coverage check response: whether the area has data, and the headline
/// verdict without record details.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCoverage {
    pub is_covered: bool,
    pub quality: Option<QualityTier>,
    /// Provenance description for `quality`.
    pub quality_description: Option<String>,
    pub sources: Vec<CoverageRegion>,
    pub classification: Classification,
    pub confidence: f64,
    pub confidence_level: ConfidenceLevel,
    pub message: Option<String>,
}

impl From<LookupResult> for ApiCoverage {
    fn from(result: LookupResult) -> Self {
        Self {
            is_covered: result.is_covered,
            quality: result.coverage_quality,
            quality_description: result
                .coverage_quality
                .map(|q| q.description().to_string()),
            sources: result.coverage_sources,
            classification: result.classification,
            confidence: result.confidence,
            confidence_level: result.confidence_level,
            message: result.message,
        }
    }
}

/// Full lookup response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLookup {
    #[serde(flatten)]
    pub result: LookupResult,
    /// Report wording for the risk label.
    pub risk_description: String,
    /// Estimated system age as of the response date.
    pub system_age_years: Option<i32>,
    /// Risk band from the system age.
    pub age_risk: Option<AgeRisk>,
}

impl ApiLookup {
    /// Wraps `result`, computing age fields as of `current_year`.
    #[must_use]
    pub fn new(result: LookupResult, current_year: i32) -> Self {
        let system_age_years = result
            .system_info
            .as_ref()
            .and_then(|info| info.age_years(current_year));
        let age_risk = result
            .system_info
            .as_ref()
            .and_then(|info| info.age_risk(current_year));

        Self {
            risk_description: result.risk_label.description().to_string(),
            system_age_years,
            age_risk,
            result,
        }
    }
}

/// Body of a rate-limited (429) response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRateLimited {
    pub error: String,
    /// When the caller's window resets.
    pub reset_at: DateTime<Utc>,
    /// Seconds until `reset_at`, rounded up.
    pub retry_after_seconds: i64,
}
