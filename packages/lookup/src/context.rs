//! Context assembly.
//!
//! [`LookupEngine`] ties the record store, coverage resolver, and distance
//! scoring together into one [`LookupResult`] per request. It holds no
//! per-request state, so one engine serves all concurrent requests.

use std::sync::Arc;

use chrono::Utc;
use septic_map_lookup_models::{
    Classification, ConfidenceLevel, Coordinate, LookupResult, NearbyRecord, QualityTier,
    RiskLabel,
};

use crate::EngineError;
use crate::config::EngineConfig;
use crate::coverage::{Coverage, CoverageResolver};
use crate::distance::{classify, haversine_meters};
use crate::store::{CoverageLookup, RecordStore, UsageEntry, UsageRecorder};
use crate::system_info;

/// Shown with `Unknown` results so callers can tell "no data here yet"
/// apart from a negative answer.
pub const NO_COVERAGE_MESSAGE: &str = "No septic data available for this area yet. \
     We're constantly adding more counties.";

/// A lookup on behalf of a caller.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupRequest {
    /// Coordinate to classify.
    pub point: Coordinate,
    /// Address text the caller searched for, if any.
    pub address: Option<String>,
    /// Opaque caller key, if known.
    pub identity: Option<String>,
}

/// Classifies coordinates against the record dataset.
pub struct LookupEngine {
    records: Arc<dyn RecordStore>,
    coverage: CoverageResolver,
    usage: Option<Arc<dyn UsageRecorder>>,
    config: EngineConfig,
}

impl LookupEngine {
    /// Creates an engine over the given record and coverage capabilities.
    #[must_use]
    pub fn new(
        records: Arc<dyn RecordStore>,
        coverage: Arc<dyn CoverageLookup>,
        config: EngineConfig,
    ) -> Self {
        Self {
            records,
            coverage: CoverageResolver::new(coverage, config.estimated_confidence_cap),
            usage: None,
            config,
        }
    }

    /// Attaches a best-effort usage recorder used by [`Self::lookup`].
    #[must_use]
    pub fn with_usage_recorder(mut self, recorder: Arc<dyn UsageRecorder>) -> Self {
        self.usage = Some(recorder);
        self
    }

    /// The policy this engine scores with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves `point` with the configured default search radius.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] or
    /// [`EngineError::CoverageUnavailable`] if a dependency fails.
    pub async fn resolve_context(&self, point: Coordinate) -> Result<LookupResult, EngineError> {
        self.resolve_context_within(point, self.config.search_radius_meters)
            .await
    }

    /// Resolves `point`, searching for records within `radius_meters`.
    ///
    /// The record search and coverage lookup run concurrently. Coverage
    /// gates interpretation: outside every region the answer is `Unknown`
    /// no matter what records exist nearby.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRadius`] for a non-positive radius, and
    /// [`EngineError::StoreUnavailable`] or
    /// [`EngineError::CoverageUnavailable`] if a dependency fails.
    pub async fn resolve_context_within(
        &self,
        point: Coordinate,
        radius_meters: f64,
    ) -> Result<LookupResult, EngineError> {
        if !(radius_meters.is_finite() && radius_meters > 0.0) {
            return Err(EngineError::InvalidRadius { radius_meters });
        }

        let (nearby, coverage) = tokio::try_join!(
            async {
                self.records
                    .nearby(point, radius_meters)
                    .await
                    .map_err(EngineError::StoreUnavailable)
            },
            self.coverage.resolve(point),
        )?;

        if !coverage.is_covered {
            return Ok(uncovered(radius_meters));
        }

        let nearby = self.rank(point, nearby, radius_meters);

        Ok(match nearby.first() {
            Some(nearest) => self.from_nearest(nearest.clone(), nearby, coverage, radius_meters),
            None => self.from_absence(coverage, radius_meters),
        })
    }

    /// Resolves a caller's lookup and hands the outcome to the usage
    /// recorder without waiting for it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::resolve_context`]. Usage recording failures are
    /// logged and never returned.
    pub async fn lookup(&self, request: &LookupRequest) -> Result<LookupResult, EngineError> {
        let result = self.resolve_context(request.point).await?;
        self.record_usage(request, &result);
        Ok(result)
    }

    fn record_usage(&self, request: &LookupRequest, result: &LookupResult) {
        let Some(recorder) = self.usage.clone() else {
            return;
        };
        let entry = UsageEntry {
            identity: request.identity.clone(),
            address: request.address.clone(),
            point: request.point,
            classification: result.classification,
            confidence: result.confidence,
            is_covered: result.is_covered,
            nearest_distance_meters: result.nearest_distance_meters,
            recorded_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = recorder.record(&entry).await {
                log::warn!("Failed to record lookup usage: {e}");
            }
        });
    }

    /// Re-measures every candidate from `point`, drops anything outside the
    /// radius, orders nearest first (ties by record id), and bounds the
    /// list.
    fn rank(
        &self,
        point: Coordinate,
        nearby: Vec<NearbyRecord>,
        radius_meters: f64,
    ) -> Vec<NearbyRecord> {
        let mut ranked: Vec<NearbyRecord> = nearby
            .into_iter()
            .map(|n| NearbyRecord {
                distance_meters: haversine_meters(point, n.record.location),
                record: n.record,
            })
            .filter(|n| n.distance_meters <= radius_meters)
            .collect();

        ranked.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        ranked.truncate(self.config.max_nearby_records);
        ranked
    }

    fn from_nearest(
        &self,
        nearest: NearbyRecord,
        nearby: Vec<NearbyRecord>,
        coverage: Coverage,
        radius_meters: f64,
    ) -> LookupResult {
        let verdict = classify(nearest.distance_meters, &self.config);
        let quality = [coverage.quality, nearest.record.quality]
            .into_iter()
            .flatten()
            .min();
        let confidence = self.coverage.cap_confidence(verdict.confidence, quality);

        LookupResult {
            classification: verdict.classification,
            confidence,
            confidence_level: verdict.level,
            risk_label: RiskLabel::derive(verdict.classification, confidence),
            is_covered: true,
            coverage_quality: coverage.quality,
            coverage_sources: coverage.sources,
            nearest_distance_meters: Some(nearest.distance_meters),
            system_info: Some(system_info::extract(&nearest.record)),
            nearest: Some(nearest),
            nearby_records: nearby,
            search_radius_meters: radius_meters,
            message: None,
        }
    }

    /// No record inside the radius of a covered point reads as sewer
    /// service.
    fn from_absence(&self, coverage: Coverage, radius_meters: f64) -> LookupResult {
        let (confidence, level) = match coverage.quality {
            Some(QualityTier::EstimatedInventory) => {
                (self.config.estimated_sewer_confidence, ConfidenceLevel::Low)
            }
            Some(QualityTier::VerifiedPermit) | None => {
                (self.config.sewer_confidence, ConfidenceLevel::Medium)
            }
        };

        LookupResult {
            classification: Classification::Sewer,
            confidence,
            confidence_level: level,
            risk_label: RiskLabel::derive(Classification::Sewer, confidence),
            is_covered: true,
            coverage_quality: coverage.quality,
            coverage_sources: coverage.sources,
            nearest: None,
            nearest_distance_meters: None,
            nearby_records: Vec::new(),
            system_info: None,
            search_radius_meters: radius_meters,
            message: None,
        }
    }
}

fn uncovered(radius_meters: f64) -> LookupResult {
    LookupResult {
        classification: Classification::Unknown,
        confidence: 0.0,
        confidence_level: ConfidenceLevel::Low,
        risk_label: RiskLabel::InsufficientData,
        is_covered: false,
        coverage_quality: None,
        coverage_sources: Vec::new(),
        nearest: None,
        nearest_distance_meters: None,
        nearby_records: Vec::new(),
        system_info: None,
        search_radius_meters: radius_meters,
        message: Some(NO_COVERAGE_MESSAGE.to_string()),
    }
}
