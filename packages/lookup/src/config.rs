//! Lookup policy constants.
//!
//! Every distance cutoff and confidence value the engine uses lives in
//! [`EngineConfig`] so call sites never re-derive them. The defaults are
//! the calibrated production values; a TOML file may override any subset.

use serde::Deserialize;

/// One step of the distance → confidence table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ConfidenceTier {
    /// Distances strictly below this many meters get `confidence`.
    pub max_distance_meters: f64,
    /// Confidence assigned to this tier.
    pub confidence: f64,
}

/// Scoring, classification, and coverage policy for the lookup engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default radius for the nearby-record search.
    pub search_radius_meters: f64,
    /// Upper bound on supporting records returned with a result.
    pub max_nearby_records: usize,
    /// Distance → confidence table, ascending by distance.
    pub confidence_tiers: Vec<ConfidenceTier>,
    /// Confidence beyond the last tier.
    pub fallback_confidence: f64,
    /// Below this distance a record means `Septic` with high confidence.
    pub septic_high_meters: f64,
    /// Below this distance a record means `Septic` with medium confidence.
    pub septic_medium_meters: f64,
    /// Below this distance a record means `LikelySeptic`.
    pub likely_septic_meters: f64,
    /// Ceiling on confidence when the evidence comes from estimated data.
    pub estimated_confidence_cap: f64,
    /// Confidence for `Sewer` inferred in a verified region.
    pub sewer_confidence: f64,
    /// Confidence for `Sewer` inferred in an estimated-only region.
    pub estimated_sewer_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_radius_meters: 200.0,
            max_nearby_records: 20,
            confidence_tiers: vec![
                ConfidenceTier {
                    max_distance_meters: 15.0,
                    confidence: 0.90,
                },
                ConfidenceTier {
                    max_distance_meters: 30.0,
                    confidence: 0.75,
                },
                ConfidenceTier {
                    max_distance_meters: 50.0,
                    confidence: 0.60,
                },
            ],
            fallback_confidence: 0.50,
            septic_high_meters: 30.0,
            septic_medium_meters: 75.0,
            likely_septic_meters: 200.0,
            estimated_confidence_cap: 0.75,
            sewer_confidence: 0.55,
            estimated_sewer_confidence: 0.40,
        }
    }
}

/// An [`EngineConfig`] that breaks the engine's assumptions.
#[derive(Debug, thiserror::Error)]
#[error("Invalid engine config: {message}")]
pub struct ConfigError {
    /// Description of the violated constraint.
    pub message: String,
}

impl EngineConfig {
    /// Checks that the tables are ordered and every confidence is in
    /// `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: String| -> Result<(), ConfigError> {
            Err(ConfigError { message })
        };

        if !(self.search_radius_meters.is_finite() && self.search_radius_meters > 0.0) {
            return fail(format!(
                "search_radius_meters must be positive, got {}",
                self.search_radius_meters
            ));
        }
        if self.max_nearby_records == 0 {
            return fail("max_nearby_records must be at least 1".to_string());
        }

        let confidences = self
            .confidence_tiers
            .iter()
            .map(|t| ("confidence_tiers", t.confidence))
            .chain([
                ("fallback_confidence", self.fallback_confidence),
                ("estimated_confidence_cap", self.estimated_confidence_cap),
                ("sewer_confidence", self.sewer_confidence),
                (
                    "estimated_sewer_confidence",
                    self.estimated_sewer_confidence,
                ),
            ]);
        for (name, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                return fail(format!("{name} must be within [0, 1], got {value}"));
            }
        }

        for pair in self.confidence_tiers.windows(2) {
            if pair[1].max_distance_meters <= pair[0].max_distance_meters {
                return fail("confidence_tiers must be ascending by distance".to_string());
            }
            if pair[1].confidence > pair[0].confidence {
                return fail("confidence_tiers must not increase with distance".to_string());
            }
        }
        if self
            .confidence_tiers
            .last()
            .is_some_and(|t| self.fallback_confidence > t.confidence)
        {
            return fail("fallback_confidence exceeds the last tier".to_string());
        }

        if !(self.septic_high_meters < self.septic_medium_meters
            && self.septic_medium_meters < self.likely_septic_meters)
        {
            return fail("classification break points must be ascending".to_string());
        }

        Ok(())
    }
}
