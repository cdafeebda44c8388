//! Coverage resolution.
//!
//! Decides whether the dataset claims enough density around a point for
//! "no record found" to mean anything, and how far the evidence for that
//! point can be trusted.

use std::sync::Arc;

use septic_map_lookup_models::{Coordinate, CoverageRegion, QualityTier};

use crate::EngineError;
use crate::store::CoverageLookup;

/// Coverage status for a single point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    /// Whether at least one region contains the point.
    pub is_covered: bool,
    /// Containing regions, ordered by id.
    pub sources: Vec<CoverageRegion>,
    /// Most conservative tier among `sources`.
    pub quality: Option<QualityTier>,
}

impl Coverage {
    /// Builds coverage from the regions containing a point.
    ///
    /// Overlapping regions with different tiers resolve to the lowest
    /// tier.
    #[must_use]
    pub fn from_regions(mut regions: Vec<CoverageRegion>) -> Self {
        regions.sort_by(|a, b| a.id.cmp(&b.id));
        regions.dedup_by(|a, b| a.id == b.id);
        let quality = regions.iter().map(|r| r.quality).min();
        Self {
            is_covered: !regions.is_empty(),
            sources: regions,
            quality,
        }
    }

    /// Coverage for a point no region contains.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            is_covered: false,
            sources: Vec::new(),
            quality: None,
        }
    }
}

/// Resolves coverage for points and applies the trust cap.
pub struct CoverageResolver {
    lookup: Arc<dyn CoverageLookup>,
    estimated_confidence_cap: f64,
}

impl CoverageResolver {
    /// Creates a resolver over `lookup` that caps estimated evidence at
    /// `estimated_confidence_cap`.
    #[must_use]
    pub fn new(lookup: Arc<dyn CoverageLookup>, estimated_confidence_cap: f64) -> Self {
        Self {
            lookup,
            estimated_confidence_cap,
        }
    }

    /// Looks up the regions containing `point`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CoverageUnavailable`] if the coverage lookup
    /// fails. A point outside every region is not an error.
    pub async fn resolve(&self, point: Coordinate) -> Result<Coverage, EngineError> {
        let regions = self
            .lookup
            .covering_regions(point)
            .await
            .map_err(EngineError::CoverageUnavailable)?;
        Ok(Coverage::from_regions(regions))
    }

    /// Applies the trust cap for `quality` to a distance-based confidence.
    ///
    /// The result never exceeds the input; estimated data additionally
    /// never exceeds the cap.
    #[must_use]
    pub fn cap_confidence(&self, confidence: f64, quality: Option<QualityTier>) -> f64 {
        match quality {
            Some(QualityTier::EstimatedInventory) => confidence.min(self.estimated_confidence_cap),
            Some(QualityTier::VerifiedPermit) | None => confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::store::StoreError;

    fn region(id: &str, quality: QualityTier) -> CoverageRegion {
        CoverageRegion {
            id: id.to_string(),
            name: format!("{id} septic records"),
            state: "FL".to_string(),
            county: Some("Hillsborough".to_string()),
            quality,
            record_count: 100,
        }
    }

    struct FixedRegions(Vec<CoverageRegion>);

    #[async_trait]
    impl CoverageLookup for FixedRegions {
        async fn covering_regions(
            &self,
            _point: Coordinate,
        ) -> Result<Vec<CoverageRegion>, StoreError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl CoverageLookup for Broken {
        async fn covering_regions(
            &self,
            _point: Coordinate,
        ) -> Result<Vec<CoverageRegion>, StoreError> {
            Err(StoreError::Backend {
                message: "connection refused".to_string(),
            })
        }
    }

    fn point() -> Coordinate {
        Coordinate::new(27.95, -82.46).unwrap()
    }

    #[test]
    fn overlapping_regions_pick_lowest_tier() {
        let coverage = Coverage::from_regions(vec![
            region("b", QualityTier::VerifiedPermit),
            region("a", QualityTier::EstimatedInventory),
        ]);
        assert!(coverage.is_covered);
        assert_eq!(coverage.quality, Some(QualityTier::EstimatedInventory));
        assert_eq!(coverage.sources[0].id, "a");
    }

    #[test]
    fn empty_regions_are_uncovered() {
        assert_eq!(Coverage::from_regions(Vec::new()), Coverage::none());
    }

    #[test]
    fn estimated_quality_caps_confidence() {
        let resolver = CoverageResolver::new(Arc::new(FixedRegions(Vec::new())), 0.75);
        assert_eq!(
            resolver.cap_confidence(0.90, Some(QualityTier::EstimatedInventory)),
            0.75
        );
        assert_eq!(
            resolver.cap_confidence(0.60, Some(QualityTier::EstimatedInventory)),
            0.60
        );
        assert_eq!(
            resolver.cap_confidence(0.90, Some(QualityTier::VerifiedPermit)),
            0.90
        );
        assert_eq!(resolver.cap_confidence(0.90, None), 0.90);
    }

    #[tokio::test]
    async fn resolve_reports_regions() {
        let resolver = CoverageResolver::new(
            Arc::new(FixedRegions(vec![region("fl", QualityTier::VerifiedPermit)])),
            0.75,
        );
        let coverage = resolver.resolve(point()).await.unwrap();
        assert!(coverage.is_covered);
        assert_eq!(coverage.quality, Some(QualityTier::VerifiedPermit));
    }

    #[tokio::test]
    async fn lookup_failure_is_unavailable_not_uncovered() {
        let resolver = CoverageResolver::new(Arc::new(Broken), 0.75);
        let err = resolver.resolve(point()).await.unwrap_err();
        assert!(matches!(err, EngineError::CoverageUnavailable(_)));
    }
}
