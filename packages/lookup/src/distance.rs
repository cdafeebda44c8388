//! Great-circle distance and distance-based scoring.

use septic_map_lookup_models::{Classification, ConfidenceLevel, Coordinate};

use crate::config::EngineConfig;

/// Mean Earth radius used for all distance calculations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
#[must_use]
pub fn haversine_meters(from: Coordinate, to: Coordinate) -> f64 {
    let phi1 = from.lat().to_radians();
    let phi2 = to.lat().to_radians();
    let d_phi = (to.lat() - from.lat()).to_radians();
    let d_lambda = (to.lng() - from.lng()).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Outcome of scoring a single distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceVerdict {
    /// Coarse classification from the distance alone.
    pub classification: Classification,
    /// Fine-grained confidence from the distance alone.
    pub confidence: f64,
    /// Qualitative band from the coarse tiering.
    pub level: ConfidenceLevel,
}

/// Confidence for a record `distance_meters` away.
///
/// Walks the tiers in order; the first tier whose bound exceeds the
/// distance wins, otherwise the fallback applies.
#[must_use]
pub fn confidence_for_distance(distance_meters: f64, config: &EngineConfig) -> f64 {
    config
        .confidence_tiers
        .iter()
        .find(|tier| distance_meters < tier.max_distance_meters)
        .map_or(config.fallback_confidence, |tier| tier.confidence)
}

/// Coarse classification and confidence band for a record
/// `distance_meters` away.
#[must_use]
pub fn classification_for_distance(
    distance_meters: f64,
    config: &EngineConfig,
) -> (Classification, ConfidenceLevel) {
    if distance_meters < config.septic_high_meters {
        (Classification::Septic, ConfidenceLevel::High)
    } else if distance_meters < config.septic_medium_meters {
        (Classification::Septic, ConfidenceLevel::Medium)
    } else if distance_meters < config.likely_septic_meters {
        (Classification::LikelySeptic, ConfidenceLevel::Low)
    } else {
        (Classification::Sewer, ConfidenceLevel::Medium)
    }
}

/// Scores a distance to the nearest record.
///
/// Pure and total over non-negative distances.
#[must_use]
pub fn classify(distance_meters: f64, config: &EngineConfig) -> DistanceVerdict {
    let (classification, level) = classification_for_distance(distance_meters, config);
    DistanceVerdict {
        classification,
        confidence: confidence_for_distance(distance_meters, config),
        level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lng: f64) -> Coordinate {
        Coordinate::new(lat, lng).unwrap()
    }

    #[test]
    fn haversine_zero_for_same_point() {
        let p = coord(27.95, -82.46);
        assert!(haversine_meters(p, p).abs() < f64::EPSILON);
    }

    #[test]
    fn haversine_one_degree_of_latitude() {
        // 2 * pi * R / 360
        let expected = 111_194.926_644_558_74;
        let d = haversine_meters(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!((d - expected).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn haversine_is_symmetric() {
        let a = coord(38.2975, -122.4580);
        let b = coord(38.2990, -122.4561);
        assert!((haversine_meters(a, b) - haversine_meters(b, a)).abs() < 1e-9);
    }

    #[test]
    fn haversine_antipodal() {
        let d = haversine_meters(coord(0.0, 0.0), coord(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1e-6);
    }

    #[test]
    fn confidence_break_points() {
        let config = EngineConfig::default();
        assert_eq!(confidence_for_distance(0.0, &config), 0.90);
        assert_eq!(confidence_for_distance(14.0, &config), 0.90);
        assert_eq!(confidence_for_distance(14.999, &config), 0.90);
        assert_eq!(confidence_for_distance(15.0, &config), 0.75);
        assert_eq!(confidence_for_distance(29.0, &config), 0.75);
        assert_eq!(confidence_for_distance(30.0, &config), 0.60);
        assert_eq!(confidence_for_distance(49.0, &config), 0.60);
        assert_eq!(confidence_for_distance(50.0, &config), 0.50);
        assert_eq!(confidence_for_distance(200.0, &config), 0.50);
    }

    #[test]
    fn confidence_is_non_increasing() {
        let config = EngineConfig::default();
        let mut previous = f64::INFINITY;
        for step in 0..=400 {
            let d = f64::from(step) * 0.5;
            let c = confidence_for_distance(d, &config);
            assert!(c <= previous, "confidence rose at {d}m: {previous} -> {c}");
            previous = c;
        }
    }

    #[test]
    fn coarse_classification_tiers() {
        let config = EngineConfig::default();
        assert_eq!(
            classification_for_distance(29.9, &config),
            (Classification::Septic, ConfidenceLevel::High)
        );
        assert_eq!(
            classification_for_distance(30.0, &config),
            (Classification::Septic, ConfidenceLevel::Medium)
        );
        assert_eq!(
            classification_for_distance(74.9, &config),
            (Classification::Septic, ConfidenceLevel::Medium)
        );
        assert_eq!(
            classification_for_distance(75.0, &config),
            (Classification::LikelySeptic, ConfidenceLevel::Low)
        );
        assert_eq!(
            classification_for_distance(200.0, &config),
            (Classification::Sewer, ConfidenceLevel::Medium)
        );
    }

    #[test]
    fn classify_combines_both_tierings() {
        let verdict = classify(10.0, &EngineConfig::default());
        assert_eq!(verdict.classification, Classification::Septic);
        assert_eq!(verdict.confidence, 0.90);
        assert_eq!(verdict.level, ConfidenceLevel::High);

        let verdict = classify(180.0, &EngineConfig::default());
        assert_eq!(verdict.classification, Classification::LikelySeptic);
        assert_eq!(verdict.confidence, 0.50);
    }
}
