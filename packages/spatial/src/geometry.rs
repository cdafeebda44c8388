//! Geometry helpers: boundary parsing and degree envelopes for metric
//! radius searches.

use geo::{BoundingRect as _, MultiPolygon};
use geojson::GeoJson;
use rstar::AABB;
use septic_map_lookup::distance::EARTH_RADIUS_METERS;
use septic_map_lookup_models::Coordinate;

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
///
/// Accepts a bare `Polygon`/`MultiPolygon` geometry or a `Feature`
/// wrapping one.
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geometry = match geojson_str.parse::<GeoJson>().ok()? {
        GeoJson::Geometry(geom) => geom,
        GeoJson::Feature(feature) => feature.geometry?,
        GeoJson::FeatureCollection(_) => return None,
    };
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Bounding box of a [`MultiPolygon`] in `[lng, lat]` order.
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect().map(|rect| {
        AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
    })
}

/// Degree boxes that together contain every point within `radius_meters`
/// of `center` on the sphere.
///
/// Returns two boxes when the circle crosses the antimeridian. Near the
/// poles the longitude range widens to the full circle.
pub fn search_envelopes(center: Coordinate, radius_meters: f64) -> Vec<AABB<[f64; 2]>> {
    // Slight padding so points exactly on the radius survive the prefilter.
    let angular = radius_meters / EARTH_RADIUS_METERS * (1.0 + 1e-9);
    let lat = center.lat().to_radians();

    let min_lat = lat - angular;
    let max_lat = lat + angular;
    let half_pi = std::f64::consts::FRAC_PI_2;

    if min_lat <= -half_pi || max_lat >= half_pi || angular.sin() >= lat.cos() {
        return vec![AABB::from_corners(
            [-180.0, min_lat.max(-half_pi).to_degrees()],
            [180.0, max_lat.min(half_pi).to_degrees()],
        )];
    }

    let delta_lng = (angular.sin() / lat.cos()).asin().to_degrees();
    let (lo_lat, hi_lat) = (min_lat.to_degrees(), max_lat.to_degrees());
    let lo_lng = center.lng() - delta_lng;
    let hi_lng = center.lng() + delta_lng;

    if delta_lng >= 180.0 {
        vec![AABB::from_corners([-180.0, lo_lat], [180.0, hi_lat])]
    } else if lo_lng < -180.0 {
        vec![
            AABB::from_corners([lo_lng + 360.0, lo_lat], [180.0, hi_lat]),
            AABB::from_corners([-180.0, lo_lat], [hi_lng, hi_lat]),
        ]
    } else if hi_lng > 180.0 {
        vec![
            AABB::from_corners([lo_lng, lo_lat], [180.0, hi_lat]),
            AABB::from_corners([-180.0, lo_lat], [hi_lng - 360.0, hi_lat]),
        ]
    } else {
        vec![AABB::from_corners([lo_lng, lo_lat], [hi_lng, hi_lat])]
    }
}
