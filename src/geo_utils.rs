//! Geographic utilities.
//!
//! Great-circle distance on a spherical Earth. The public entry point never
//! returns `NaN`, a negative value, or anything longer than 20,000 km: such
//! results are clamped to `0.0` so they cannot leak into
//! arrival or achievement threshold comparisons.

use log::warn;

use crate::GpsPoint;

/// Mean Earth radius used by the backend and the app, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 20,000 km, just under half the Earth's circumference (π·R ≈ 20,015 km).
/// Antipodal pairs therefore clamp to `0.0` too.
pub const MAX_PLAUSIBLE_DISTANCE_M: f64 = 20_000_000.0;

/// Haversine distance in meters between two points, without any clamping.
///
/// Returns `NaN` when either input contains `NaN`.
pub fn raw_haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let d_phi = (p2.latitude - p1.latitude).to_radians();
    let d_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Haversine distance in meters between two points.
///
/// Degenerate results (`NaN`, negative, or beyond [`MAX_PLAUSIBLE_DISTANCE_M`])
/// are logged and returned as `0.0`.
///
/// # Example
/// ```
/// use park_navigator::GpsPoint;
/// use park_navigator::geo_utils::haversine_distance;
///
/// let car = GpsPoint::new(6.9271, 79.8612);
/// let me = GpsPoint::new(6.9280, 79.8612);
/// let d = haversine_distance(&me, &car);
/// assert!(d > 90.0 && d < 110.0);
/// ```
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let distance = raw_haversine_distance(p1, p2);
    sanitize_distance(distance, p1, p2)
}

fn sanitize_distance(distance: f64, p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    if distance.is_nan() || distance < 0.0 || distance > MAX_PLAUSIBLE_DISTANCE_M {
        warn!(
            "[Geo] Discarding degenerate distance {} between ({}, {}) and ({}, {})",
            distance, p1.latitude, p1.longitude, p2.latitude, p2.longitude
        );
        return 0.0;
    }
    distance
}
