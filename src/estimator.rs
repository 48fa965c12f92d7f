//! Walk-back time/distance estimate.
//!
//! A directions-service route is preferred. When the service errors (or is
//! not configured) the estimate falls back to the straight-line distance at
//! average walking speed, and gives up entirely for distances that cannot be
//! walked.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::backend::DirectionsService;
use crate::config::EstimatorConfig;
use crate::error::Result;
use crate::geo_utils::haversine_distance;
use crate::GpsPoint;

/// Route reported by a directions service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DirectionsRoute {
    pub duration_seconds: f64,
    pub distance_km: f64,
}

impl DirectionsRoute {
    fn is_usable(&self) -> bool {
        self.duration_seconds.is_finite()
            && self.duration_seconds >= 0.0
            && self.distance_km.is_finite()
            && self.distance_km >= 0.0
    }
}

/// Where an estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum EstimateSource {
    Directions,
    StraightLine,
}

/// "N minutes / M meters" shown while walking back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct WalkEstimate {
    pub minutes: u32,
    pub seconds: u64,
    pub distance_meters: f64,
    pub source: EstimateSource,
}

/// Use a directions route as-is, rounding its duration up to whole minutes.
pub fn estimate_from_route(route: &DirectionsRoute) -> WalkEstimate {
    let seconds = route.duration_seconds.ceil() as u64;
    WalkEstimate {
        minutes: (route.duration_seconds / 60.0).ceil() as u32,
        seconds,
        distance_meters: route.distance_km * 1000.0,
        source: EstimateSource::Directions,
    }
}

/// Estimate a walk of `distance_m` meters at the configured walking speed.
///
/// Returns `None` for `0` or anything beyond `max_estimate_distance_m`.
pub fn estimate_from_distance(distance_m: f64, config: &EstimatorConfig) -> Option<WalkEstimate> {
    if distance_m.is_nan() || distance_m <= 0.0 || distance_m > config.max_estimate_distance_m {
        debug!("[Estimator] No estimate for {} m", distance_m);
        return None;
    }
    let walk_seconds = distance_m / config.walking_speed_mps;
    let seconds = walk_seconds.round() as u64;
    Some(WalkEstimate {
        minutes: (walk_seconds / 60.0).ceil() as u32,
        seconds,
        distance_meters: distance_m,
        source: EstimateSource::StraightLine,
    })
}

/// Straight-line estimate between the user and the car.
pub fn estimate_straight_line(
    origin: &GpsPoint,
    destination: &GpsPoint,
    config: &EstimatorConfig,
) -> Option<WalkEstimate> {
    estimate_from_distance(haversine_distance(origin, destination), config)
}

/// Pick the directions route when it succeeded, otherwise fall back.
///
/// `route` is `None` when the directions service was not called.
pub fn choose_estimate(
    route: Option<Result<DirectionsRoute>>,
    origin: &GpsPoint,
    destination: &GpsPoint,
    config: &EstimatorConfig,
) -> Option<WalkEstimate> {
    match route {
        Some(Ok(route)) if route.is_usable() => Some(estimate_from_route(&route)),
        Some(Ok(route)) => {
            warn!("[Estimator] Ignoring unusable route {:?}", route);
            estimate_straight_line(origin, destination, config)
        }
        Some(Err(e)) => {
            warn!("[Estimator] Directions failed, using straight line: {}", e);
            estimate_straight_line(origin, destination, config)
        }
        None => estimate_straight_line(origin, destination, config),
    }
}

/// Ask `directions` (if any) for a walking route, falling back as needed.
pub async fn estimate_walk<D>(
    directions: Option<&D>,
    origin: &GpsPoint,
    destination: &GpsPoint,
    config: &EstimatorConfig,
) -> Option<WalkEstimate>
where
    D: DirectionsService + ?Sized,
{
    let route = match directions {
        Some(service) => Some(service.walking_route(*origin, *destination).await),
        None => None,
    };
    choose_estimate(route, origin, destination, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NavigatorError;
    use async_trait::async_trait;

    const CAR: GpsPoint = GpsPoint {
        latitude: 6.9271,
        longitude: 79.8612,
    };

    #[test]
    fn test_1400m_is_17_minutes() {
        let estimate = estimate_from_distance(1400.0, &EstimatorConfig::default()).unwrap();
        assert_eq!(estimate.seconds, 1000);
        assert_eq!(estimate.minutes, 17);
        assert_eq!(estimate.source, EstimateSource::StraightLine);
    }

    #[test]
    fn test_minutes_round_up_unrounded_time() {
        // 84.05 m is 60.04 s: displayed seconds round to 60, minutes still 2
        let estimate = estimate_from_distance(84.05, &EstimatorConfig::default()).unwrap();
        assert_eq!(estimate.seconds, 60);
        assert_eq!(estimate.minutes, 2);
    }

    #[test]
    fn test_rejects_zero_and_too_far() {
        let config = EstimatorConfig::default();
        assert!(estimate_from_distance(0.0, &config).is_none());
        assert!(estimate_from_distance(100_001.0, &config).is_none());
        assert!(estimate_from_distance(f64::NAN, &config).is_none());
        assert!(estimate_from_distance(100_000.0, &config).is_some());
        assert!(estimate_straight_line(&CAR, &CAR, &config).is_none());
    }

    #[test]
    fn test_route_duration_rounds_up() {
        let estimate = estimate_from_route(&DirectionsRoute {
            duration_seconds: 601.0,
            distance_km: 0.85,
        });
        assert_eq!(estimate.minutes, 11);
        assert!((estimate.distance_meters - 850.0).abs() < 1e-9);
        assert_eq!(estimate.source, EstimateSource::Directions);
    }

    #[test]
    fn test_choose_estimate_falls_back() {
        let config = EstimatorConfig::default();
        let me = GpsPoint::new(6.9280, 79.8612);

        let error = Some(Err(NavigatorError::Directions {
            message: "ZERO_RESULTS".to_string(),
        }));
        let estimate = choose_estimate(error, &me, &CAR, &config).unwrap();
        assert_eq!(estimate.source, EstimateSource::StraightLine);
        // ~100 m at 1.4 m/s = 72 s
        assert_eq!(estimate.minutes, 2);

        let bad_route = Some(Ok(DirectionsRoute {
            duration_seconds: f64::NAN,
            distance_km: 1.0,
        }));
        let estimate = choose_estimate(bad_route, &me, &CAR, &config).unwrap();
        assert_eq!(estimate.source, EstimateSource::StraightLine);
    }

    struct FixedDirections(Result<DirectionsRoute>);

    #[async_trait]
    impl DirectionsService for FixedDirections {
        async fn walking_route(
            &self,
            _origin: GpsPoint,
            _destination: GpsPoint,
        ) -> Result<DirectionsRoute> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_estimate_walk_prefers_directions() {
        let config = EstimatorConfig::default();
        let me = GpsPoint::new(6.9280, 79.8612);
        let service = FixedDirections(Ok(DirectionsRoute {
            duration_seconds: 150.0,
            distance_km: 0.16,
        }));

        let estimate = estimate_walk(Some(&service), &me, &CAR, &config)
            .await
            .unwrap();
        assert_eq!(estimate.minutes, 3);
        assert_eq!(estimate.source, EstimateSource::Directions);

        let estimate = estimate_walk::<FixedDirections>(None, &me, &CAR, &config)
            .await
            .unwrap();
        assert_eq!(estimate.source, EstimateSource::StraightLine);
    }
}
