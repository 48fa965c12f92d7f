//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The app shell owns the map, the location provider and the network stack,
//! so these bindings expose the synchronous [`NavigationTracker`] through a
//! process-wide singleton. Each call returns the [`TrackerCommand`]s the
//! shell must execute. Outcomes are reported back through the
//! `tracker_report_*` functions.

use std::sync::{Mutex, MutexGuard};

use log::{debug, info};
use once_cell::sync::Lazy;

use crate::config::{EstimatorConfig, TrackerConfig};
use crate::estimator::{estimate_from_route, estimate_straight_line, DirectionsRoute, WalkEstimate};
use crate::http::{fetch_latest_active_blocking, BackendConfig};
use crate::location::PositionSample;
use crate::session::{NewLandmark, ParkingSession, ParkingStatus};
use crate::telemetry::TelemetrySnapshot;
use crate::tracker::{NavigationTracker, TrackerCommand, TrackerState};
use crate::{geo_utils, init_logging, GpsPoint, NavigatorError};

/// Global tracker instance shared by every binding call.
pub static TRACKER: Lazy<Mutex<NavigationTracker>> =
    Lazy::new(|| Mutex::new(NavigationTracker::default()));

fn lock_tracker() -> MutexGuard<'static, NavigationTracker> {
    // A panic mid-call leaves the tracker usable; keep going with its state
    TRACKER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `f` with exclusive access to the global tracker.
pub fn with_tracker<F, R>(f: F) -> R
where
    F: FnOnce(&mut NavigationTracker) -> R,
{
    let mut tracker = lock_tracker();
    f(&mut tracker)
}

// ============================================================================
// Geometry and estimates
// ============================================================================

/// Haversine distance in meters.
#[uniffi::export]
pub fn ffi_haversine_distance(p1: GpsPoint, p2: GpsPoint) -> f64 {
    geo_utils::haversine_distance(&p1, &p2)
}

/// Straight-line walk estimate. `None` when the distance is zero or too far.
#[uniffi::export]
pub fn ffi_estimate_straight_line(
    origin: GpsPoint,
    destination: GpsPoint,
    config: Option<EstimatorConfig>,
) -> Option<WalkEstimate> {
    estimate_straight_line(&origin, &destination, &config.unwrap_or_default())
}

/// Convert a route fetched by the shell into an estimate.
#[uniffi::export]
pub fn ffi_estimate_from_route(route: DirectionsRoute) -> WalkEstimate {
    estimate_from_route(&route)
}

// ============================================================================
// Tracker lifecycle
// ============================================================================

/// Replace the global tracker (call once at app startup, or on sign-out).
#[uniffi::export]
pub fn tracker_reset(config: Option<TrackerConfig>) {
    init_logging();
    let config = config.unwrap_or_default();
    info!(
        "[ParkNavigator] Tracker reset (arrival {} m, landmark {} m)",
        config.arrival_radius_m, config.landmark_radius_m
    );
    with_tracker(|t| *t = NavigationTracker::new(config));
}

#[uniffi::export]
pub fn tracker_state() -> TrackerState {
    with_tracker(|t| t.state())
}

#[uniffi::export]
pub fn tracker_session() -> Option<ParkingSession> {
    with_tracker(|t| t.session().cloned())
}

/// Current session as JSON (`"null"` when there is none).
#[uniffi::export]
pub fn tracker_session_json() -> String {
    with_tracker(|t| serde_json::to_string(&t.session()).unwrap_or_else(|_| "null".to_string()))
}

#[uniffi::export]
pub fn tracker_telemetry() -> TelemetrySnapshot {
    with_tracker(|t| t.telemetry())
}

#[uniffi::export]
pub fn tracker_is_navigating() -> bool {
    with_tracker(|t| t.is_navigation_active())
}

/// Hand the tracker a session fetched by the shell.
#[uniffi::export]
pub fn tracker_set_session(session: Option<ParkingSession>) -> Vec<TrackerCommand> {
    debug!(
        "[ParkNavigator] Session set: {:?}",
        session.as_ref().map(|s| s.parking_events_id)
    );
    with_tracker(|t| t.on_session_fetched(session))
}

/// Decode a `GET /parking/latest-active` body and hand it to the tracker.
#[uniffi::export]
pub fn tracker_set_session_json(json: String) -> Result<Vec<TrackerCommand>, NavigatorError> {
    let body: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| NavigatorError::Decode {
            message: e.to_string(),
        })?;
    let session = crate::session::parse_latest_active(body)?;
    Ok(tracker_set_session(session))
}

/// Fetch the latest active session over HTTP and hand it to the tracker.
#[uniffi::export]
pub fn tracker_refresh(config: BackendConfig) -> Result<Vec<TrackerCommand>, NavigatorError> {
    init_logging();
    let session = fetch_latest_active_blocking(config)?;
    Ok(tracker_set_session(session))
}

/// Fetch the latest active session without touching the tracker.
#[uniffi::export]
pub fn ffi_fetch_latest_active(
    config: BackendConfig,
) -> Result<Option<ParkingSession>, NavigatorError> {
    init_logging();
    fetch_latest_active_blocking(config)
}

// ============================================================================
// User actions
// ============================================================================

#[uniffi::export]
pub fn tracker_start_navigation(
    now_ms: u64,
    estimated_minutes: Option<u32>,
) -> Result<Vec<TrackerCommand>, NavigatorError> {
    init_logging();
    with_tracker(|t| t.start_navigation(now_ms, estimated_minutes))
}

#[uniffi::export]
pub fn tracker_cancel_navigation(now_ms: u64) -> Result<Vec<TrackerCommand>, NavigatorError> {
    with_tracker(|t| t.cancel_navigation(now_ms))
}

#[uniffi::export]
pub fn tracker_clear_parking(now_ms: u64) -> Result<Vec<TrackerCommand>, NavigatorError> {
    with_tracker(|t| t.clear_parking(now_ms))
}

#[uniffi::export]
pub fn tracker_begin_capture() -> Result<(), NavigatorError> {
    with_tracker(|t| t.begin_landmark_capture())
}

#[uniffi::export]
pub fn tracker_stage_landmark(point: GpsPoint) -> Result<NewLandmark, NavigatorError> {
    with_tracker(|t| t.stage_landmark(point))
}

#[uniffi::export]
pub fn tracker_staged_landmarks() -> Vec<NewLandmark> {
    with_tracker(|t| t.staged_landmarks().to_vec())
}

#[uniffi::export]
pub fn tracker_save_staged() -> Result<Vec<TrackerCommand>, NavigatorError> {
    with_tracker(|t| t.save_staged_landmarks())
}

#[uniffi::export]
pub fn tracker_abandon_capture() -> Result<(), NavigatorError> {
    with_tracker(|t| t.abandon_landmark_capture())
}

// ============================================================================
// Platform callbacks
// ============================================================================

#[uniffi::export]
pub fn tracker_on_position(sample: PositionSample) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_position(sample))
}

#[uniffi::export]
pub fn tracker_focus_gained(now_ms: u64) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_focus_gained(now_ms))
}

#[uniffi::export]
pub fn tracker_focus_lost(now_ms: u64) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_focus_lost(now_ms))
}

// ============================================================================
// Outcome reports
// ============================================================================

/// The shell's `PUT /parking/{id}` succeeded.
#[uniffi::export]
pub fn tracker_report_status_updated(
    status: ParkingStatus,
    session: Option<ParkingSession>,
) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_status_update_succeeded(status, session))
}

/// The shell's `PUT /parking/{id}` failed.
#[uniffi::export]
pub fn tracker_report_status_failed(status: ParkingStatus, message: String) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_status_update_failed(status, &message))
}

/// Result of a `PATCH /parking/{id}/landmarks/{landmarkId}`.
/// Pass `None` on success, the error message on failure.
#[uniffi::export]
pub fn tracker_report_landmark_achieved(landmark_id: i64, error: Option<String>) {
    with_tracker(|t| match error {
        None => t.on_landmark_update_succeeded(landmark_id),
        Some(message) => t.on_landmark_update_failed(landmark_id, &message),
    })
}

#[uniffi::export]
pub fn tracker_report_landmarks_saved(count: u32) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_landmarks_saved(count))
}

#[uniffi::export]
pub fn tracker_report_landmarks_save_failed(message: String) -> Vec<TrackerCommand> {
    with_tracker(|t| t.on_landmarks_save_failed(&message))
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test drives the singleton so parallel tests cannot interleave on it
    #[test]
    fn test_singleton_flow() {
        tracker_reset(None);
        assert_eq!(tracker_state(), TrackerState::Idle);
        assert_eq!(tracker_session_json(), "null");

        let commands = tracker_set_session_json(
            r#"{"parking_events_id": 5, "parking_latitude": 6.9271,
                "parking_longitude": 79.8612, "status": "active"}"#
                .to_string(),
        )
        .unwrap();
        assert!(commands.is_empty());

        let commands = tracker_start_navigation(1_000, None).unwrap();
        assert!(matches!(commands[0], TrackerCommand::UpdateStatus { .. }));
        assert!(tracker_is_navigating());

        // The retrieving PUT failing does not stop the walk
        assert!(tracker_report_status_failed(ParkingStatus::Retrieving, "offline".into()).is_empty());
        assert_eq!(tracker_state(), TrackerState::Navigating);

        let commands = tracker_on_position(PositionSample::new(6.9271, 79.8612, 9_000));
        assert!(commands.iter().any(|c| matches!(
            c,
            TrackerCommand::UpdateStatus { update, .. }
                if update.status == ParkingStatus::Retrieved
                    && update.final_screen_time == Some(8_000)
        )));
        assert_eq!(tracker_state(), TrackerState::Idle);

        tracker_set_session_json("{}".to_string()).unwrap();
        assert!(tracker_session().is_none());
    }

    #[test]
    fn test_ffi_estimates() {
        let car = GpsPoint::new(6.9271, 79.8612);
        assert_eq!(ffi_haversine_distance(car, car), 0.0);
        assert!(ffi_estimate_straight_line(car, car, None).is_none());
        assert_eq!(
            ffi_estimate_from_route(DirectionsRoute {
                duration_seconds: 59.0,
                distance_km: 0.05
            })
            .minutes,
            1
        );
    }
}
