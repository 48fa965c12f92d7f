//! # Park Navigator
//!
//! Walk-back navigation for a parking app: guides the user from wherever they
//! are back to their parked car and keeps the parking session on the backend
//! in step.
//!
//! This library provides:
//! - Arrival detection against the parked coordinate (latched, fires once)
//! - Landmark achievement tracking with optimistic, retryable writes
//! - Screen-time and map-view telemetry flushed with the terminal update
//! - Walk-time estimates from a directions service or straight-line distance
//!
//! ## Features
//!
//! - **`http`** - Enable the reqwest clients for the parking backend and directions
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use park_navigator::{
//!     NavigationTracker, ParkingSession, ParkingStatus, PositionSample, TrackerCommand,
//!     TrackerConfig,
//! };
//!
//! let session: ParkingSession = serde_json::from_value(serde_json::json!({
//!     "parking_events_id": 7,
//!     "parking_latitude": 6.9271,
//!     "parking_longitude": 79.8612,
//!     "status": "active"
//! }))
//! .unwrap();
//!
//! let mut tracker = NavigationTracker::new(TrackerConfig::default());
//! tracker.on_session_fetched(Some(session));
//! tracker.start_navigation(0, Some(3)).unwrap();
//! assert_eq!(tracker.session().unwrap().status, ParkingStatus::Retrieving);
//!
//! // A sample ~5 m from the car completes the walk
//! let commands = tracker.on_position(PositionSample::new(6.92714, 79.8612, 60_000));
//! assert!(commands.iter().any(|c| matches!(
//!     c,
//!     TrackerCommand::UpdateStatus { update, .. } if update.status == ParkingStatus::Retrieved
//! )));
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{NavigatorError, OptionExt, Result};

// Tunables (radii, location request, walking speed)
pub mod config;
pub use config::{AccuracyTier, EstimatorConfig, LocationOptions, TrackerConfig};

// Geographic utilities (haversine distance)
pub mod geo_utils;
pub use geo_utils::haversine_distance;

// Backend data model
pub mod session;
pub use session::{
    Landmark, NewLandmark, ParkingSession, ParkingStatus, Score, StatusUpdate,
};

// Screen-time and map-view counters
pub mod telemetry;
pub use telemetry::{NavigationTelemetry, TelemetrySnapshot};

// Location provider abstraction and subscription guard
pub mod location;
pub use location::{LocationProvider, LocationSubscription, PositionSample, TrackingGuard};

// Navigation state machine
pub mod tracker;
pub use tracker::{NavigationEvent, NavigationTracker, TrackerCommand, TrackerState};

// Walk-time estimates
pub mod estimator;
pub use estimator::{DirectionsRoute, EstimateSource, WalkEstimate};

// Remote collaborators (async traits)
pub mod backend;
pub use backend::{DirectionsService, SessionBackend};

// Cached session snapshot
pub mod store;
pub use store::SessionStore;

// Async driver wiring tracker, store, backend and location together
pub mod navigator;
pub use navigator::Navigator;

// HTTP clients for the parking backend and directions
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{BackendConfig, DirectionsConfig, GoogleDirectionsClient, ParkingApiClient};

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("ParkNavigator"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use park_navigator::GpsPoint;
/// let point = GpsPoint::new(6.9271, 79.8612); // Colombo
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(6.9271, 79.8612).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_gps_point_serde_shape() {
        let json = serde_json::to_value(GpsPoint::new(1.5, -2.25)).unwrap();
        assert_eq!(json, serde_json::json!({"latitude": 1.5, "longitude": -2.25}));
    }
}
