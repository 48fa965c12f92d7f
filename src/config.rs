//! Tunable thresholds for tracking and estimation.
//!
//! Defaults match the values the backend's scoring was calibrated against.

use serde::{Deserialize, Serialize};

/// Accuracy tier requested from the platform location service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum AccuracyTier {
    Lowest,
    Low,
    Balanced,
    High,
    Highest,
}

/// Subscription options handed to the location provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationOptions {
    /// Minimum time between updates in milliseconds.
    /// Default: 5000
    pub min_interval_ms: u64,
    /// Minimum movement between updates in meters.
    /// Default: 10.0
    pub min_distance_meters: f64,
    /// Default: High
    pub accuracy: AccuracyTier,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 5000,
            min_distance_meters: 10.0,
            accuracy: AccuracyTier::High,
        }
    }
}

/// Configuration for the navigation tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackerConfig {
    /// Distance to the parking coordinate below which the user has arrived.
    /// Default: 10.0 meters
    pub arrival_radius_m: f64,

    /// Distance to a landmark below which it counts as achieved.
    /// Default: 20.0 meters
    pub landmark_radius_m: f64,

    /// Maximum landmarks that can be staged in one capture.
    /// Default: 4
    pub max_landmarks: u32,

    /// Location subscription options used while navigating.
    pub location: LocationOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            arrival_radius_m: 10.0,
            landmark_radius_m: 20.0,
            max_landmarks: 4,
            location: LocationOptions::default(),
        }
    }
}

/// Configuration for the straight-line walk estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct EstimatorConfig {
    /// Average walking speed.
    /// Default: 1.4 m/s
    pub walking_speed_mps: f64,

    /// Straight-line distances above this are not walkable; no estimate is shown.
    /// Default: 100_000.0 meters
    pub max_estimate_distance_m: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            walking_speed_mps: 1.4,
            max_estimate_distance_m: 100_000.0,
        }
    }
}
