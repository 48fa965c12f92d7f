//! Parking session data model.
//!
//! These types mirror the backend's JSON exactly; field names and status
//! strings are a wire contract and must not be renamed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NavigatorError, Result};
use crate::GpsPoint;

/// Backend status of a parking session.
///
/// Moves forward only: `active → retrieving → {retrieved | expired}`, with
/// `active → expired` allowed when the user clears a spot without walking back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum ParkingStatus {
    Active,
    Retrieving,
    Retrieved,
    Expired,
}

impl ParkingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParkingStatus::Active => "active",
            ParkingStatus::Retrieving => "retrieving",
            ParkingStatus::Retrieved => "retrieved",
            ParkingStatus::Expired => "expired",
        }
    }

    /// `retrieved` and `expired` admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ParkingStatus::Retrieved | ParkingStatus::Expired)
    }

    pub fn can_transition_to(&self, next: ParkingStatus) -> bool {
        use ParkingStatus::*;
        matches!(
            (self, next),
            (Active, Retrieving) | (Active, Expired) | (Retrieving, Retrieved) | (Retrieving, Expired)
        )
    }

    /// Check a transition, returning `InvalidTransition` for backward or
    /// post-terminal moves.
    pub fn transition_to(&self, next: ParkingStatus) -> Result<ParkingStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(NavigatorError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for ParkingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-marked waypoint attached to a parking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Landmark {
    pub landmarks_id: i64,
    pub parking_events_id: i64,
    pub landmark_latitude: Option<f64>,
    pub landmark_longitude: Option<f64>,
    pub location_name: String,
    /// Meters from the parking coordinate, as recorded at capture time
    pub distance_from_parking: f64,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub is_achieved: bool,
    #[serde(default)]
    pub created_at: String,
}

impl Landmark {
    /// Coordinate of the landmark, if the backend recorded one.
    pub fn point(&self) -> Option<GpsPoint> {
        match (self.landmark_latitude, self.landmark_longitude) {
            (Some(lat), Some(lng)) => Some(GpsPoint::new(lat, lng)),
            _ => None,
        }
    }
}

/// Finalized recall score, attached by the backend once a session ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Score {
    pub scores_id: i64,
    pub parking_events_id: i64,
    pub time_factor: f64,
    pub landmark_factor: f64,
    pub path_performance: f64,
    pub assistance_points: f64,
    pub no_of_landmarks: u32,
    pub landmarks_recalled: u32,
    pub task_score: f64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub peek_penalty: Option<f64>,
    #[serde(default)]
    pub calculated_at: Option<String>,
}

/// One parking-and-retrieval episode as returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ParkingSession {
    pub parking_events_id: i64,
    #[serde(default)]
    pub user_id: i64,
    pub parking_latitude: f64,
    pub parking_longitude: f64,
    #[serde(default)]
    pub parking_location_name: String,
    #[serde(default)]
    pub parking_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub parking_type: String,
    #[serde(default)]
    pub level_floor: Option<String>,
    #[serde(default)]
    pub parking_slot: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub photo_s3_key: Option<String>,
    #[serde(default)]
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    pub status: ParkingStatus,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    #[serde(default)]
    pub score: Option<Score>,
}

impl ParkingSession {
    pub fn parking_point(&self) -> GpsPoint {
        GpsPoint::new(self.parking_latitude, self.parking_longitude)
    }

    pub fn landmark(&self, landmarks_id: i64) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.landmarks_id == landmarks_id)
    }

    pub fn landmark_mut(&mut self, landmarks_id: i64) -> Option<&mut Landmark> {
        self.landmarks
            .iter_mut()
            .find(|l| l.landmarks_id == landmarks_id)
    }

    /// Landmarks not yet achieved.
    pub fn pending_landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter().filter(|l| !l.is_achieved)
    }

    /// A session with a score attached is final and must not be modified.
    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }
}

/// Decode the `GET /parking/latest-active` body.
///
/// The backend answers `{}` when the user has no session.
pub fn parse_latest_active(body: serde_json::Value) -> Result<Option<ParkingSession>> {
    match &body {
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        serde_json::Value::Null => Ok(None),
        _ => serde_json::from_value(body)
            .map(Some)
            .map_err(|e| NavigatorError::Decode {
                message: e.to_string(),
            }),
    }
}

/// Body of `PUT /parking/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct StatusUpdate {
    pub status: ParkingStatus,
    /// Estimated walk in minutes, sent when navigation starts
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub estimated_time: Option<u32>,
    /// Milliseconds the map was on screen during navigation
    #[serde(
        rename = "finalScreenTime",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub final_screen_time: Option<u64>,
    /// Number of times the user brought the map back into focus
    #[serde(
        rename = "finalMapViewCount",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub final_map_view_count: Option<u32>,
}

impl StatusUpdate {
    pub fn retrieving(estimated_time: Option<u32>) -> Self {
        Self {
            status: ParkingStatus::Retrieving,
            estimated_time,
            final_screen_time: None,
            final_map_view_count: None,
        }
    }

    pub fn terminal(status: ParkingStatus, screen_time_ms: u64, map_view_count: u32) -> Self {
        Self {
            status,
            estimated_time: None,
            final_screen_time: Some(screen_time_ms),
            final_map_view_count: Some(map_view_count),
        }
    }
}

/// A landmark staged on the device and not yet saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct NewLandmark {
    pub location_name: String,
    pub landmark_latitude: f64,
    pub landmark_longitude: f64,
    /// Whole meters from the parking coordinate
    pub distance_from_parking: i64,
}

/// Body of `POST /parking/{id}/landmarks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkBatch {
    pub landmarks: Vec<NewLandmark>,
}

/// Body of `PATCH /parking/{id}/landmarks/{landmarkId}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AchievementUpdate {
    pub is_achieved: bool,
}

impl AchievementUpdate {
    pub fn achieved() -> Self {
        Self { is_achieved: true }
    }
}
