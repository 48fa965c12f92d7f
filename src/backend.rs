//! Remote collaborators: the parking session backend and the directions
//! service.
//!
//! Both are async traits so the navigator can be driven against the real
//! HTTP clients (feature `http`) or against in-memory fakes in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::estimator::DirectionsRoute;
use crate::session::{NewLandmark, ParkingSession, StatusUpdate};
use crate::GpsPoint;

/// The parking session REST backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// `GET /parking/latest-active`. `Ok(None)` when the user has no session.
    async fn fetch_latest_active(&self) -> Result<Option<ParkingSession>>;

    /// `PUT /parking/{id}`. Returns the updated session.
    async fn update_status(&self, session_id: i64, update: &StatusUpdate)
        -> Result<ParkingSession>;

    /// `POST /parking/{id}/landmarks`.
    async fn save_landmarks(&self, session_id: i64, landmarks: &[NewLandmark]) -> Result<()>;

    /// `PATCH /parking/{id}/landmarks/{landmarkId}` with `{"is_achieved": true}`.
    async fn mark_landmark_achieved(&self, session_id: i64, landmark_id: i64) -> Result<()>;
}

#[async_trait]
impl<T: SessionBackend + ?Sized> SessionBackend for Arc<T> {
    async fn fetch_latest_active(&self) -> Result<Option<ParkingSession>> {
        (**self).fetch_latest_active().await
    }

    async fn update_status(
        &self,
        session_id: i64,
        update: &StatusUpdate,
    ) -> Result<ParkingSession> {
        (**self).update_status(session_id, update).await
    }

    async fn save_landmarks(&self, session_id: i64, landmarks: &[NewLandmark]) -> Result<()> {
        (**self).save_landmarks(session_id, landmarks).await
    }

    async fn mark_landmark_achieved(&self, session_id: i64, landmark_id: i64) -> Result<()> {
        (**self).mark_landmark_achieved(session_id, landmark_id).await
    }
}

/// Walking directions between two points.
#[async_trait]
pub trait DirectionsService: Send + Sync {
    async fn walking_route(&self, origin: GpsPoint, destination: GpsPoint)
        -> Result<DirectionsRoute>;
}
