//! # Navigator
//!
//! Async driver that owns a [`NavigationTracker`], a [`SessionStore`], the
//! session backend and the location provider. Every user action or platform
//! callback goes through the tracker. The navigator then runs the resulting
//! commands until none are left and returns the user-facing events.
//!
//! All methods take `&mut self`, so calls are serialized the same way the
//! app's UI thread serializes callbacks.
//!
//! Failure policy while executing commands:
//! - `retrieving` update fails: logged, navigation continues
//! - terminal update fails: [`NavigationEvent::CompletionFailed`], local state kept
//! - landmark achievement write fails: logged, retried on the next sample in range
//! - location subscription fails: [`NavigationEvent::LocationUnavailable`]

use std::collections::VecDeque;
use std::time::Instant;

use futures::future::join_all;
use log::{debug, info, warn};

use crate::backend::{DirectionsService, SessionBackend};
use crate::config::{EstimatorConfig, LocationOptions, TrackerConfig};
use crate::error::Result;
use crate::estimator::{estimate_walk, WalkEstimate};
use crate::location::{LocationProvider, PositionSample, TrackingGuard};
use crate::session::{NewLandmark, ParkingSession};
use crate::store::SessionStore;
use crate::tracker::{NavigationEvent, NavigationTracker, TrackerCommand, TrackerState};
use crate::GpsPoint;

/// Drives a [`NavigationTracker`] against real (or fake) collaborators.
pub struct Navigator<B, L>
where
    B: SessionBackend,
    L: LocationProvider,
{
    tracker: NavigationTracker,
    store: SessionStore,
    backend: B,
    location: L,
    guard: Option<TrackingGuard>,
    estimator_config: EstimatorConfig,
}

impl<B, L> Navigator<B, L>
where
    B: SessionBackend,
    L: LocationProvider,
{
    pub fn new(backend: B, location: L) -> Self {
        Self::with_config(
            backend,
            location,
            TrackerConfig::default(),
            EstimatorConfig::default(),
        )
    }

    pub fn with_config(
        backend: B,
        location: L,
        tracker_config: TrackerConfig,
        estimator_config: EstimatorConfig,
    ) -> Self {
        Self {
            tracker: NavigationTracker::new(tracker_config),
            store: SessionStore::new(),
            backend,
            location,
            guard: None,
            estimator_config,
        }
    }

    pub fn tracker(&self) -> &NavigationTracker {
        &self.tracker
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Session as the tracker sees it, including optimistic changes.
    pub fn session(&self) -> Option<&ParkingSession> {
        self.tracker.session()
    }

    pub fn state(&self) -> TrackerState {
        self.tracker.state()
    }

    /// True while a location subscription is held.
    pub fn is_tracking(&self) -> bool {
        self.guard.as_ref().is_some_and(|g| g.is_active())
    }

    // ========================================================================
    // User actions
    // ========================================================================

    /// Fetch the latest active session and hand it to the tracker.
    pub async fn refresh_session(&mut self) -> Vec<NavigationEvent> {
        self.run(vec![TrackerCommand::RefreshSession]).await
    }

    /// "Find my car": start walking back.
    pub async fn find_my_car(
        &mut self,
        now_ms: u64,
        estimated_minutes: Option<u32>,
    ) -> Result<Vec<NavigationEvent>> {
        let commands = self.tracker.start_navigation(now_ms, estimated_minutes)?;
        Ok(self.run(commands).await)
    }

    /// Abandon the walk (session becomes `expired`).
    pub async fn cancel_navigation(&mut self, now_ms: u64) -> Result<Vec<NavigationEvent>> {
        let commands = self.tracker.cancel_navigation(now_ms)?;
        Ok(self.run(commands).await)
    }

    /// End the session without walking back (session becomes `expired`).
    pub async fn clear_parking(&mut self, now_ms: u64) -> Result<Vec<NavigationEvent>> {
        let commands = self.tracker.clear_parking(now_ms)?;
        Ok(self.run(commands).await)
    }

    pub fn begin_landmark_capture(&mut self) -> Result<()> {
        self.tracker.begin_landmark_capture()
    }

    pub fn stage_landmark(&mut self, point: GpsPoint) -> Result<NewLandmark> {
        self.tracker.stage_landmark(point)
    }

    pub async fn save_landmarks(&mut self) -> Result<Vec<NavigationEvent>> {
        let commands = self.tracker.save_staged_landmarks()?;
        Ok(self.run(commands).await)
    }

    pub fn abandon_landmark_capture(&mut self) -> Result<()> {
        self.tracker.abandon_landmark_capture()
    }

    /// Walk estimate from the last known position to the car.
    pub async fn estimate_walk<D>(&self, directions: Option<&D>) -> Option<WalkEstimate>
    where
        D: DirectionsService + ?Sized,
    {
        let origin = self.tracker.last_position()?.point();
        let destination = self.tracker.session()?.parking_point();
        estimate_walk(directions, &origin, &destination, &self.estimator_config).await
    }

    // ========================================================================
    // Platform callbacks
    // ========================================================================

    /// A position sample from the location provider.
    ///
    /// Samples arriving without a live subscription are dropped.
    pub async fn on_position(&mut self, sample: PositionSample) -> Vec<NavigationEvent> {
        if !self.is_tracking() {
            debug!("[Navigator] Dropping sample delivered without a subscription");
            return Vec::new();
        }
        let commands = self.tracker.on_position(sample);
        self.run(commands).await
    }

    pub async fn on_focus_gained(&mut self, now_ms: u64) -> Vec<NavigationEvent> {
        let commands = self.tracker.on_focus_gained(now_ms);
        self.run(commands).await
    }

    /// Screen lost focus or app backgrounded: closes the telemetry interval
    /// and releases the subscription.
    pub async fn on_focus_lost(&mut self, now_ms: u64) -> Vec<NavigationEvent> {
        let commands = self.tracker.on_focus_lost(now_ms);
        self.run(commands).await
    }

    /// Release the location subscription regardless of tracker state.
    pub fn stop_tracking(&mut self) {
        if let Some(mut guard) = self.guard.take() {
            guard.stop();
        }
    }

    // ========================================================================
    // Command execution
    // ========================================================================

    async fn run(&mut self, commands: Vec<TrackerCommand>) -> Vec<NavigationEvent> {
        let mut queue: VecDeque<TrackerCommand> = commands.into();
        let mut events = Vec::new();

        while let Some(command) = queue.pop_front() {
            match command {
                TrackerCommand::Notify { event } => events.push(event),
                TrackerCommand::StartLocationUpdates { options } => {
                    if let Some(event) = self.start_location(&options) {
                        events.push(event);
                    }
                }
                TrackerCommand::StopLocationUpdates => self.stop_tracking(),
                TrackerCommand::UpdateStatus { session_id, update } => {
                    let start = Instant::now();
                    let result = self.backend.update_status(session_id, &update).await;
                    let follow_up = match result {
                        Ok(session) => {
                            info!(
                                "[Navigator] Session {} is now '{}' ({} ms)",
                                session_id,
                                update.status,
                                start.elapsed().as_millis()
                            );
                            self.tracker
                                .on_status_update_succeeded(update.status, Some(session))
                        }
                        Err(e) => self
                            .tracker
                            .on_status_update_failed(update.status, &e.to_string()),
                    };
                    queue.extend(follow_up);
                }
                TrackerCommand::MarkLandmarkAchieved {
                    session_id,
                    landmark_id,
                } => {
                    // Independent writes: send every queued one together
                    let mut batch = vec![(session_id, landmark_id)];
                    queue.retain(|c| match c {
                        TrackerCommand::MarkLandmarkAchieved {
                            session_id,
                            landmark_id,
                        } => {
                            batch.push((*session_id, *landmark_id));
                            false
                        }
                        _ => true,
                    });
                    self.mark_landmarks(batch).await;
                }
                TrackerCommand::SaveLandmarks {
                    session_id,
                    landmarks,
                } => {
                    let count = landmarks.len() as u32;
                    let follow_up = match self.backend.save_landmarks(session_id, &landmarks).await
                    {
                        Ok(()) => {
                            info!(
                                "[Navigator] Saved {} landmarks for session {}",
                                count, session_id
                            );
                            self.tracker.on_landmarks_saved(count)
                        }
                        Err(e) => self.tracker.on_landmarks_save_failed(&e.to_string()),
                    };
                    queue.extend(follow_up);
                }
                TrackerCommand::RefreshSession => {
                    let session = self.store.refresh(&self.backend).await;
                    queue.extend(self.tracker.on_session_fetched(session));
                }
            }
        }

        events
    }

    fn start_location(&mut self, options: &LocationOptions) -> Option<NavigationEvent> {
        if self.is_tracking() {
            return None;
        }
        match TrackingGuard::start(&self.location, options) {
            Ok(guard) => {
                self.guard = Some(guard);
                None
            }
            Err(e) => {
                warn!("[Navigator] Could not start location updates: {}", e);
                Some(NavigationEvent::LocationUnavailable {
                    message: e.to_string(),
                })
            }
        }
    }

    async fn mark_landmarks(&mut self, batch: Vec<(i64, i64)>) {
        let backend = &self.backend;
        let results = join_all(batch.iter().map(|(session_id, landmark_id)| {
            backend.mark_landmark_achieved(*session_id, *landmark_id)
        }))
        .await;

        for ((_, landmark_id), result) in batch.into_iter().zip(results) {
            match result {
                Ok(()) => self.tracker.on_landmark_update_succeeded(landmark_id),
                Err(e) => self
                    .tracker
                    .on_landmark_update_failed(landmark_id, &e.to_string()),
            }
        }
    }
}
