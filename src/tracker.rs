//! # Navigation Tracker
//!
//! Synchronous state machine behind "find my car". It consumes position
//! samples, focus changes and user actions, and answers with
//! [`TrackerCommand`]s describing the side effects to perform (remote status
//! updates, landmark achievement writes, location subscription changes, UI
//! notifications). It never performs I/O itself: the
//! [`Navigator`](crate::Navigator) or the mobile shell executes the commands
//! and reports each outcome back through the `on_*` methods.
//!
//! ## States
//!
//! ```text
//! Idle ──start_navigation──▶ Navigating ──arrival / cancel──▶ Idle
//!   │                          │    ▲
//!   └──begin_landmark_capture──┴────┴──save / abandon──▶ (previous state)
//!                      CapturingLandmarks
//! ```
//!
//! ## Guarantees
//!
//! - Arrival fires at most once per navigation run (latched).
//! - At most one terminal (`retrieved`/`expired`) request is in flight.
//! - Landmark achievement is optimistic: the local flag flips immediately and
//!   is reverted if the write fails, so the next sample retries it.
//! - Any open telemetry interval is closed before the terminal flush.

use std::collections::HashSet;
use std::fmt;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{LocationOptions, TrackerConfig};
use crate::error::{NavigatorError, OptionExt, Result};
use crate::geo_utils::haversine_distance;
use crate::location::PositionSample;
use crate::session::{NewLandmark, ParkingSession, ParkingStatus, StatusUpdate};
use crate::telemetry::{NavigationTelemetry, TelemetrySnapshot};
use crate::GpsPoint;

/// Generic message shown when a terminal status update fails.
pub const COMPLETION_FAILED_MESSAGE: &str = "Failed to update parking session.";

/// Client-side tracker state. Mirrors, but does not own, the session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackerState {
    Idle,
    Navigating,
    /// Landmarks are being placed; arrival and achievement checks are suspended
    CapturingLandmarks,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerState::Idle => f.write_str("idle"),
            TrackerState::Navigating => f.write_str("navigating"),
            TrackerState::CapturingLandmarks => f.write_str("capturing landmarks"),
        }
    }
}

/// User-facing notifications produced by the tracker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum NavigationEvent {
    NavigationStarted {
        session_id: i64,
    },
    Arrived {
        session_id: i64,
        distance_m: f64,
    },
    LandmarkAchieved {
        landmark_id: i64,
        location_name: String,
    },
    /// The backend acknowledged a terminal status
    Completed {
        status: ParkingStatus,
    },
    /// A terminal status update failed; local state is kept as attempted
    CompletionFailed {
        status: ParkingStatus,
        message: String,
    },
    LandmarksSaved {
        count: u32,
    },
    LandmarkSaveFailed {
        message: String,
    },
    /// The session disappeared or changed on the backend during navigation
    SessionEnded {
        session_id: i64,
    },
    /// Location updates could not be started
    LocationUnavailable {
        message: String,
    },
}

/// Side effects requested by the tracker.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackerCommand {
    /// `PUT /parking/{id}`
    UpdateStatus {
        session_id: i64,
        update: StatusUpdate,
    },
    /// `PATCH /parking/{id}/landmarks/{landmarkId}` with `is_achieved: true`
    MarkLandmarkAchieved {
        session_id: i64,
        landmark_id: i64,
    },
    /// `POST /parking/{id}/landmarks`
    SaveLandmarks {
        session_id: i64,
        landmarks: Vec<NewLandmark>,
    },
    /// `GET /parking/latest-active`, then report via `on_session_fetched`
    RefreshSession,
    StartLocationUpdates {
        options: LocationOptions,
    },
    StopLocationUpdates,
    Notify {
        event: NavigationEvent,
    },
}

impl TrackerCommand {
    fn notify(event: NavigationEvent) -> Self {
        TrackerCommand::Notify { event }
    }
}

/// The navigation state machine.
#[derive(Debug, Clone)]
pub struct NavigationTracker {
    config: TrackerConfig,
    state: TrackerState,
    /// State to return to when landmark capture ends
    capture_resume: TrackerState,
    session: Option<ParkingSession>,
    telemetry: NavigationTelemetry,
    focused: bool,
    arrival_handled: bool,
    terminal_in_flight: Option<ParkingStatus>,
    unconfirmed_terminal: Option<ParkingStatus>,
    pending_achievements: HashSet<i64>,
    staged_landmarks: Vec<NewLandmark>,
    saving_landmarks: bool,
    last_position: Option<PositionSample>,
}

impl Default for NavigationTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl NavigationTracker {
    /// Create a tracker. The screen is assumed to be in focus.
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            state: TrackerState::Idle,
            capture_resume: TrackerState::Idle,
            session: None,
            telemetry: NavigationTelemetry::new(),
            focused: true,
            arrival_handled: false,
            terminal_in_flight: None,
            unconfirmed_terminal: None,
            pending_achievements: HashSet::new(),
            staged_landmarks: Vec::new(),
            saving_landmarks: false,
            last_position: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn session(&self) -> Option<&ParkingSession> {
        self.session.as_ref()
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    pub fn last_position(&self) -> Option<&PositionSample> {
        self.last_position.as_ref()
    }

    pub fn staged_landmarks(&self) -> &[NewLandmark] {
        &self.staged_landmarks
    }

    pub fn is_saving_landmarks(&self) -> bool {
        self.saving_landmarks
    }

    pub fn terminal_in_flight(&self) -> Option<ParkingStatus> {
        self.terminal_in_flight
    }

    /// Terminal status the user requested but the backend never confirmed.
    pub fn unconfirmed_terminal(&self) -> Option<ParkingStatus> {
        self.unconfirmed_terminal
    }

    /// Telemetry of closed intervals so far.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// True while a walk back to the car is in progress, including while
    /// landmarks are being placed mid-walk.
    pub fn is_navigation_active(&self) -> bool {
        match self.state {
            TrackerState::Navigating => true,
            TrackerState::CapturingLandmarks => self.capture_resume == TrackerState::Navigating,
            TrackerState::Idle => false,
        }
    }

    fn invalid_state(&self, operation: &str) -> NavigatorError {
        NavigatorError::InvalidState {
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }

    // ========================================================================
    // Session reconciliation
    // ========================================================================

    /// Install a freshly fetched session (or `None` when the backend has none).
    ///
    /// The fetched copy is authoritative, except that landmarks whose
    /// achievement write is still in flight stay achieved. While walking, an
    /// `active` copy of the same session means the `retrieving` update has not
    /// landed yet; the walk continues. A missing, different or ended session
    /// stops it.
    pub fn on_session_fetched(&mut self, fetched: Option<ParkingSession>) -> Vec<TrackerCommand> {
        let mut commands = Vec::new();
        let previous_id = self.session.as_ref().map(|s| s.parking_events_id);

        let mut fetched = fetched.map(|mut session| {
            if Some(session.parking_events_id) == previous_id {
                for landmark in session.landmarks.iter_mut() {
                    if self.pending_achievements.contains(&landmark.landmarks_id) {
                        landmark.is_achieved = true;
                    }
                }
            }
            session
        });

        let same_session = fetched.as_ref().map(|s| s.parking_events_id) == previous_id;
        if !same_session {
            self.pending_achievements.clear();
        }

        if self.is_navigation_active() {
            let still_walking = same_session
                && fetched.as_ref().is_some_and(|s| !s.status.is_terminal());
            if still_walking {
                // `retrieving` not acknowledged yet: keep the optimistic status
                if let Some(session) = fetched.as_mut() {
                    if session.status == ParkingStatus::Active {
                        debug!(
                            "[Tracker] Session {} still active on the backend, keeping local 'retrieving'",
                            session.parking_events_id
                        );
                        session.status = ParkingStatus::Retrieving;
                    }
                }
            } else {
                if let Some(session_id) = previous_id {
                    warn!(
                        "[Tracker] Session {} ended on the backend during navigation",
                        session_id
                    );
                    commands.push(TrackerCommand::notify(NavigationEvent::SessionEnded {
                        session_id,
                    }));
                }
                self.leave_navigation();
                commands.insert(0, TrackerCommand::StopLocationUpdates);
            }
        }

        self.session = fetched;
        commands
    }

    fn leave_navigation(&mut self) {
        self.state = TrackerState::Idle;
        self.capture_resume = TrackerState::Idle;
        self.staged_landmarks.clear();
        self.saving_landmarks = false;
        self.telemetry.reset();
    }

    // ========================================================================
    // Navigation lifecycle
    // ========================================================================

    /// User pressed "find my car".
    ///
    /// Requests `retrieving` (unless the session is already there, e.g. after
    /// an app restart) and resets telemetry. The local copy moves to
    /// `retrieving` immediately; the walk does not wait for the backend.
    pub fn start_navigation(
        &mut self,
        now_ms: u64,
        estimated_minutes: Option<u32>,
    ) -> Result<Vec<TrackerCommand>> {
        if self.state != TrackerState::Idle {
            return Err(self.invalid_state("start navigation"));
        }
        if self.terminal_in_flight.is_some() {
            return Err(NavigatorError::TerminalUpdateInFlight);
        }
        let session = self.session.as_mut().ok_or_no_session()?;
        let session_id = session.parking_events_id;

        let mut commands = Vec::new();
        match session.status {
            ParkingStatus::Retrieving => {
                info!("[Tracker] Resuming navigation for session {}", session_id);
            }
            status => {
                session.status = status.transition_to(ParkingStatus::Retrieving)?;
                commands.push(TrackerCommand::UpdateStatus {
                    session_id,
                    update: StatusUpdate::retrieving(estimated_minutes),
                });
                info!("[Tracker] Navigation started for session {}", session_id);
            }
        }

        self.telemetry.reset();
        self.arrival_handled = false;
        self.unconfirmed_terminal = None;
        self.state = TrackerState::Navigating;

        if self.focused {
            self.telemetry.open_interval(now_ms);
            commands.push(TrackerCommand::StartLocationUpdates {
                options: self.config.location.clone(),
            });
        }
        commands.push(TrackerCommand::notify(NavigationEvent::NavigationStarted {
            session_id,
        }));
        Ok(commands)
    }

    /// User abandoned the walk. Requests `expired` with flushed telemetry.
    pub fn cancel_navigation(&mut self, now_ms: u64) -> Result<Vec<TrackerCommand>> {
        if !self.is_navigation_active() {
            return Err(self.invalid_state("cancel navigation"));
        }
        info!("[Tracker] Navigation cancelled");
        self.complete(ParkingStatus::Expired, now_ms)
    }

    /// End a session from `idle` without walking back (the "clear parking"
    /// action). Requests `expired`.
    pub fn clear_parking(&mut self, now_ms: u64) -> Result<Vec<TrackerCommand>> {
        if self.state != TrackerState::Idle {
            return Err(self.invalid_state("clear parking"));
        }
        if self.terminal_in_flight.is_some() {
            return Err(NavigatorError::TerminalUpdateInFlight);
        }
        // Counters belong to an earlier run, not this session
        self.telemetry.reset();
        self.complete(ParkingStatus::Expired, now_ms)
    }

    fn complete(&mut self, status: ParkingStatus, now_ms: u64) -> Result<Vec<TrackerCommand>> {
        if self.terminal_in_flight.is_some() {
            warn!("[Tracker] Ignoring duplicate '{}' request", status);
            return Err(NavigatorError::TerminalUpdateInFlight);
        }
        let session = self.session.as_mut().ok_or_no_session()?;
        session.status = session.status.transition_to(status)?;
        let session_id = session.parking_events_id;

        let snapshot = self.telemetry.flush(now_ms);
        let was_navigating = self.is_navigation_active();

        self.terminal_in_flight = Some(status);
        self.state = TrackerState::Idle;
        self.capture_resume = TrackerState::Idle;
        self.staged_landmarks.clear();

        info!(
            "[Tracker] Requesting '{}' for session {} (screen {} ms, {} map views)",
            status, session_id, snapshot.screen_time_ms, snapshot.map_view_count
        );

        let mut commands = Vec::new();
        if was_navigating {
            commands.push(TrackerCommand::StopLocationUpdates);
        }
        commands.push(TrackerCommand::UpdateStatus {
            session_id,
            update: StatusUpdate::terminal(status, snapshot.screen_time_ms, snapshot.map_view_count),
        });
        Ok(commands)
    }

    // ========================================================================
    // Position samples
    // ========================================================================

    /// Evaluate one position sample.
    ///
    /// Landmarks are checked before arrival so a landmark next to the car is
    /// still credited on the final sample.
    pub fn on_position(&mut self, sample: PositionSample) -> Vec<TrackerCommand> {
        if !sample.point().is_valid() {
            warn!(
                "[Tracker] Ignoring invalid sample ({}, {})",
                sample.latitude, sample.longitude
            );
            return Vec::new();
        }
        self.last_position = Some(sample);

        if self.state != TrackerState::Navigating || !self.focused {
            return Vec::new();
        }

        let mut commands = self.check_landmarks(&sample);

        let arrived = match self.session.as_ref() {
            Some(session) if !self.arrival_handled && session.status == ParkingStatus::Retrieving => {
                let distance = haversine_distance(&sample.point(), &session.parking_point());
                debug!("[Tracker] {:.1} m from the car", distance);
                (distance < self.config.arrival_radius_m).then_some((session.parking_events_id, distance))
            }
            _ => None,
        };

        if let Some((session_id, distance_m)) = arrived {
            self.arrival_handled = true;
            info!("[Tracker] Arrived at the car ({:.1} m)", distance_m);
            commands.push(TrackerCommand::notify(NavigationEvent::Arrived {
                session_id,
                distance_m,
            }));
            match self.complete(ParkingStatus::Retrieved, sample.timestamp_ms) {
                Ok(mut terminal) => commands.append(&mut terminal),
                Err(e) => warn!("[Tracker] Could not complete after arrival: {}", e),
            }
        }

        commands
    }

    fn check_landmarks(&mut self, sample: &PositionSample) -> Vec<TrackerCommand> {
        let mut commands = Vec::new();
        let Some(session) = self.session.as_mut() else {
            return commands;
        };
        if session.is_scored() {
            return commands;
        }
        let session_id = session.parking_events_id;
        let here: GpsPoint = sample.point();

        for landmark in session.landmarks.iter_mut().filter(|l| !l.is_achieved) {
            let Some(point) = landmark.point() else {
                continue;
            };
            let distance = haversine_distance(&here, &point);
            if distance < self.config.landmark_radius_m {
                landmark.is_achieved = true;
                self.pending_achievements.insert(landmark.landmarks_id);
                info!(
                    "[Tracker] Landmark {} '{}' achieved ({:.1} m)",
                    landmark.landmarks_id, landmark.location_name, distance
                );
                commands.push(TrackerCommand::MarkLandmarkAchieved {
                    session_id,
                    landmark_id: landmark.landmarks_id,
                });
                commands.push(TrackerCommand::notify(NavigationEvent::LandmarkAchieved {
                    landmark_id: landmark.landmarks_id,
                    location_name: landmark.location_name.clone(),
                }));
            }
        }
        commands
    }

    // ========================================================================
    // Focus / lifecycle
    // ========================================================================

    /// The map screen gained focus (or the app returned to the foreground).
    pub fn on_focus_gained(&mut self, now_ms: u64) -> Vec<TrackerCommand> {
        if self.focused {
            return Vec::new();
        }
        self.focused = true;
        if !self.is_navigation_active() {
            return Vec::new();
        }
        self.telemetry.focus_gained(now_ms);
        debug!(
            "[Tracker] Map refocused ({} views)",
            self.telemetry.snapshot().map_view_count
        );
        vec![TrackerCommand::StartLocationUpdates {
            options: self.config.location.clone(),
        }]
    }

    /// The map screen lost focus or the app was backgrounded. Closes the open
    /// telemetry interval and stops sampling.
    pub fn on_focus_lost(&mut self, now_ms: u64) -> Vec<TrackerCommand> {
        if !self.focused {
            return Vec::new();
        }
        self.focused = false;
        if !self.is_navigation_active() {
            return Vec::new();
        }
        self.telemetry.focus_lost(now_ms);
        vec![TrackerCommand::StopLocationUpdates]
    }

    // ========================================================================
    // Remote outcomes
    // ========================================================================

    /// The backend accepted a status update.
    pub fn on_status_update_succeeded(
        &mut self,
        status: ParkingStatus,
        updated: Option<ParkingSession>,
    ) -> Vec<TrackerCommand> {
        if status.is_terminal() {
            info!("[Tracker] Backend confirmed '{}'", status);
            self.terminal_in_flight = None;
            self.unconfirmed_terminal = None;
            return vec![
                TrackerCommand::notify(NavigationEvent::Completed { status }),
                TrackerCommand::RefreshSession,
            ];
        }
        // Only the status is taken from the PUT response; landmarks and the
        // rest come from the next latest-active fetch
        if let (Some(updated), Some(local)) = (updated, self.session.as_mut()) {
            if updated.parking_events_id == local.parking_events_id
                && !local.status.is_terminal()
                && local.status.can_transition_to(updated.status)
            {
                local.status = updated.status;
            }
        }
        Vec::new()
    }

    /// A status update failed.
    ///
    /// Failing to enter `retrieving` is ignored. A failed terminal update is
    /// surfaced, but the tracker stays idle.
    pub fn on_status_update_failed(
        &mut self,
        status: ParkingStatus,
        message: &str,
    ) -> Vec<TrackerCommand> {
        if !status.is_terminal() {
            warn!(
                "[Tracker] '{}' update failed, continuing with local estimate: {}",
                status, message
            );
            return Vec::new();
        }
        error!("[Tracker] '{}' update failed: {}", status, message);
        self.terminal_in_flight = None;
        self.unconfirmed_terminal = Some(status);
        vec![
            TrackerCommand::notify(NavigationEvent::CompletionFailed {
                status,
                message: COMPLETION_FAILED_MESSAGE.to_string(),
            }),
            TrackerCommand::RefreshSession,
        ]
    }

    pub fn on_landmark_update_succeeded(&mut self, landmark_id: i64) {
        self.pending_achievements.remove(&landmark_id);
    }

    /// Revert the optimistic flag so the next sample in range retries.
    pub fn on_landmark_update_failed(&mut self, landmark_id: i64, message: &str) {
        self.pending_achievements.remove(&landmark_id);
        if let Some(landmark) = self
            .session
            .as_mut()
            .and_then(|s| s.landmark_mut(landmark_id))
        {
            landmark.is_achieved = false;
        }
        warn!(
            "[Tracker] Landmark {} achievement not recorded: {}",
            landmark_id, message
        );
    }

    // ========================================================================
    // Landmark capture
    // ========================================================================

    /// Enter landmark capture from `idle` or `navigating`.
    pub fn begin_landmark_capture(&mut self) -> Result<()> {
        if self.state == TrackerState::CapturingLandmarks {
            return Err(self.invalid_state("add landmarks"));
        }
        let session = self.session.as_ref().ok_or_no_session()?;
        if session.status.is_terminal() {
            return Err(NavigatorError::NoActiveSession);
        }
        self.capture_resume = self.state;
        self.state = TrackerState::CapturingLandmarks;
        self.staged_landmarks.clear();
        info!("[Tracker] Landmark capture started");
        Ok(())
    }

    /// Stage a point as the next landmark.
    pub fn stage_landmark(&mut self, point: GpsPoint) -> Result<NewLandmark> {
        if self.state != TrackerState::CapturingLandmarks {
            return Err(self.invalid_state("add a landmark"));
        }
        if self.staged_landmarks.len() >= self.config.max_landmarks as usize {
            return Err(NavigatorError::LandmarkLimitReached {
                max: self.config.max_landmarks,
            });
        }
        let session = self.session.as_ref().ok_or_no_session()?;
        let distance = haversine_distance(&point, &session.parking_point());

        let landmark = NewLandmark {
            location_name: format!("Landmark {}", self.staged_landmarks.len() + 1),
            landmark_latitude: point.latitude,
            landmark_longitude: point.longitude,
            distance_from_parking: distance.round() as i64,
        };
        self.staged_landmarks.push(landmark.clone());
        Ok(landmark)
    }

    /// Request a batch save of the staged landmarks.
    pub fn save_staged_landmarks(&mut self) -> Result<Vec<TrackerCommand>> {
        if self.state != TrackerState::CapturingLandmarks {
            return Err(self.invalid_state("save landmarks"));
        }
        if self.saving_landmarks {
            return Err(NavigatorError::SaveInProgress);
        }
        if self.staged_landmarks.is_empty() {
            return Err(NavigatorError::NoLandmarksToSave);
        }
        let session_id = self.session.as_ref().ok_or_no_session()?.parking_events_id;
        self.saving_landmarks = true;
        info!(
            "[Tracker] Saving {} landmarks for session {}",
            self.staged_landmarks.len(),
            session_id
        );
        Ok(vec![TrackerCommand::SaveLandmarks {
            session_id,
            landmarks: self.staged_landmarks.clone(),
        }])
    }

    pub fn on_landmarks_saved(&mut self, count: u32) -> Vec<TrackerCommand> {
        self.saving_landmarks = false;
        self.staged_landmarks.clear();
        if self.state == TrackerState::CapturingLandmarks {
            self.state = self.capture_resume;
        }
        vec![
            TrackerCommand::notify(NavigationEvent::LandmarksSaved { count }),
            TrackerCommand::RefreshSession,
        ]
    }

    /// Staged landmarks are kept so the user can retry.
    pub fn on_landmarks_save_failed(&mut self, message: &str) -> Vec<TrackerCommand> {
        self.saving_landmarks = false;
        warn!("[Tracker] Saving landmarks failed: {}", message);
        vec![TrackerCommand::notify(NavigationEvent::LandmarkSaveFailed {
            message: message.to_string(),
        })]
    }

    /// Discard staged landmarks and return to the previous state.
    pub fn abandon_landmark_capture(&mut self) -> Result<()> {
        if self.state != TrackerState::CapturingLandmarks {
            return Err(self.invalid_state("abandon landmarks"));
        }
        if self.saving_landmarks {
            return Err(NavigatorError::SaveInProgress);
        }
        self.staged_landmarks.clear();
        self.state = self.capture_resume;
        info!("[Tracker] Landmark capture abandoned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::sample_session;

    const CAR: (f64, f64) = (6.9271, 79.8612);

    fn tracker_with(status: ParkingStatus) -> NavigationTracker {
        let mut tracker = NavigationTracker::default();
        tracker.on_session_fetched(Some(sample_session(status)));
        tracker
    }

    fn navigating() -> NavigationTracker {
        let mut tracker = tracker_with(ParkingStatus::Active);
        tracker.start_navigation(0, Some(3)).unwrap();
        tracker
    }

    fn at(lat: f64, lng: f64, t: u64) -> PositionSample {
        PositionSample::new(lat, lng, t)
    }

    fn terminal_updates(commands: &[TrackerCommand]) -> Vec<&StatusUpdate> {
        commands
            .iter()
            .filter_map(|c| match c {
                TrackerCommand::UpdateStatus { update, .. } if update.status.is_terminal() => {
                    Some(update)
                }
                _ => None,
            })
            .collect()
    }

    fn achieved_ids(commands: &[TrackerCommand]) -> Vec<i64> {
        commands
            .iter()
            .filter_map(|c| match c {
                TrackerCommand::MarkLandmarkAchieved { landmark_id, .. } => Some(*landmark_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_start_navigation_requests_retrieving() {
        let mut tracker = tracker_with(ParkingStatus::Active);
        let commands = tracker.start_navigation(0, Some(7)).unwrap();

        assert_eq!(tracker.state(), TrackerState::Navigating);
        assert_eq!(tracker.session().unwrap().status, ParkingStatus::Retrieving);
        assert_eq!(
            commands[0],
            TrackerCommand::UpdateStatus {
                session_id: 42,
                update: StatusUpdate::retrieving(Some(7)),
            }
        );
        assert!(commands
            .iter()
            .any(|c| matches!(c, TrackerCommand::StartLocationUpdates { .. })));
    }

    #[test]
    fn test_resume_navigation_skips_status_request() {
        let mut tracker = tracker_with(ParkingStatus::Retrieving);
        let commands = tracker.start_navigation(0, None).unwrap();
        assert!(!commands
            .iter()
            .any(|c| matches!(c, TrackerCommand::UpdateStatus { .. })));
        assert_eq!(tracker.state(), TrackerState::Navigating);
    }

    #[test]
    fn test_start_without_session_fails() {
        let mut tracker = NavigationTracker::default();
        assert_eq!(
            tracker.start_navigation(0, None),
            Err(NavigatorError::NoActiveSession)
        );
    }

    #[test]
    fn test_start_on_terminal_session_fails() {
        let mut tracker = tracker_with(ParkingStatus::Retrieved);
        assert!(matches!(
            tracker.start_navigation(0, None),
            Err(NavigatorError::InvalidTransition { .. })
        ));
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[test]
    fn test_arrival_fires_once() {
        let mut tracker = navigating();
        let mut terminal = 0;
        let mut arrivals = 0;
        for i in 0..5 {
            let commands = tracker.on_position(at(CAR.0 + 0.00001, CAR.1, 1000 * i));
            terminal += terminal_updates(&commands).len();
            arrivals += commands
                .iter()
                .filter(|c| {
                    matches!(
                        c,
                        TrackerCommand::Notify {
                            event: NavigationEvent::Arrived { .. }
                        }
                    )
                })
                .count();
        }
        assert_eq!(terminal, 1);
        assert_eq!(arrivals, 1);
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.terminal_in_flight(), Some(ParkingStatus::Retrieved));
    }

    #[test]
    fn test_no_arrival_outside_radius() {
        let mut tracker = navigating();
        // ~11 m north of the car
        let commands = tracker.on_position(at(CAR.0 + 0.0001, CAR.1, 1000));
        assert!(terminal_updates(&commands).is_empty());
        assert_eq!(tracker.state(), TrackerState::Navigating);
    }

    #[test]
    fn test_no_arrival_unless_retrieving() {
        let mut tracker = navigating();
        // Local copy forced back to active outside of any fetch
        tracker.session.as_mut().unwrap().status = ParkingStatus::Active;

        let commands = tracker.on_position(at(CAR.0, CAR.1, 1000));
        assert!(terminal_updates(&commands).is_empty());
    }

    #[test]
    fn test_unacknowledged_retrieving_keeps_walking() {
        let mut tracker = navigating();
        tracker.on_status_update_failed(ParkingStatus::Retrieving, "offline");

        // Backend never saw the PUT and still reports active
        let commands = tracker.on_session_fetched(Some(sample_session(ParkingStatus::Active)));
        assert!(commands.is_empty());
        assert_eq!(tracker.state(), TrackerState::Navigating);
        assert_eq!(tracker.session().unwrap().status, ParkingStatus::Retrieving);

        let commands = tracker.on_position(at(CAR.0, CAR.1, 1000));
        assert_eq!(terminal_updates(&commands).len(), 1);
    }

    #[test]
    fn test_terminal_on_backend_ends_walk() {
        let mut tracker = navigating();
        let commands = tracker.on_session_fetched(Some(sample_session(ParkingStatus::Expired)));
        assert_eq!(commands[0], TrackerCommand::StopLocationUpdates);
        assert!(commands.contains(&TrackerCommand::Notify {
            event: NavigationEvent::SessionEnded { session_id: 42 }
        }));
        assert_eq!(tracker.state(), TrackerState::Idle);
    }

    #[test]
    fn test_landmark_radius() {
        let mut tracker = navigating();
        let landmark = tracker.session().unwrap().landmarks[0].point().unwrap();
        // 19 m and 21 m from the sample, in opposite directions
        let meters_per_degree = 6_371_000.0_f64.to_radians();
        {
            let session = tracker.session.as_mut().unwrap();
            session.landmarks[1].landmark_latitude = Some(landmark.latitude + 40.0 / meters_per_degree);
        }
        let sample = at(landmark.latitude + 19.0 / meters_per_degree, landmark.longitude, 1000);

        let commands = tracker.on_position(sample);
        assert_eq!(achieved_ids(&commands), vec![1]);
        let session = tracker.session().unwrap();
        assert!(session.landmarks[0].is_achieved);
        assert!(!session.landmarks[1].is_achieved);
    }

    #[test]
    fn test_achieved_landmark_not_resubmitted() {
        let mut tracker = navigating();
        let landmark = tracker.session().unwrap().landmarks[0].point().unwrap();

        let first = tracker.on_position(at(landmark.latitude, landmark.longitude, 1000));
        assert_eq!(achieved_ids(&first), vec![1]);
        tracker.on_landmark_update_succeeded(1);

        for t in 2..6 {
            let again = tracker.on_position(at(landmark.latitude, landmark.longitude, t * 1000));
            assert!(achieved_ids(&again).is_empty());
        }
    }

    #[test]
    fn test_failed_achievement_is_retried() {
        let mut tracker = navigating();
        let landmark = tracker.session().unwrap().landmarks[0].point().unwrap();

        tracker.on_position(at(landmark.latitude, landmark.longitude, 1000));
        tracker.on_landmark_update_failed(1, "timeout");
        assert!(!tracker.session().unwrap().landmarks[0].is_achieved);

        let retry = tracker.on_position(at(landmark.latitude, landmark.longitude, 2000));
        assert_eq!(achieved_ids(&retry), vec![1]);
    }

    #[test]
    fn test_pending_achievement_survives_refetch() {
        let mut tracker = navigating();
        let landmark = tracker.session().unwrap().landmarks[0].point().unwrap();
        tracker.on_position(at(landmark.latitude, landmark.longitude, 1000));

        // Server has not applied the write yet
        tracker.on_session_fetched(Some(sample_session(ParkingStatus::Retrieving)));
        assert!(tracker.session().unwrap().landmarks[0].is_achieved);

        // Once confirmed, the server is authoritative again
        tracker.on_landmark_update_succeeded(1);
        tracker.on_session_fetched(Some(sample_session(ParkingStatus::Retrieving)));
        assert!(!tracker.session().unwrap().landmarks[0].is_achieved);
    }

    #[test]
    fn test_capture_suspends_checks() {
        let mut tracker = navigating();
        tracker.begin_landmark_capture().unwrap();
        assert!(tracker.is_navigation_active());

        let commands = tracker.on_position(at(CAR.0, CAR.1, 1000));
        assert!(commands.is_empty());
        assert_eq!(tracker.last_position().unwrap().timestamp_ms, 1000);

        tracker.abandon_landmark_capture().unwrap();
        assert_eq!(tracker.state(), TrackerState::Navigating);
        let commands = tracker.on_position(at(CAR.0, CAR.1, 2000));
        assert_eq!(terminal_updates(&commands).len(), 1);
    }

    #[test]
    fn test_stage_landmarks() {
        let mut tracker = tracker_with(ParkingStatus::Active);
        tracker.begin_landmark_capture().unwrap();

        let first = tracker.stage_landmark(GpsPoint::new(6.9280, 79.8612)).unwrap();
        assert_eq!(first.location_name, "Landmark 1");
        assert_eq!(first.distance_from_parking, 100);

        for _ in 0..3 {
            tracker.stage_landmark(GpsPoint::new(6.9275, 79.8615)).unwrap();
        }
        assert_eq!(tracker.staged_landmarks()[3].location_name, "Landmark 4");
        assert_eq!(
            tracker.stage_landmark(GpsPoint::new(6.9275, 79.8615)),
            Err(NavigatorError::LandmarkLimitReached { max: 4 })
        );
    }

    #[test]
    fn test_save_guard() {
        let mut tracker = tracker_with(ParkingStatus::Active);
        tracker.begin_landmark_capture().unwrap();
        assert_eq!(
            tracker.save_staged_landmarks(),
            Err(NavigatorError::NoLandmarksToSave)
        );

        tracker.stage_landmark(GpsPoint::new(6.9280, 79.8612)).unwrap();
        let commands = tracker.save_staged_landmarks().unwrap();
        assert!(matches!(
            &commands[0],
            TrackerCommand::SaveLandmarks { session_id: 42, landmarks } if landmarks.len() == 1
        ));
        assert_eq!(
            tracker.save_staged_landmarks(),
            Err(NavigatorError::SaveInProgress)
        );

        tracker.on_landmarks_save_failed("offline");
        assert_eq!(tracker.staged_landmarks().len(), 1);
        assert_eq!(tracker.state(), TrackerState::CapturingLandmarks);

        tracker.save_staged_landmarks().unwrap();
        let commands = tracker.on_landmarks_saved(1);
        assert!(commands.contains(&TrackerCommand::RefreshSession));
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert!(tracker.staged_landmarks().is_empty());
    }

    #[test]
    fn test_telemetry_flushed_with_open_interval() {
        let mut tracker = tracker_with(ParkingStatus::Active);
        tracker.on_focus_lost(0);
        tracker.start_navigation(0, None).unwrap();
        tracker.on_focus_gained(0);

        let commands = tracker.cancel_navigation(5000).unwrap();
        let update = terminal_updates(&commands)[0];
        assert_eq!(update.status, ParkingStatus::Expired);
        assert!(update.final_screen_time.unwrap() >= 5000);
        assert_eq!(update.final_map_view_count, Some(1));
    }

    #[test]
    fn test_focus_loss_stops_sampling() {
        let mut tracker = navigating();
        let commands = tracker.on_focus_lost(3000);
        assert_eq!(commands, vec![TrackerCommand::StopLocationUpdates]);

        // Stale sample delivered after focus loss is ignored
        assert!(tracker.on_position(at(CAR.0, CAR.1, 3500)).is_empty());

        let commands = tracker.on_focus_gained(10_000);
        assert!(matches!(
            commands[0],
            TrackerCommand::StartLocationUpdates { .. }
        ));
        let update = terminal_updates(&tracker.cancel_navigation(12_000).unwrap())[0].clone();
        assert_eq!(update.final_screen_time, Some(3000 + 2000));
        assert_eq!(update.final_map_view_count, Some(1));
    }

    #[test]
    fn test_duplicate_terminal_rejected() {
        let mut tracker = navigating();
        tracker.cancel_navigation(1000).unwrap();
        assert_eq!(
            tracker.clear_parking(1500),
            Err(NavigatorError::TerminalUpdateInFlight)
        );
    }

    #[test]
    fn test_terminal_failure_keeps_local_state() {
        let mut tracker = navigating();
        tracker.cancel_navigation(1000).unwrap();
        let commands = tracker.on_status_update_failed(ParkingStatus::Expired, "HTTP 500");

        assert_eq!(tracker.state(), TrackerState::Idle);
        assert_eq!(tracker.terminal_in_flight(), None);
        assert_eq!(tracker.unconfirmed_terminal(), Some(ParkingStatus::Expired));
        assert!(commands.contains(&TrackerCommand::RefreshSession));
        assert!(commands.iter().any(|c| matches!(
            c,
            TrackerCommand::Notify {
                event: NavigationEvent::CompletionFailed { .. }
            }
        )));
    }

    #[test]
    fn test_retrieving_failure_is_ignored() {
        let mut tracker = navigating();
        let commands = tracker.on_status_update_failed(ParkingStatus::Retrieving, "offline");
        assert!(commands.is_empty());
        assert_eq!(tracker.state(), TrackerState::Navigating);
    }

    #[test]
    fn test_clear_parking_from_idle() {
        let mut tracker = tracker_with(ParkingStatus::Active);
        let commands = tracker.clear_parking(100).unwrap();
        assert_eq!(
            commands,
            vec![TrackerCommand::UpdateStatus {
                session_id: 42,
                update: StatusUpdate::terminal(ParkingStatus::Expired, 0, 0),
            }]
        );
    }

    #[test]
    fn test_session_ended_elsewhere() {
        let mut tracker = navigating();
        let commands = tracker.on_session_fetched(None);
        assert_eq!(commands[0], TrackerCommand::StopLocationUpdates);
        assert_eq!(tracker.state(), TrackerState::Idle);
        assert!(tracker.session().is_none());
    }

    #[test]
    fn test_invalid_sample_ignored() {
        let mut tracker = navigating();
        assert!(tracker.on_position(at(f64::NAN, CAR.1, 1000)).is_empty());
        assert!(tracker.on_position(at(CAR.0, 200.0, 2000)).is_empty());
        assert!(tracker.last_position().is_none());
        assert_eq!(tracker.state(), TrackerState::Navigating);
    }

    #[test]
    fn test_status_response_keeps_local_landmarks() {
        let mut tracker = navigating();
        let mut response = sample_session(ParkingStatus::Retrieving);
        response.landmarks.clear();

        let commands = tracker.on_status_update_succeeded(ParkingStatus::Retrieving, Some(response));
        assert!(commands.is_empty());
        assert_eq!(tracker.session().unwrap().landmarks.len(), 2);
        assert_eq!(tracker.session().unwrap().status, ParkingStatus::Retrieving);

        // Landmark detection still works after the response
        let landmark = tracker.session().unwrap().landmarks[0].point().unwrap();
        let commands = tracker.on_position(at(landmark.latitude, landmark.longitude, 1000));
        assert_eq!(achieved_ids(&commands).len(), 1);
    }
}
