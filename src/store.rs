//! Cached copy of the user's current parking session.
//!
//! Owned by whoever drives the tracker and passed around explicitly; there is
//! no global store.

use log::{error, info};

use crate::backend::SessionBackend;
use crate::error::NavigatorError;
use crate::session::ParkingSession;

/// Last session snapshot fetched from the backend.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    session: Option<ParkingSession>,
    is_loading: bool,
    last_error: Option<NavigatorError>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&ParkingSession> {
        self.session.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Error from the most recent fetch, if it failed.
    pub fn last_error(&self) -> Option<&NavigatorError> {
        self.last_error.as_ref()
    }

    /// True when a session exists. An empty backend answer is not a session.
    pub fn has_active_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn set(&mut self, session: Option<ParkingSession>) {
        self.session = session;
    }

    pub fn clear(&mut self) {
        self.session = None;
    }

    /// Fetch the latest active session. A failed fetch is logged and leaves
    /// the store empty.
    pub async fn refresh<B: SessionBackend + ?Sized>(&mut self, backend: &B) -> Option<ParkingSession> {
        self.is_loading = true;
        match backend.fetch_latest_active().await {
            Ok(session) => {
                info!(
                    "[SessionStore] Latest active session: {}",
                    session
                        .as_ref()
                        .map(|s| format!("{} ({})", s.parking_events_id, s.status))
                        .unwrap_or_else(|| "none".to_string())
                );
                self.session = session;
                self.last_error = None;
            }
            Err(e) => {
                error!("[SessionStore] Failed to fetch active parking session: {}", e);
                self.session = None;
                self.last_error = Some(e);
            }
        }
        self.is_loading = false;
        self.session.clone()
    }
}
