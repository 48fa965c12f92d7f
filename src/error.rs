//! Unified error handling for the park-navigator library.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Whether an error
//! reaches the user is decided by the caller: the navigator swallows some
//! (status update to `retrieving`, landmark achievement writes) and surfaces
//! others (terminal transitions, landmark batch saves).

use thiserror::Error;

use crate::session::ParkingStatus;

/// Unified error type for park-navigator operations.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum NavigatorError {
    /// No parking session is cached, or the backend reported none
    #[error("No active parking session")]
    NoActiveSession,

    /// Requested a status change that would move the session backwards
    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: ParkingStatus,
        to: ParkingStatus,
    },

    /// Operation not allowed in the tracker's current state
    #[error("Cannot {operation} while {state}")]
    InvalidState { operation: String, state: String },

    /// A `retrieved`/`expired` request for this session has not completed yet
    #[error("A terminal status update is already in flight")]
    TerminalUpdateInFlight,

    /// Tried to stage more landmarks than allowed per session
    #[error("You can only add up to {max} landmarks")]
    LandmarkLimitReached { max: u32 },

    /// Tried to save an empty landmark batch
    #[error("No landmarks to save")]
    NoLandmarksToSave,

    /// A landmark batch save is already running
    #[error("Already saving landmarks")]
    SaveInProgress,

    /// HTTP/API error
    #[error("HTTP error{}: {message}", status_suffix(.status_code))]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    /// Directions service returned no usable route
    #[error("Directions error: {message}")]
    Directions { message: String },

    /// Location provider failed to start or deliver updates
    #[error("Location error: {message}")]
    Location { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl NavigatorError {
    /// True for errors caused by the network or the remote service rather than
    /// by local state.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            NavigatorError::Http { .. }
                | NavigatorError::Decode { .. }
                | NavigatorError::Directions { .. }
        )
    }
}

fn status_suffix(status_code: &Option<u16>) -> String {
    match status_code {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    }
}

/// Result type alias for park-navigator operations.
pub type Result<T> = std::result::Result<T, NavigatorError>;

/// Extension trait for converting Option to NavigatorError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing-session error.
    fn ok_or_no_session(self) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_no_session(self) -> Result<T> {
        self.ok_or(NavigatorError::NoActiveSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NavigatorError::InvalidTransition {
            from: ParkingStatus::Retrieved,
            to: ParkingStatus::Retrieving,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition from 'retrieved' to 'retrieving'"
        );

        let err = NavigatorError::Http {
            message: "Internal Server Error".to_string(),
            status_code: Some(500),
        };
        assert_eq!(err.to_string(), "HTTP error (500): Internal Server Error");

        let err = NavigatorError::Http {
            message: "connection refused".to_string(),
            status_code: None,
        };
        assert_eq!(err.to_string(), "HTTP error: connection refused");
    }

    #[test]
    fn test_is_remote() {
        assert!(NavigatorError::Decode {
            message: "bad".to_string()
        }
        .is_remote());
        assert!(!NavigatorError::SaveInProgress.is_remote());
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        assert_eq!(none.ok_or_no_session(), Err(NavigatorError::NoActiveSession));
        assert_eq!(Some(3).ok_or_no_session(), Ok(3));
    }
}
