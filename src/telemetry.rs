//! Navigation telemetry: on-screen time and map refocus count.
//!
//! Time is accumulated as closed `[focus gained, focus lost)` intervals.
//! [`NavigationTelemetry::flush`] closes any interval still open so the final
//! stretch before a terminal transition is never dropped.

use serde::{Deserialize, Serialize};

/// Values sent with a terminal status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TelemetrySnapshot {
    pub screen_time_ms: u64,
    pub map_view_count: u32,
}

/// Process-local counters for one navigation run.
#[derive(Debug, Clone, Default)]
pub struct NavigationTelemetry {
    accumulated_ms: u64,
    map_view_count: u32,
    open_since_ms: Option<u64>,
}

impl NavigationTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both counters and drop any open interval.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Start timing without counting a map view (navigation started on screen).
    pub fn open_interval(&mut self, now_ms: u64) {
        if self.open_since_ms.is_none() {
            self.open_since_ms = Some(now_ms);
        }
    }

    /// The map came back into focus during navigation.
    pub fn focus_gained(&mut self, now_ms: u64) {
        if self.open_since_ms.is_some() {
            return;
        }
        self.map_view_count = self.map_view_count.saturating_add(1);
        self.open_since_ms = Some(now_ms);
    }

    /// The map lost focus or the app went to the background.
    pub fn focus_lost(&mut self, now_ms: u64) {
        if let Some(start) = self.open_since_ms.take() {
            // Clock going backwards contributes nothing
            self.accumulated_ms = self
                .accumulated_ms
                .saturating_add(now_ms.saturating_sub(start));
        }
    }

    pub fn is_open(&self) -> bool {
        self.open_since_ms.is_some()
    }

    /// Close any open interval at `now_ms` and return the totals.
    ///
    /// Counters are left in place; call [`reset`](Self::reset) before the next run.
    pub fn flush(&mut self, now_ms: u64) -> TelemetrySnapshot {
        self.focus_lost(now_ms);
        self.snapshot()
    }

    /// Totals of closed intervals only.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            screen_time_ms: self.accumulated_ms,
            map_view_count: self.map_view_count,
        }
    }
}
