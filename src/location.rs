//! Location provider seam and scoped subscriptions.
//!
//! The platform location service is abstracted behind [`LocationProvider`].
//! A running subscription is owned by a [`TrackingGuard`], which unsubscribes
//! when dropped, so every exit path (normal stop, error, screen teardown)
//! releases it.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::LocationOptions;
use crate::error::Result;
use crate::GpsPoint;

/// One position fix from the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, when the platform reports it
    pub accuracy: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: u64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn point(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}

/// A live position subscription.
///
/// `unsubscribe` must be idempotent and must stop delivery immediately.
pub trait LocationSubscription: Send {
    fn unsubscribe(&mut self);
}

/// Source of periodic position samples.
///
/// Samples are delivered by the platform to the owner of the subscription
/// (e.g. [`Navigator::on_position`](crate::Navigator::on_position)); the
/// provider only controls starting and stopping delivery.
pub trait LocationProvider {
    fn subscribe(&self, options: &LocationOptions) -> Result<Box<dyn LocationSubscription>>;
}

/// Owns a subscription and releases it on drop.
pub struct TrackingGuard {
    subscription: Option<Box<dyn LocationSubscription>>,
}

impl TrackingGuard {
    /// Subscribe through `provider` and wrap the subscription.
    pub fn start<P: LocationProvider + ?Sized>(
        provider: &P,
        options: &LocationOptions,
    ) -> Result<Self> {
        let subscription = provider.subscribe(options)?;
        info!(
            "[Location] Subscribed (every {} ms / {} m)",
            options.min_interval_ms, options.min_distance_meters
        );
        Ok(Self {
            subscription: Some(subscription),
        })
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Release the subscription. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
            info!("[Location] Unsubscribed");
        } else {
            debug!("[Location] stop() on an already released guard");
        }
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for TrackingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingGuard")
            .field("active", &self.is_active())
            .finish()
    }
}
