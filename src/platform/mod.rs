//! Platform capture seam.
//!
//! The engine talks to camera hardware only through these traits. A backend
//! provides device enumeration, capture requests, hot-plug notification and
//! live tracks whose capabilities and settings can be queried and constrained.
//!
//! Backends:
//! - [`crate::testing::SyntheticMediaDevices`]: simulated cameras, always available
//! - [`linux::V4l2MediaDevices`]: Video4Linux (feature `v4l2`, Linux only)

pub mod device_monitor;
#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub mod linux;

pub use device_monitor::{DeviceEvent, DeviceMonitor, DeviceScanner};

use crate::errors::CameraError;
use crate::types::{
    CameraConstraints, DeviceInfo, TrackCapabilities, TrackConstraints, TrackKind, TrackSettings,
    TrackState,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Which parts of the capture API the platform provides. Probed before use;
/// a missing API degrades features instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiSupport {
    pub user_media: bool,
    pub enumerate_devices: bool,
    pub supported_constraints: bool,
    pub device_change: bool,
}

impl ApiSupport {
    pub const fn full() -> Self {
        Self {
            user_media: true,
            enumerate_devices: true,
            supported_constraints: true,
            device_change: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            user_media: false,
            enumerate_devices: false,
            supported_constraints: false,
            device_change: false,
        }
    }
}

impl Default for ApiSupport {
    fn default() -> Self {
        Self::full()
    }
}

pub type DeviceChangeHandler = Arc<dyn Fn() + Send + Sync>;

/// Keeps a hot-plug handler registered. Dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(cancel: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Device access: enumeration, capture requests and hot-plug.
#[allow(async_fn_in_trait)]
pub trait MediaDevices {
    type Stream: MediaStream;

    fn api_support(&self) -> ApiSupport;

    /// Open a stream satisfying `constraints`. Fails with
    /// `PermissionDenied` or `CameraUnavailable`.
    async fn get_user_media(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Self::Stream, CameraError>;

    /// All media devices. Labels may be empty before permission is granted.
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;

    /// Constraint keys the platform understands, when it can say.
    fn supported_constraints(&self) -> Option<BTreeSet<String>>;

    /// Register a hot-plug handler; `None` if the platform cannot notify.
    fn on_device_change(&self, handler: DeviceChangeHandler) -> Option<Subscription>;
}

/// A live capture stream. Clones refer to the same stream.
pub trait MediaStream: Clone {
    type Track: MediaTrack;

    fn id(&self) -> String;

    /// Tracks still attached to the stream.
    fn tracks(&self) -> Vec<Self::Track>;

    fn video_tracks(&self) -> Vec<Self::Track> {
        self.tracks()
            .into_iter()
            .filter(|track| track.kind() == TrackKind::Video)
            .collect()
    }

    /// Stop every track and detach it; `tracks()` is empty afterwards.
    fn stop_tracks(&self);
}

/// One track of a stream. Clones refer to the same track.
#[allow(async_fn_in_trait)]
pub trait MediaTrack: Clone {
    fn id(&self) -> String;

    fn kind(&self) -> TrackKind;

    fn state(&self) -> TrackState;

    /// `None` when the platform cannot report capabilities for this track.
    fn get_capabilities(&self) -> Option<TrackCapabilities>;

    /// `None` when the platform cannot report settings for this track.
    fn get_settings(&self) -> Option<TrackSettings>;

    fn can_apply_constraints(&self) -> bool;

    /// Ask the hardware to honour `constraints`. Success does not mean every
    /// value was applied exactly; read `get_settings` for what happened.
    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError>;

    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_cancels_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_cancels_on_drop() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_api_support_defaults_to_full() {
        assert_eq!(ApiSupport::default(), ApiSupport::full());
        assert!(!ApiSupport::none().user_media);
    }
}
