//! facecam: camera constraint negotiation and live settings sync
//!
//! Discovers cameras, opens a stream with resolution / frame-rate
//! negotiation, exposes the device's capability set as typed controls and
//! keeps those controls in step with what the hardware actually reports.
//!
//! # Features
//! - Capability-driven controls: sliders, selects and toggles derived from
//!   whatever the camera advertises
//! - Frame-rate aware negotiation with resolution fallbacks
//! - Serialized, debounced live sync of user edits
//! - Hot-plug aware camera picker
//! - In-app console log with read/unread tracking
//! - Video4Linux backend (`v4l2` feature) and a synthetic backend for tests
//!
//! # Usage
//! ```rust,no_run
//! use facecam::testing::{RecordingSettingsView, SyntheticMediaDevices};
//! use facecam::{channel, CameraSession, ConsoleService, FacecamConfig, SettingsSync};
//! use std::sync::Arc;
//!
//! # async fn demo() {
//! let config = FacecamConfig::default();
//! let console = Arc::new(ConsoleService::with_capacity(config.console.capacity()));
//! let session = CameraSession::from_config(SyntheticMediaDevices::default(), &config, console.clone());
//! let mut sync = SettingsSync::new(session, RecordingSettingsView::new(), console)
//!     .with_debounce(config.controls.debounce());
//!
//! let (handle, events) = channel();
//! sync.initialize().await;
//! handle.select_device("cam-0");
//! handle.shutdown();
//! sync.run(events).await;
//! # }
//! ```
pub mod config;
pub mod console;
pub mod controls;
pub mod errors;
pub mod face;
pub mod negotiator;
pub mod platform;
pub mod session;
pub mod sync;
pub mod types;
pub mod view;

// Testing utilities - synthetic hardware for offline testing
pub mod testing;

// Re-exports for convenience
pub use config::FacecamConfig;
pub use console::{ConsoleService, FacadeLogger, LogEntry, LogEvent, LogLevel, LogSink};
pub use controls::{build_controls, ControlDescriptor, ControlKind};
pub use errors::CameraError;
pub use negotiator::{ConstraintNegotiator, NegotiationConfig};
pub use platform::{ApiSupport, MediaDevices, MediaStream, MediaTrack, Subscription};
pub use session::CameraSession;
pub use sync::{channel, SettingsSync, SyncEvent, SyncHandle};
pub use types::{
    CameraConstraints, Capability, DeviceInfo, Resolution, SettingValue, TrackCapabilities,
    TrackConstraints, TrackSettings,
};
pub use view::{CameraOption, ControlHandle, SettingsView};

#[cfg(all(target_os = "linux", feature = "v4l2"))]
pub use platform::linux::V4l2MediaDevices;

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "facecam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        backends: available_backends(),
    }
}

/// Capture backends compiled into this build
pub fn available_backends() -> Vec<String> {
    #[allow(unused_mut)]
    let mut backends = vec!["synthetic".to_string()];
    #[cfg(all(target_os = "linux", feature = "v4l2"))]
    backends.push("v4l2".to_string());
    backends
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub backends: Vec<String>,
}
