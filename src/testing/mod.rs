//! Testing utilities for facecam
//!
//! Simulated camera hardware and a headless settings view, so the whole
//! negotiation and sync pipeline runs offline without a camera attached.

pub mod synthetic;
pub mod view;

pub use synthetic::{
    synthetic_video_frame, CameraMode, SyntheticCamera, SyntheticMediaDevices, SyntheticStream,
    SyntheticTrack,
};
pub use view::{RecordingControl, RecordingSettingsView, RenderedControl, ViewSnapshot};
