//! Camera session: owns the active stream and serves capability, settings
//! and constraint requests against its video track.
//!
//! At most one stream is live at a time. Every start stops the previous
//! stream's tracks first, and a failed start leaves no stream behind.

use crate::config::FacecamConfig;
use crate::console::LogSink;
use crate::errors::CameraError;
use crate::negotiator::{ConstraintNegotiator, NegotiationConfig};
use crate::platform::{DeviceChangeHandler, MediaDevices, MediaStream, MediaTrack, Subscription};
use crate::types::{
    CameraConstraints, DeviceInfo, SettingValue, TrackCapabilities, TrackConstraints, TrackSettings,
};
use std::collections::BTreeSet;
use std::sync::Arc;

type TrackOf<D> = <<D as MediaDevices>::Stream as MediaStream>::Track;

pub struct CameraSession<D: MediaDevices> {
    devices: D,
    stream: Option<D::Stream>,
    constraints: CameraConstraints,
    negotiator: Option<ConstraintNegotiator>,
    logger: Arc<dyn LogSink>,
}

impl<D: MediaDevices> CameraSession<D> {
    pub fn new(devices: D, logger: Arc<dyn LogSink>) -> Self {
        Self {
            devices,
            stream: None,
            constraints: CameraConstraints::default(),
            negotiator: None,
            logger,
        }
    }

    /// Session configured from `[camera]`: default facing mode and, when
    /// enabled, negotiation after every start.
    pub fn from_config(devices: D, config: &FacecamConfig, logger: Arc<dyn LogSink>) -> Self {
        let mut session = Self::new(devices, logger)
            .with_constraints(CameraConstraints::facing(config.camera.facing_mode.clone()));
        if config.camera.negotiate_on_start {
            session = session.with_negotiation(config.camera.negotiation());
        }
        session
    }

    pub fn with_constraints(mut self, constraints: CameraConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Run the resolution / frame-rate negotiator on every new stream.
    pub fn with_negotiation(mut self, config: NegotiationConfig) -> Self {
        self.negotiator = Some(ConstraintNegotiator::new(config, self.logger.clone()));
        self
    }

    pub fn devices(&self) -> &D {
        &self.devices
    }

    pub fn constraints(&self) -> &CameraConstraints {
        &self.constraints
    }

    pub fn stream(&self) -> Option<&D::Stream> {
        self.stream.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Video inputs known to the platform. `Ok(None)` when the platform
    /// cannot enumerate devices at all.
    pub async fn list_cameras(&self) -> Result<Option<Vec<DeviceInfo>>, CameraError> {
        if !self.devices.api_support().enumerate_devices {
            return Ok(None);
        }
        match self.devices.enumerate_devices().await {
            Ok(devices) => Ok(Some(
                devices.into_iter().filter(DeviceInfo::is_video_input).collect(),
            )),
            Err(e) => {
                self.logger
                    .error(&format!("[Camera] Device enumeration failed: {}", e.reason()));
                Err(CameraError::EnumerationFailed(e.reason().to_string()))
            }
        }
    }

    /// Start capturing. `constraints`, when given, replace the stored ones
    /// for this and later starts.
    pub async fn start(
        &mut self,
        constraints: Option<CameraConstraints>,
    ) -> Result<D::Stream, CameraError> {
        if !self.devices.api_support().user_media {
            let message = "getUserMedia is not supported";
            self.logger.error(&format!("[Camera] {}", message));
            return Err(CameraError::CameraUnavailable(message.to_string()));
        }

        if let Some(constraints) = constraints {
            self.constraints = constraints;
        }
        self.stop(true);

        self.logger.info("[Camera] Requesting camera access.");
        let stream = match self.devices.get_user_media(&self.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                self.logger
                    .error(&format!("[Camera] Camera start failed: {}", e.reason()));
                return Err(e);
            }
        };

        self.logger.info("[Camera] Camera stream started.");
        self.stream = Some(stream.clone());

        if let (Some(negotiator), Some(track)) = (&self.negotiator, self.video_track()) {
            negotiator.negotiate(&track).await;
        }

        Ok(stream)
    }

    /// Stop every track of the active stream. A no-op without one.
    pub fn stop(&mut self, silent: bool) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        stream.stop_tracks();
        if !silent {
            self.logger.info("[Camera] Camera stream stopped.");
        }
    }

    /// Restart on `device_id`. Returns `Ok(false)` without touching the
    /// stream when the id is empty or already active.
    pub async fn switch(&mut self, device_id: &str) -> Result<bool, CameraError> {
        if device_id.is_empty() || self.is_active_device(device_id) {
            return Ok(false);
        }
        self.start(Some(CameraConstraints::for_device(device_id)))
            .await
            .map(|_| true)
    }

    pub fn is_active_device(&self, device_id: &str) -> bool {
        self.active_device_id().as_deref() == Some(device_id)
    }

    fn video_track(&self) -> Option<TrackOf<D>> {
        self.stream
            .as_ref()
            .and_then(|stream| stream.video_tracks().into_iter().next())
    }

    pub fn get_capabilities(&self) -> Option<TrackCapabilities> {
        self.video_track()?.get_capabilities()
    }

    pub fn get_settings(&self) -> Option<TrackSettings> {
        self.video_track()?.get_settings()
    }

    /// Device of the live track, falling back to the requested id when the
    /// platform does not report one.
    pub fn active_device_id(&self) -> Option<String> {
        let track = self.video_track()?;
        track
            .get_settings()
            .and_then(|settings| settings.device_id().map(str::to_string))
            .or_else(|| self.constraints.requested_device_id().map(str::to_string))
    }

    pub fn can_apply_constraints(&self) -> bool {
        self.video_track()
            .is_some_and(|track| track.can_apply_constraints())
    }

    pub fn supported_constraints(&self) -> Option<BTreeSet<String>> {
        if !self.devices.api_support().supported_constraints {
            return None;
        }
        self.devices.supported_constraints()
    }

    /// Apply `{key: value}` to the live track. Without one there is nothing
    /// to change and this succeeds.
    pub async fn apply_constraint(&self, key: &str, value: SettingValue) -> Result<(), CameraError> {
        let Some(track) = self.video_track() else {
            return Ok(());
        };
        if !track.can_apply_constraints() {
            return Err(CameraError::Unsupported(
                "track cannot apply constraints".to_string(),
            ));
        }
        track
            .apply_constraints(&TrackConstraints::single(key, value))
            .await
    }

    pub fn on_device_change(&self, handler: DeviceChangeHandler) -> Option<Subscription> {
        if !self.devices.api_support().device_change {
            return None;
        }
        self.devices.on_device_change(handler)
    }
}

impl<D: MediaDevices> Drop for CameraSession<D> {
    fn drop(&mut self) {
        self.stop(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleService;
    use crate::platform::ApiSupport;
    use crate::testing::{SyntheticCamera, SyntheticMediaDevices};
    use crate::types::TrackState;

    fn session(devices: &SyntheticMediaDevices) -> (CameraSession<SyntheticMediaDevices>, Arc<ConsoleService>) {
        let console = Arc::new(ConsoleService::new());
        (CameraSession::new(devices.clone(), console.clone()), console)
    }

    fn messages(console: &ConsoleService) -> Vec<String> {
        console.entries().into_iter().map(|e| e.message).collect()
    }

    #[tokio::test]
    async fn test_start_logs_and_exposes_track() {
        let devices = SyntheticMediaDevices::default();
        let (mut session, console) = session(&devices);

        session.start(None).await.unwrap();
        assert!(session.is_active());
        assert_eq!(session.active_device_id().as_deref(), Some("cam-0"));
        assert!(session.get_capabilities().is_some());
        assert_eq!(
            messages(&console),
            vec!["[Camera] Requesting camera access.", "[Camera] Camera stream started."]
        );
    }

    #[tokio::test]
    async fn test_restart_leaves_one_live_track() {
        let devices = SyntheticMediaDevices::default();
        let (mut session, _) = session(&devices);

        let first = session.start(None).await.unwrap();
        let first_track = first.video_tracks().remove(0);
        session.start(None).await.unwrap();
        session.start(None).await.unwrap();

        assert!(first.tracks().is_empty());
        assert_eq!(first_track.state(), TrackState::Ended);
        assert_eq!(devices.live_track_count(), 1);
        assert_eq!(devices.streams_opened(), 3);
    }

    #[tokio::test]
    async fn test_failed_start_leaves_no_stream() {
        let devices = SyntheticMediaDevices::default();
        let (mut session, console) = session(&devices);
        session.start(None).await.unwrap();

        devices.deny_permission();
        let err = session.start(None).await.unwrap_err();
        assert!(matches!(err, CameraError::PermissionDenied(_)));
        assert!(!session.is_active());
        assert_eq!(session.get_settings(), None);
        assert_eq!(devices.live_track_count(), 0);
        assert_eq!(
            messages(&console).last().map(String::as_str),
            Some("[Camera] Camera start failed: Permission denied")
        );
    }

    #[tokio::test]
    async fn test_start_without_user_media_support() {
        let devices = SyntheticMediaDevices::default();
        devices.set_api_support(ApiSupport::none());
        let (mut session, console) = session(&devices);

        let err = session.start(None).await.unwrap_err();
        assert_eq!(
            err,
            CameraError::CameraUnavailable("getUserMedia is not supported".to_string())
        );
        assert_eq!(devices.user_media_calls(), 0);
        assert_eq!(console.unread_counts().error, 1);
    }

    #[tokio::test]
    async fn test_switch_to_active_device_is_noop() {
        let devices = SyntheticMediaDevices::new(vec![
            SyntheticCamera::hd_webcam("front"),
            SyntheticCamera::obsbot_tiny_4k("usb"),
        ]);
        let (mut session, _) = session(&devices);
        session.start(None).await.unwrap();

        assert!(!session.switch("front").await.unwrap());
        assert!(!session.switch("").await.unwrap());
        assert_eq!(devices.user_media_calls(), 1);

        assert!(session.switch("usb").await.unwrap());
        assert_eq!(session.active_device_id().as_deref(), Some("usb"));
        assert_eq!(devices.live_track_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_logs_unless_silent() {
        let devices = SyntheticMediaDevices::default();
        let (mut session, console) = session(&devices);

        session.stop(false);
        assert!(messages(&console).is_empty());

        session.start(None).await.unwrap();
        session.stop(false);
        assert_eq!(
            messages(&console).last().map(String::as_str),
            Some("[Camera] Camera stream stopped.")
        );
        assert_eq!(devices.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_list_cameras_filters_and_reports_failures() {
        let devices = SyntheticMediaDevices::default();
        devices.add_device(crate::types::DeviceInfo {
            device_id: "mic".into(),
            group_id: String::new(),
            kind: crate::types::DeviceKind::AudioInput,
            label: "Mic".into(),
        });
        let (session, console) = session(&devices);

        let cameras = session.list_cameras().await.unwrap().unwrap();
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].device_id, "cam-0");

        devices.fail_enumeration(Some("busy"));
        let err = session.list_cameras().await.unwrap_err();
        assert_eq!(err, CameraError::EnumerationFailed("busy".to_string()));
        assert_eq!(console.unread_counts().error, 1);

        devices.set_api_support(ApiSupport {
            enumerate_devices: false,
            ..ApiSupport::full()
        });
        assert_eq!(session.list_cameras().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_apply_constraint_without_stream_is_ok() {
        let devices = SyntheticMediaDevices::default();
        let (session, _) = session(&devices);
        session
            .apply_constraint("zoom", SettingValue::Number(2.0))
            .await
            .unwrap();
        assert!(devices.applied_constraints().is_empty());
    }

    #[tokio::test]
    async fn test_negotiation_runs_after_start() {
        let devices = SyntheticMediaDevices::single(SyntheticCamera::obsbot_tiny_4k("obsbot"));
        let (session, _) = session(&devices);
        let mut session = session.with_negotiation(NegotiationConfig::default());

        session.start(None).await.unwrap();
        let settings = session.get_settings().unwrap();
        assert_eq!(settings.number("width"), Some(1920.0));
        assert_eq!(settings.frame_rate(), Some(30.0));
    }
}
