use facecam::testing::{SyntheticCamera, SyntheticMediaDevices};
use facecam::types::{keys, DeviceInfo, DeviceKind, Resolution};
use facecam::{
    CameraConstraints, CameraError, CameraSession, ConsoleService, FacecamConfig, MediaStream,
    MediaTrack, SettingValue,
};
use std::sync::Arc;

fn session(devices: &SyntheticMediaDevices) -> CameraSession<SyntheticMediaDevices> {
    CameraSession::new(devices.clone(), Arc::new(ConsoleService::new()))
}

#[tokio::test]
async fn test_list_cameras_skips_audio_devices() {
    let devices = SyntheticMediaDevices::default();
    devices.add_device(DeviceInfo {
        device_id: "mic-0".to_string(),
        group_id: String::new(),
        kind: DeviceKind::AudioInput,
        label: "Microphone".to_string(),
    });
    let session = session(&devices);

    let cameras = session.list_cameras().await.unwrap().unwrap();
    assert_eq!(cameras.len(), 1);
    assert_eq!(cameras[0].device_id, "cam-0");
}

#[tokio::test]
async fn test_default_request_is_user_facing_without_audio() {
    let devices = SyntheticMediaDevices::default();
    let mut session = session(&devices);
    session.start(None).await.unwrap();

    let request = &devices.requests()[0];
    assert!(!request.audio);
    assert_eq!(
        request.video.facing_mode.as_ref().and_then(|f| f.target()),
        Some("user")
    );
}

#[tokio::test]
async fn test_switch_requests_exact_device() {
    let devices = SyntheticMediaDevices::new(vec![
        SyntheticCamera::hd_webcam("cam-0"),
        SyntheticCamera::obsbot_tiny_4k("cam-1"),
    ]);
    let mut session = session(&devices);
    session.start(None).await.unwrap();

    assert!(session.switch("cam-1").await.unwrap());
    assert!(!session.switch("cam-1").await.unwrap());
    assert!(!session.switch("").await.unwrap());

    assert_eq!(session.constraints(), &CameraConstraints::for_device("cam-1"));
    assert_eq!(session.active_device_id().as_deref(), Some("cam-1"));
    assert_eq!(devices.streams_opened(), 2);
    assert_eq!(devices.live_track_count(), 1);
}

#[tokio::test]
async fn test_switch_to_missing_device_fails() {
    let devices = SyntheticMediaDevices::default();
    let mut session = session(&devices);
    session.start(None).await.unwrap();

    let err = session.switch("gone").await.unwrap_err();
    assert!(err.is_start_failure());
    assert_eq!(err.reason(), "Requested device not found");
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_stream_tracks_end_on_stop() {
    let devices = SyntheticMediaDevices::default();
    let mut session = session(&devices);
    let stream = session.start(None).await.unwrap();
    let track = stream.video_tracks().remove(0);

    session.stop(false);
    assert_eq!(track.state(), facecam::types::TrackState::Ended);
    assert!(stream.tracks().is_empty());
    assert_eq!(session.get_capabilities(), None);
}

#[tokio::test]
async fn test_apply_constraint_reaches_track() {
    let devices = SyntheticMediaDevices::default();
    let mut session = session(&devices);
    session.start(None).await.unwrap();

    session
        .apply_constraint("zoom", SettingValue::Number(3.0))
        .await
        .unwrap();
    assert_eq!(session.get_settings().unwrap().number("zoom"), Some(3.0));

    devices.set_read_only(true);
    let err = session
        .apply_constraint("zoom", SettingValue::Number(2.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CameraError::Unsupported(_)));
}

#[tokio::test]
async fn test_configured_session_negotiates_on_start() {
    let devices = SyntheticMediaDevices::single(SyntheticCamera::obsbot_tiny_4k("obsbot"));
    let config = FacecamConfig::default();
    let mut session =
        CameraSession::from_config(devices.clone(), &config, Arc::new(ConsoleService::new()));

    session.start(None).await.unwrap();
    let settings = session.get_settings().unwrap();
    assert_eq!(settings.resolution(), Some(Resolution::new(1920, 1080)));
    assert_eq!(settings.number(keys::FRAME_RATE), Some(30.0));
}

#[tokio::test]
async fn test_negotiation_can_be_disabled() {
    let devices = SyntheticMediaDevices::default();
    let mut config = FacecamConfig::default();
    config.camera.negotiate_on_start = false;
    let mut session =
        CameraSession::from_config(devices.clone(), &config, Arc::new(ConsoleService::new()));

    session.start(None).await.unwrap();
    assert!(devices.applied_constraints().is_empty());
}

#[tokio::test]
async fn test_strict_platform_rejects_unreachable_frame_rate() {
    let devices = SyntheticMediaDevices::default();
    devices.set_strict(true);
    let mut constraints = CameraConstraints::default();
    constraints.video.frame_rate = Some(facecam::types::NumberConstraint::Range(
        facecam::types::NumberRange {
            min: Some(120.0),
            ..Default::default()
        },
    ));
    let mut session = session(&devices);

    let err = session.start(Some(constraints)).await.unwrap_err();
    assert!(matches!(err, CameraError::CameraUnavailable(_)));
    assert!(!session.is_active());
}

#[tokio::test]
async fn test_session_drop_releases_camera() {
    let devices = SyntheticMediaDevices::default();
    {
        let mut session = session(&devices);
        session.start(None).await.unwrap();
        assert_eq!(devices.live_track_count(), 1);
    }
    assert_eq!(devices.live_track_count(), 0);
}
