use facecam::types::Resolution;
use facecam::{CameraError, FacecamConfig};
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_full_file_round_trips_through_toml() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("facecam.toml");

    let mut config = FacecamConfig::default();
    config.camera.facing_mode = "environment".to_string();
    config.camera.min_fps = 24.0;
    config.camera.fallback_resolutions = vec![Resolution::new(1280, 720)];
    config.console.max_entries = 0;
    config.save_to_file(&path).unwrap();

    let loaded = FacecamConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.console.capacity(), None);
    assert_eq!(loaded.camera.negotiation().min_fps, 24.0);
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("facecam.toml");
    fs::write(&path, "[camera\nmin_fps = ").unwrap();

    let err = FacecamConfig::load_from_file(&path).unwrap_err();
    assert!(matches!(err, CameraError::Config(_)));
}

// Environment overrides are process-wide, so every layered case lives in
// one test.
#[test]
fn test_layered_loading() {
    let dir = tempdir().unwrap();

    let missing = FacecamConfig::load_layered(dir.path().join("absent.toml")).unwrap();
    assert_eq!(missing, FacecamConfig::default());

    let path = dir.path().join("facecam.toml");
    fs::write(
        &path,
        r#"
[camera]
desired_fps = 60.0
min_fps = 24.0

[[camera.fallback_resolutions]]
width = 1280
height = 720
"#,
    )
    .unwrap();

    let from_file = FacecamConfig::load_layered(&path).unwrap();
    assert_eq!(from_file.camera.desired_fps, 60.0);
    assert_eq!(from_file.camera.min_fps, 24.0);
    assert_eq!(
        from_file.camera.fallback_resolutions,
        vec![Resolution::new(1280, 720)]
    );
    assert_eq!(from_file.controls.debounce(), Duration::from_millis(150));

    std::env::set_var("FACECAM__CONTROLS__DEBOUNCE_MS", "40");
    let overridden = FacecamConfig::load_layered(&path);
    std::env::remove_var("FACECAM__CONTROLS__DEBOUNCE_MS");
    let overridden = overridden.unwrap();
    assert_eq!(overridden.controls.debounce_ms, 40);
    assert_eq!(overridden.camera.desired_fps, 60.0);

    fs::write(&path, "[camera]\nfacing_mode = \"sideways\"\n").unwrap();
    let err = FacecamConfig::load_layered(&path).unwrap_err();
    assert_eq!(err, CameraError::Config("Unknown facing mode: sideways".to_string()));
}
