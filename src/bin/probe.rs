//! Open a Video4Linux camera, negotiate it and print what the settings
//! panel would show.
//!
//! Usage: facecam-probe [device_path] [--json] [--config <path>]

use anyhow::{bail, Context};
use facecam::platform::linux::scan_devices;
use facecam::{
    build_controls, CameraConstraints, CameraSession, FacadeLogger, FacecamConfig,
    V4l2MediaDevices,
};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    facecam::init_logging();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut device = None;
    let mut json = false;
    let mut config_path = FacecamConfig::default_path();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--json" => json = true,
            "--config" => {
                i += 1;
                let Some(path) = args.get(i) else {
                    bail!("--config needs a path");
                };
                config_path = path.into();
            }
            other if other.starts_with("--") => bail!("Unknown option: {}", other),
            other => device = Some(other.to_string()),
        }
        i += 1;
    }

    let config = FacecamConfig::load_layered(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let cameras = scan_devices().context("listing cameras")?;
    if cameras.is_empty() {
        bail!("No capture devices found");
    }
    if !json {
        println!("Cameras:");
        for camera in &cameras {
            println!("  {}  {}", camera.device_id, camera.label);
        }
    }

    let device_id = match device {
        Some(id) => id,
        None => cameras[0].device_id.clone(),
    };

    let mut session = CameraSession::from_config(
        V4l2MediaDevices::new(),
        &config,
        Arc::new(FacadeLogger),
    );
    session
        .start(Some(CameraConstraints::for_device(&device_id)))
        .await
        .with_context(|| format!("starting {}", device_id))?;

    let settings = session.get_settings().unwrap_or_default();
    let controls = match session.get_capabilities() {
        Some(capabilities) => build_controls(&capabilities, session.supported_constraints().as_ref()),
        None => Vec::new(),
    };

    if json {
        let report = serde_json::json!({
            "device": device_id,
            "settings": settings,
            "controls": controls,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\nSettings for {}:", device_id);
        for (key, value) in settings.iter() {
            println!("  {} = {}", key, value);
        }
        println!("\nControls:");
        for control in &controls {
            let current = settings
                .get(&control.key)
                .map_or_else(|| "-".to_string(), |v| v.to_string());
            println!("  {:<24} {}", control.label, current);
        }
    }

    session.stop(false);
    Ok(())
}
