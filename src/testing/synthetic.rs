//! Simulated capture hardware.
//!
//! `SyntheticMediaDevices` behaves like a capture platform with a set of
//! plugged-in cameras. Each camera has a list of native modes and a handful
//! of controls; tracks snap requested resolutions to the nearest mode and
//! cap the frame rate at what that mode can deliver, which is exactly the
//! "accepted but starved" behaviour real webcams show at their top
//! resolution. Test hooks inject failures, toggle API support and hot-plug
//! cameras; spies record every request.

use crate::errors::CameraError;
use crate::platform::{
    ApiSupport, DeviceChangeHandler, MediaDevices, MediaStream, MediaTrack, Subscription,
};
use crate::types::{
    keys, CameraConstraints, Capability, ConstraintValue, DeviceInfo, NumberConstraint,
    NumericRange, Resolution, SettingValue, TrackCapabilities, TrackConstraints, TrackKind,
    TrackSettings, TrackState,
};
use image::RgbImage;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// A native capture mode: resolution plus the fastest rate it sustains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMode {
    pub width: u32,
    pub height: u32,
    pub max_fps: f64,
}

impl CameraMode {
    pub const fn new(width: u32, height: u32, max_fps: f64) -> Self {
        Self {
            width,
            height,
            max_fps,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Profile of one simulated camera.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub info: DeviceInfo,
    pub modes: Vec<CameraMode>,
    pub min_resolution: Resolution,
    pub min_fps: f64,
    pub facing_modes: Vec<String>,
    /// Extra controls: key, capability, initial value.
    pub controls: Vec<(String, Capability, SettingValue)>,
}

impl SyntheticCamera {
    pub fn new(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            info: DeviceInfo::video_input(device_id, label),
            modes: vec![CameraMode::new(640, 480, 30.0)],
            min_resolution: Resolution::new(160, 120),
            min_fps: 1.0,
            facing_modes: vec!["user".to_string()],
            controls: Vec::new(),
        }
    }

    pub fn with_modes(mut self, modes: &[CameraMode]) -> Self {
        if !modes.is_empty() {
            self.modes = modes.to_vec();
        }
        self
    }

    pub fn with_facing_modes(mut self, modes: &[&str]) -> Self {
        self.facing_modes = modes.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_control(
        mut self,
        key: impl Into<String>,
        capability: Capability,
        initial: SettingValue,
    ) -> Self {
        self.controls.push((key.into(), capability, initial));
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.info.group_id = group_id.into();
        self
    }

    pub fn device_id(&self) -> &str {
        &self.info.device_id
    }

    /// Generic 1080p USB webcam.
    pub fn hd_webcam(device_id: impl Into<String>) -> Self {
        Self::new(device_id, "HD USB Camera")
            .with_modes(&[
                CameraMode::new(1920, 1080, 30.0),
                CameraMode::new(1280, 720, 30.0),
                CameraMode::new(640, 480, 30.0),
            ])
            .with_control(
                "brightness",
                Capability::Range(NumericRange::new(0.0, 255.0).with_step(1.0)),
                SettingValue::Number(128.0),
            )
            .with_control(
                "contrast",
                Capability::Range(NumericRange::new(0.0, 255.0).with_step(1.0)),
                SettingValue::Number(128.0),
            )
            .with_control(
                "whiteBalanceMode",
                Capability::Options(vec!["manual".into(), "continuous".into()]),
                SettingValue::Text("continuous".into()),
            )
            .with_control(
                "zoom",
                Capability::Range(NumericRange::new(1.0, 4.0).with_step(0.1)),
                SettingValue::Number(1.0),
            )
            .with_control("torch", Capability::Flag(false), SettingValue::Flag(false))
    }

    /// OBSBOT Tiny 4K: 4K is only delivered at 24 fps, 1080p at 30 and
    /// lower modes at 60.
    pub fn obsbot_tiny_4k(device_id: impl Into<String>) -> Self {
        Self::new(device_id, "OBSBOT Tiny 4K Camera")
            .with_modes(&[
                CameraMode::new(3840, 2160, 24.0),
                CameraMode::new(1920, 1080, 30.0),
                CameraMode::new(1280, 720, 60.0),
                CameraMode::new(640, 480, 60.0),
            ])
            .with_control(
                "zoom",
                Capability::Range(NumericRange::new(100.0, 400.0).with_step(1.0)),
                SettingValue::Number(100.0),
            )
            .with_control(
                "focusMode",
                Capability::Options(vec!["manual".into(), "continuous".into()]),
                SettingValue::Text("continuous".into()),
            )
            .with_control(
                "pan",
                Capability::Range(NumericRange::new(-468000.0, 468000.0).with_step(3600.0)),
                SettingValue::Number(0.0),
            )
            .with_control(
                "tilt",
                Capability::Range(NumericRange::new(-324000.0, 324000.0).with_step(3600.0)),
                SettingValue::Number(0.0),
            )
    }

    fn max_resolution(&self) -> Resolution {
        Resolution::new(
            self.modes.iter().map(|m| m.width).max().unwrap_or(0),
            self.modes.iter().map(|m| m.height).max().unwrap_or(0),
        )
    }

    fn max_fps(&self) -> f64 {
        self.modes.iter().map(|m| m.max_fps).fold(self.min_fps, f64::max)
    }

    /// Mode a freshly opened track starts in: the one closest to VGA.
    fn default_mode(&self) -> CameraMode {
        closest_mode(&self.modes, 640.0, 480.0).unwrap_or(CameraMode::new(640, 480, 30.0))
    }

    fn capabilities(&self) -> TrackCapabilities {
        let max = self.max_resolution();
        let mut caps = TrackCapabilities::new()
            .with(keys::DEVICE_ID, Capability::Text(self.info.device_id.clone()))
            .with(keys::GROUP_ID, Capability::Text(self.info.group_id.clone()))
            .with(
                keys::WIDTH,
                Capability::Range(
                    NumericRange::new(self.min_resolution.width as f64, max.width as f64)
                        .with_step(1.0),
                ),
            )
            .with(
                keys::HEIGHT,
                Capability::Range(
                    NumericRange::new(self.min_resolution.height as f64, max.height as f64)
                        .with_step(1.0),
                ),
            )
            .with(
                keys::FRAME_RATE,
                Capability::Range(NumericRange::new(self.min_fps, self.max_fps())),
            )
            .with(
                "resizeMode",
                Capability::Options(vec!["none".into(), "crop-and-scale".into()]),
            );
        if !self.facing_modes.is_empty() {
            caps.insert(keys::FACING_MODE, Capability::Options(self.facing_modes.clone()));
        }
        for (key, capability, _) in &self.controls {
            caps.insert(key.clone(), capability.clone());
        }
        caps
    }
}

fn closest_mode(modes: &[CameraMode], width: f64, height: f64) -> Option<CameraMode> {
    modes.iter().copied().min_by(|a, b| {
        let da = (a.width as f64 - width).abs() + (a.height as f64 - height).abs();
        let db = (b.width as f64 - width).abs() + (b.height as f64 - height).abs();
        da.total_cmp(&db).then(b.max_fps.total_cmp(&a.max_fps))
    })
}

/// Live hardware state behind one track.
#[derive(Debug, Clone)]
struct TrackHardware {
    camera: SyntheticCamera,
    state: TrackState,
    mode: CameraMode,
    frame_rate: f64,
    facing_mode: Option<String>,
    resize_mode: String,
    controls: BTreeMap<String, SettingValue>,
}

impl TrackHardware {
    fn open(camera: SyntheticCamera) -> Self {
        let mode = camera.default_mode();
        Self {
            frame_rate: mode.max_fps,
            mode,
            facing_mode: camera.facing_modes.first().cloned(),
            resize_mode: "none".to_string(),
            controls: camera
                .controls
                .iter()
                .map(|(key, _, initial)| (key.clone(), initial.clone()))
                .collect(),
            state: TrackState::Live,
            camera,
        }
    }

    fn settings(&self) -> TrackSettings {
        let mut settings = TrackSettings::new()
            .with(keys::DEVICE_ID, SettingValue::Text(self.camera.info.device_id.clone()))
            .with(keys::GROUP_ID, SettingValue::Text(self.camera.info.group_id.clone()))
            .with(keys::WIDTH, SettingValue::Number(self.mode.width as f64))
            .with(keys::HEIGHT, SettingValue::Number(self.mode.height as f64))
            .with(keys::FRAME_RATE, SettingValue::Number(self.frame_rate))
            .with("resizeMode", SettingValue::Text(self.resize_mode.clone()));
        if let Some(facing) = &self.facing_mode {
            settings.insert(keys::FACING_MODE, SettingValue::Text(facing.clone()));
        }
        for (key, value) in &self.controls {
            settings.insert(key.clone(), value.clone());
        }
        settings
    }

    /// State after honouring `constraints`, or the reason they cannot be met.
    /// Nothing changes unless the whole set resolves.
    fn resolve(&self, constraints: &TrackConstraints, strict: bool) -> Result<Self, CameraError> {
        let mut next = self.clone();

        let width = constraints.number(keys::WIDTH).map(NumberConstraint::range);
        let height = constraints.number(keys::HEIGHT).map(NumberConstraint::range);
        if width.is_some() || height.is_some() {
            let w = width.unwrap_or_default();
            let h = height.unwrap_or_default();
            let target_w = w.exact.or(w.ideal).unwrap_or(self.mode.width as f64);
            let target_h = h.exact.or(h.ideal).unwrap_or(self.mode.height as f64);
            let max_w = w.exact.or(w.max).unwrap_or(f64::INFINITY);
            let max_h = h.exact.or(h.max).unwrap_or(f64::INFINITY);
            let min_w = w.exact.or(w.min).unwrap_or(0.0);
            let min_h = h.exact.or(h.min).unwrap_or(0.0);

            let within_max: Vec<CameraMode> = self
                .camera
                .modes
                .iter()
                .copied()
                .filter(|m| m.width as f64 <= max_w && m.height as f64 <= max_h)
                .collect();
            let within_bounds: Vec<CameraMode> = within_max
                .iter()
                .copied()
                .filter(|m| m.width as f64 >= min_w && m.height as f64 >= min_h)
                .collect();

            let exact = w.exact.is_some() || h.exact.is_some();
            let candidates = if within_bounds.is_empty() && !(strict || exact) {
                within_max
            } else {
                within_bounds
            };
            next.mode = closest_mode(&candidates, target_w, target_h).ok_or_else(|| {
                CameraError::ConstraintFailed(format!(
                    "no mode satisfies {}x{}",
                    target_w, target_h
                ))
            })?;
        }

        let mode_cap = next.mode.max_fps;
        match constraints.number(keys::FRAME_RATE).map(NumberConstraint::range) {
            Some(r) => {
                let target = r.exact.or(r.ideal).unwrap_or(self.frame_rate);
                let hi = r.exact.or(r.max).unwrap_or(f64::INFINITY).min(mode_cap);
                let lo = r.exact.or(r.min).unwrap_or(0.0).max(self.camera.min_fps);
                if lo > hi {
                    if strict || r.exact.is_some() {
                        return Err(CameraError::ConstraintFailed(format!(
                            "frameRate {} not reachable at {}",
                            lo,
                            next.mode.resolution()
                        )));
                    }
                    next.frame_rate = hi;
                } else {
                    next.frame_rate = target.clamp(lo, hi);
                }
            }
            None => next.frame_rate = next.frame_rate.min(mode_cap),
        }

        for (key, value) in constraints.iter() {
            match key {
                keys::WIDTH | keys::HEIGHT | keys::FRAME_RATE => {}
                keys::DEVICE_ID => {
                    if let ConstraintValue::Text(c) = value {
                        if c.is_exact() && c.target() != Some(self.camera.device_id()) {
                            return Err(CameraError::ConstraintFailed(
                                "deviceId cannot change on a live track".to_string(),
                            ));
                        }
                    }
                }
                keys::FACING_MODE => {
                    if let ConstraintValue::Text(c) = value {
                        match c.target() {
                            Some(mode) if self.camera.facing_modes.iter().any(|m| m == mode) => {
                                next.facing_mode = Some(mode.to_string());
                            }
                            Some(mode) if c.is_exact() => {
                                return Err(CameraError::ConstraintFailed(format!(
                                    "facingMode {} not supported",
                                    mode
                                )));
                            }
                            _ => {}
                        }
                    }
                }
                "resizeMode" => {
                    if let ConstraintValue::Text(c) = value {
                        if let Some(mode) = c.target() {
                            next.resize_mode = mode.to_string();
                        }
                    }
                }
                _ => {
                    if let Some(resolved) = self.resolve_control(key, value)? {
                        next.controls.insert(key.to_string(), resolved);
                    }
                }
            }
        }

        Ok(next)
    }

    fn resolve_control(
        &self,
        key: &str,
        value: &ConstraintValue,
    ) -> Result<Option<SettingValue>, CameraError> {
        let Some((_, capability, _)) = self.camera.controls.iter().find(|(k, _, _)| k == key) else {
            // Unknown constraints are ignored, as capture platforms do.
            return Ok(None);
        };

        let mismatch = || CameraError::ConstraintFailed(format!("{} has the wrong type", key));
        match (capability, value) {
            (Capability::Range(range), ConstraintValue::Number(c)) => {
                let r = c.range();
                let Some(target) = r.exact.or(r.ideal) else {
                    return Ok(None);
                };
                if r.exact.is_some() && !range.contains(target) {
                    return Err(CameraError::ConstraintFailed(format!(
                        "{} {} outside [{}, {}]",
                        key, target, range.min, range.max
                    )));
                }
                Ok(Some(SettingValue::Number(snap(range, target))))
            }
            (Capability::Options(options), ConstraintValue::Text(c)) => match c.target() {
                Some(choice) if options.iter().any(|o| o == choice) => {
                    Ok(Some(SettingValue::Text(choice.to_string())))
                }
                Some(choice) => Err(CameraError::ConstraintFailed(format!(
                    "{} does not support {}",
                    key, choice
                ))),
                None => Ok(None),
            },
            (Capability::Flag(_), ConstraintValue::Flag(on)) => Ok(Some(SettingValue::Flag(*on))),
            (Capability::Text(_), _) => Ok(None),
            _ => Err(mismatch()),
        }
    }
}

/// Clamp to the range and round onto its step grid.
fn snap(range: &NumericRange, value: f64) -> f64 {
    let clamped = range.clamp(value);
    let snapped = match range.step.filter(|s| *s > 0.0) {
        Some(step) => range.clamp(range.min + ((clamped - range.min) / step).round() * step),
        None => clamped,
    };
    (snapped * 1e6).round() / 1e6
}

struct Hardware {
    cameras: Vec<SyntheticCamera>,
    other_devices: Vec<DeviceInfo>,
    support: ApiSupport,
    supported_constraints: Option<BTreeSet<String>>,
    permission_denied: bool,
    permission_granted: bool,
    enumerate_error: Option<String>,
    failing_keys: BTreeSet<String>,
    strict: bool,
    read_only: bool,
    introspection: bool,
    latency: Duration,
    handlers: Vec<(u64, DeviceChangeHandler)>,
    next_handler: u64,
    tracks: Vec<Arc<Mutex<TrackHardware>>>,
    requests: Vec<CameraConstraints>,
    applied: Vec<TrackConstraints>,
    streams_opened: usize,
}

impl Hardware {
    fn select_camera(&self, constraints: &CameraConstraints) -> Result<SyntheticCamera, CameraError> {
        let not_found = || CameraError::CameraUnavailable("Requested device not found".to_string());
        let video = &constraints.video;

        if let Some(requested) = &video.device_id {
            if let Some(id) = requested.target() {
                if let Some(camera) = self.cameras.iter().find(|c| c.device_id() == id) {
                    return Ok(camera.clone());
                }
                if requested.is_exact() {
                    return Err(not_found());
                }
            }
        }

        if let Some(facing) = &video.facing_mode {
            if let Some(mode) = facing.target() {
                if let Some(camera) = self
                    .cameras
                    .iter()
                    .find(|c| c.facing_modes.iter().any(|m| m == mode))
                {
                    return Ok(camera.clone());
                }
                if facing.is_exact() {
                    return Err(not_found());
                }
            }
        }

        self.cameras.first().cloned().ok_or_else(not_found)
    }

    fn default_supported_constraints(&self) -> BTreeSet<String> {
        let mut keys: BTreeSet<String> = [
            keys::DEVICE_ID,
            keys::GROUP_ID,
            keys::WIDTH,
            keys::HEIGHT,
            keys::FRAME_RATE,
            keys::FACING_MODE,
            "resizeMode",
            "aspectRatio",
        ]
        .into_iter()
        .map(str::to_string)
        .collect();
        for camera in &self.cameras {
            keys.extend(camera.controls.iter().map(|(key, _, _)| key.clone()));
        }
        keys
    }

    fn handlers(&self) -> Vec<DeviceChangeHandler> {
        self.handlers.iter().map(|(_, h)| h.clone()).collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated capture platform. Clones share the same hardware, so a test can
/// keep one handle for inspection while the session owns another.
#[derive(Clone)]
pub struct SyntheticMediaDevices {
    hardware: Arc<Mutex<Hardware>>,
}

impl Default for SyntheticMediaDevices {
    fn default() -> Self {
        Self::new(vec![SyntheticCamera::hd_webcam("cam-0")])
    }
}

impl SyntheticMediaDevices {
    pub fn new(cameras: Vec<SyntheticCamera>) -> Self {
        Self {
            hardware: Arc::new(Mutex::new(Hardware {
                cameras,
                other_devices: Vec::new(),
                support: ApiSupport::full(),
                supported_constraints: None,
                permission_denied: false,
                permission_granted: false,
                enumerate_error: None,
                failing_keys: BTreeSet::new(),
                strict: false,
                read_only: false,
                introspection: true,
                latency: Duration::ZERO,
                handlers: Vec::new(),
                next_handler: 0,
                tracks: Vec::new(),
                requests: Vec::new(),
                applied: Vec::new(),
                streams_opened: 0,
            })),
        }
    }

    pub fn single(camera: SyntheticCamera) -> Self {
        Self::new(vec![camera])
    }

    fn hardware(&self) -> MutexGuard<'_, Hardware> {
        lock(&self.hardware)
    }

    pub fn set_api_support(&self, support: ApiSupport) {
        self.hardware().support = support;
    }

    pub fn deny_permission(&self) {
        self.hardware().permission_denied = true;
    }

    /// Labels become visible, as after a successful capture request.
    pub fn grant_permission(&self) {
        let mut hw = self.hardware();
        hw.permission_denied = false;
        hw.permission_granted = true;
    }

    pub fn fail_enumeration(&self, reason: Option<&str>) {
        self.hardware().enumerate_error = reason.map(str::to_string);
    }

    /// Reject every `apply_constraints` call that mentions `key`.
    pub fn fail_constraint(&self, key: &str) {
        self.hardware().failing_keys.insert(key.to_string());
    }

    pub fn clear_constraint_failures(&self) {
        self.hardware().failing_keys.clear();
    }

    /// Treat `min` bounds as hard requirements instead of hints.
    pub fn set_strict(&self, strict: bool) {
        self.hardware().strict = strict;
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.hardware().read_only = read_only;
    }

    /// When off, tracks report neither capabilities nor settings.
    pub fn set_introspection(&self, enabled: bool) {
        self.hardware().introspection = enabled;
    }

    pub fn set_supported_constraints(&self, keys: Option<&[&str]>) {
        self.hardware().supported_constraints =
            keys.map(|keys| keys.iter().map(|k| k.to_string()).collect());
    }

    /// Delay every capture request and constraint application.
    pub fn set_latency(&self, latency: Duration) {
        self.hardware().latency = latency;
    }

    pub fn add_device(&self, device: DeviceInfo) {
        self.hardware().other_devices.push(device);
    }

    /// Plug in a camera and notify device-change handlers.
    pub fn connect(&self, camera: SyntheticCamera) {
        let handlers = {
            let mut hw = self.hardware();
            hw.cameras.push(camera);
            hw.handlers()
        };
        for handler in handlers {
            handler();
        }
    }

    /// Unplug a camera, ending its live tracks, and notify handlers.
    pub fn disconnect(&self, device_id: &str) {
        let handlers = {
            let mut hw = self.hardware();
            hw.cameras.retain(|c| c.device_id() != device_id);
            for track in &hw.tracks {
                let mut track = lock(track);
                if track.camera.device_id() == device_id {
                    track.state = TrackState::Ended;
                }
            }
            hw.handlers()
        };
        for handler in handlers {
            handler();
        }
    }

    pub fn user_media_calls(&self) -> usize {
        self.hardware().requests.len()
    }

    pub fn requests(&self) -> Vec<CameraConstraints> {
        self.hardware().requests.clone()
    }

    pub fn streams_opened(&self) -> usize {
        self.hardware().streams_opened
    }

    pub fn live_track_count(&self) -> usize {
        self.hardware()
            .tracks
            .iter()
            .filter(|t| lock(t).state == TrackState::Live)
            .count()
    }

    /// Every constraint set passed to `apply_constraints`, in call order.
    pub fn applied_constraints(&self) -> Vec<TrackConstraints> {
        self.hardware().applied.clone()
    }

    pub fn clear_applied(&self) {
        self.hardware().applied.clear();
    }

    pub fn device_change_listeners(&self) -> usize {
        self.hardware().handlers.len()
    }
}

impl MediaDevices for SyntheticMediaDevices {
    type Stream = SyntheticStream;

    fn api_support(&self) -> ApiSupport {
        self.hardware().support
    }

    async fn get_user_media(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Self::Stream, CameraError> {
        let latency = self.hardware().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut hw = self.hardware();
        hw.requests.push(constraints.clone());

        if !hw.support.user_media {
            return Err(CameraError::Unsupported("getUserMedia is not supported".to_string()));
        }
        if hw.permission_denied {
            return Err(CameraError::PermissionDenied("Permission denied".to_string()));
        }

        let camera = hw.select_camera(constraints)?;
        let opened = TrackHardware::open(camera);
        let resolved = opened
            .resolve(&constraints.video.to_track_constraints(), hw.strict)
            .map_err(|e| CameraError::CameraUnavailable(e.reason().to_string()))?;

        let inner = Arc::new(Mutex::new(resolved));
        hw.tracks.push(inner.clone());
        hw.permission_granted = true;
        hw.streams_opened += 1;

        let track = SyntheticTrack {
            id: uuid::Uuid::new_v4().to_string(),
            inner,
            hardware: self.hardware.clone(),
        };
        Ok(SyntheticStream {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: Arc::new(Mutex::new(vec![track])),
        })
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let hw = self.hardware();
        if !hw.support.enumerate_devices {
            return Err(CameraError::Unsupported("enumerateDevices is not supported".to_string()));
        }
        if let Some(reason) = &hw.enumerate_error {
            return Err(CameraError::EnumerationFailed(reason.clone()));
        }

        let mut devices: Vec<DeviceInfo> = hw
            .cameras
            .iter()
            .map(|camera| {
                let mut info = camera.info.clone();
                if !hw.permission_granted {
                    info.label.clear();
                }
                info
            })
            .collect();
        devices.extend(hw.other_devices.iter().cloned());
        Ok(devices)
    }

    fn supported_constraints(&self) -> Option<BTreeSet<String>> {
        let hw = self.hardware();
        if !hw.support.supported_constraints {
            return None;
        }
        Some(
            hw.supported_constraints
                .clone()
                .unwrap_or_else(|| hw.default_supported_constraints()),
        )
    }

    fn on_device_change(&self, handler: DeviceChangeHandler) -> Option<Subscription> {
        let mut hw = self.hardware();
        if !hw.support.device_change {
            return None;
        }
        hw.next_handler += 1;
        let id = hw.next_handler;
        hw.handlers.push((id, handler));

        let hardware: Weak<Mutex<Hardware>> = Arc::downgrade(&self.hardware);
        Some(Subscription::new(move || {
            if let Some(hardware) = hardware.upgrade() {
                lock(&hardware).handlers.retain(|(existing, _)| *existing != id);
            }
        }))
    }
}

/// Stream from [`SyntheticMediaDevices`].
#[derive(Clone)]
pub struct SyntheticStream {
    id: String,
    tracks: Arc<Mutex<Vec<SyntheticTrack>>>,
}

impl std::fmt::Debug for SyntheticStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyntheticStream").field("id", &self.id).finish_non_exhaustive()
    }
}

impl SyntheticStream {
    pub fn track_count(&self) -> usize {
        lock(&self.tracks).len()
    }
}

impl MediaStream for SyntheticStream {
    type Track = SyntheticTrack;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<Self::Track> {
        lock(&self.tracks).clone()
    }

    fn stop_tracks(&self) {
        let tracks: Vec<SyntheticTrack> = lock(&self.tracks).drain(..).collect();
        for track in tracks {
            track.stop();
        }
    }
}

/// Video track from [`SyntheticMediaDevices`].
#[derive(Clone)]
pub struct SyntheticTrack {
    id: String,
    inner: Arc<Mutex<TrackHardware>>,
    hardware: Arc<Mutex<Hardware>>,
}

impl SyntheticTrack {
    pub fn device_id(&self) -> String {
        lock(&self.inner).camera.info.device_id.clone()
    }
}

impl MediaTrack for SyntheticTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn state(&self) -> TrackState {
        lock(&self.inner).state
    }

    fn get_capabilities(&self) -> Option<TrackCapabilities> {
        if !lock(&self.hardware).introspection {
            return None;
        }
        Some(lock(&self.inner).camera.capabilities())
    }

    fn get_settings(&self) -> Option<TrackSettings> {
        if !lock(&self.hardware).introspection {
            return None;
        }
        Some(lock(&self.inner).settings())
    }

    fn can_apply_constraints(&self) -> bool {
        !lock(&self.hardware).read_only
    }

    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError> {
        let latency = lock(&self.hardware).latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut hw = lock(&self.hardware);
        hw.applied.push(constraints.clone());

        if hw.read_only {
            return Err(CameraError::Unsupported("applyConstraints is not supported".to_string()));
        }
        if let Some((key, _)) = constraints.iter().find(|(key, _)| hw.failing_keys.contains(*key)) {
            return Err(CameraError::ConstraintFailed(format!("{} rejected by device", key)));
        }

        let mut track = lock(&self.inner);
        if track.state == TrackState::Ended {
            return Err(CameraError::CameraUnavailable("track has ended".to_string()));
        }
        let next = track.resolve(constraints, hw.strict)?;
        *track = next;
        Ok(())
    }

    fn stop(&self) {
        lock(&self.inner).state = TrackState::Ended;
    }
}

/// Gradient test frame that changes with `frame_number`.
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> RgbImage {
    let base = (frame_number % 256) as u8;
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
        ])
    })
}
