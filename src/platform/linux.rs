//! Video4Linux capture backend.
//!
//! Devices are `/dev/video*` nodes that advertise video capture; the node
//! path is the device id. Frame size and interval enumeration provide the
//! width / height / frameRate capabilities, V4L2 controls provide the rest.
//! Hot-plug is detected by polling through [`DeviceMonitor`].

use super::{
    ApiSupport, DeviceChangeHandler, DeviceMonitor, DeviceScanner, MediaDevices, MediaStream,
    MediaTrack, Subscription,
};
use crate::errors::CameraError;
use crate::types::{
    keys, CameraConstraints, Capability, ConstraintValue, DeviceInfo, NumberConstraint,
    NumericRange, SettingValue, TrackCapabilities, TrackConstraints, TrackKind, TrackSettings,
    TrackState,
};
use std::collections::BTreeSet;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use v4l::capability::Flags as CapabilityFlags;
use v4l::control::{Description, Flags as ControlFlags, MenuItem, Type as ControlType, Value};
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Control, Device, Format, FourCC};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_error(path: &str, e: io::Error) -> CameraError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        CameraError::PermissionDenied(format!("{}: {}", path, e))
    } else {
        CameraError::CameraUnavailable(format!("{}: {}", path, e))
    }
}

/// Capture-capable V4L2 nodes. Nodes that cannot be opened are skipped.
pub fn scan_devices() -> Result<Vec<DeviceInfo>, CameraError> {
    let mut devices = Vec::new();
    for node in v4l::context::enum_devices() {
        let path = node.path().display().to_string();
        let device = match Device::with_path(node.path()) {
            Ok(device) => device,
            Err(e) => {
                log::debug!("Skipping {}: {}", path, e);
                continue;
            }
        };
        let caps = match device.query_caps() {
            Ok(caps) => caps,
            Err(e) => {
                log::debug!("Skipping {}: {}", path, e);
                continue;
            }
        };
        if !caps.capabilities.contains(CapabilityFlags::VIDEO_CAPTURE) {
            continue;
        }
        devices.push(DeviceInfo::video_input(path, caps.card.trim()).with_group(caps.bus));
    }
    devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
    Ok(devices)
}

pub struct V4l2MediaDevices {
    scanner: DeviceScanner,
    monitor: Arc<DeviceMonitor>,
    monitoring: Arc<Mutex<bool>>,
}

impl Default for V4l2MediaDevices {
    fn default() -> Self {
        Self::new()
    }
}

impl V4l2MediaDevices {
    pub fn new() -> Self {
        Self::with_poll_interval(DeviceMonitor::DEFAULT_INTERVAL)
    }

    pub fn with_poll_interval(interval: Duration) -> Self {
        Self::with_scanner(Arc::new(scan_devices), interval)
    }

    fn with_scanner(scanner: DeviceScanner, interval: Duration) -> Self {
        Self {
            monitor: Arc::new(DeviceMonitor::new(scanner.clone(), interval)),
            scanner,
            monitoring: Arc::new(Mutex::new(false)),
        }
    }

    /// Start hot-plug polling on the current tokio runtime, once. Returns
    /// false when no runtime is available or the device list cannot be read;
    /// the next call tries again.
    fn ensure_monitoring(&self) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!("No tokio runtime; hot-plug polling disabled");
            return false;
        };
        let mut started = lock(&self.monitoring);
        if *started {
            return true;
        }
        if let Err(e) = (self.scanner)() {
            log::warn!("Device monitoring unavailable: {}", e);
            return false;
        }

        *started = true;
        let monitor = self.monitor.clone();
        let monitoring = self.monitoring.clone();
        runtime.spawn(async move {
            if let Err(e) = monitor.start_monitoring().await {
                log::warn!("Device monitoring failed to start: {}", e);
                *lock(&monitoring) = false;
            }
        });
        true
    }
}

impl MediaDevices for V4l2MediaDevices {
    type Stream = V4l2Stream;

    fn api_support(&self) -> ApiSupport {
        ApiSupport::full()
    }

    async fn get_user_media(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<Self::Stream, CameraError> {
        let devices = scan_devices()?;
        let requested = constraints.video.device_id.as_ref();
        let info = match requested.and_then(|c| c.target()) {
            Some(id) => match devices.iter().find(|d| d.device_id == id) {
                Some(info) => info.clone(),
                None if requested.is_some_and(|c| c.is_exact()) => {
                    return Err(CameraError::CameraUnavailable(
                        "Requested device not found".to_string(),
                    ))
                }
                None => devices.first().cloned().ok_or_else(|| {
                    CameraError::CameraUnavailable("Requested device not found".to_string())
                })?,
            },
            // Capture nodes carry no facing information; any camera will do.
            None => devices.first().cloned().ok_or_else(|| {
                CameraError::CameraUnavailable("Requested device not found".to_string())
            })?,
        };

        let device = Device::with_path(&info.device_id).map_err(|e| open_error(&info.device_id, e))?;
        log::info!("Opened {} ({})", info.device_id, info.label);

        let track = V4l2Track {
            id: uuid::Uuid::new_v4().to_string(),
            inner: Arc::new(Mutex::new(TrackInner {
                device: Some(device),
                info,
            })),
        };

        let initial = without_keys(
            constraints.video.to_track_constraints(),
            &[keys::DEVICE_ID, keys::FACING_MODE],
        );
        if !initial.is_empty() {
            track
                .apply_constraints(&initial)
                .await
                .map_err(|e| CameraError::CameraUnavailable(e.reason().to_string()))?;
        }

        Ok(V4l2Stream {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: Arc::new(Mutex::new(vec![track])),
        })
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        scan_devices()
    }

    fn supported_constraints(&self) -> Option<BTreeSet<String>> {
        None
    }

    fn on_device_change(&self, handler: DeviceChangeHandler) -> Option<Subscription> {
        if !self.ensure_monitoring() {
            return None;
        }
        Some(self.monitor.subscribe(handler))
    }
}

fn without_keys(constraints: TrackConstraints, excluded: &[&str]) -> TrackConstraints {
    constraints
        .iter()
        .filter(|(key, _)| !excluded.contains(key))
        .fold(TrackConstraints::new(), |set, (key, value)| set.with(key, value.clone()))
}

#[derive(Clone)]
pub struct V4l2Stream {
    id: String,
    tracks: Arc<Mutex<Vec<V4l2Track>>>,
}

impl MediaStream for V4l2Stream {
    type Track = V4l2Track;

    fn id(&self) -> String {
        self.id.clone()
    }

    fn tracks(&self) -> Vec<Self::Track> {
        lock(&self.tracks).clone()
    }

    fn stop_tracks(&self) {
        let tracks: Vec<V4l2Track> = lock(&self.tracks).drain(..).collect();
        for track in tracks {
            track.stop();
        }
    }
}

struct TrackInner {
    /// `None` once stopped; dropping the device closes the node.
    device: Option<Device>,
    info: DeviceInfo,
}

#[derive(Clone)]
pub struct V4l2Track {
    id: String,
    inner: Arc<Mutex<TrackInner>>,
}

#[derive(Debug, Clone, Copy)]
struct Mode {
    width: u32,
    height: u32,
    max_fps: f64,
}

fn fps_of(numerator: u32, denominator: u32) -> Option<f64> {
    (numerator > 0).then(|| denominator as f64 / numerator as f64)
}

fn enumerate_modes(device: &Device, fourcc: FourCC) -> Vec<Mode> {
    let sizes = match device.enum_framesizes(fourcc) {
        Ok(sizes) => sizes,
        Err(e) => {
            log::debug!("Frame size enumeration failed: {}", e);
            return Vec::new();
        }
    };

    let mut dims = Vec::new();
    for size in sizes {
        match size.size {
            FrameSizeEnum::Discrete(d) => dims.push((d.width, d.height)),
            FrameSizeEnum::Stepwise(s) => {
                dims.push((s.min_width, s.min_height));
                dims.push((s.max_width, s.max_height));
            }
        }
    }

    dims.into_iter()
        .map(|(width, height)| {
            let max_fps = device
                .enum_frameintervals(fourcc, width, height)
                .unwrap_or_default()
                .into_iter()
                .filter_map(|interval| match interval.interval {
                    FrameIntervalEnum::Discrete(f) => fps_of(f.numerator, f.denominator),
                    FrameIntervalEnum::Stepwise(s) => fps_of(s.min.numerator, s.min.denominator),
                })
                .fold(0.0, f64::max);
            Mode {
                width,
                height,
                max_fps,
            }
        })
        .collect()
}

/// Capability key for a V4L2 control name.
fn control_key(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "zoom, absolute" => return "zoom".to_string(),
        "pan, absolute" => return "pan".to_string(),
        "tilt, absolute" => return "tilt".to_string(),
        "white balance temperature" => return "colorTemperature".to_string(),
        _ => {}
    }

    let mut key = String::new();
    for (i, word) in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let word = word.to_ascii_lowercase();
        if i == 0 {
            key.push_str(&word);
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                key.push(first.to_ascii_uppercase());
                key.push_str(chars.as_str());
            }
        }
    }
    key
}

fn menu_names(description: &Description) -> Vec<(u32, String)> {
    description
        .items
        .as_ref()
        .map(|items| {
            items
                .iter()
                .map(|(index, item)| {
                    let name = match item {
                        MenuItem::Name(name) => name.clone(),
                        MenuItem::Value(value) => value.to_string(),
                    };
                    (*index, name)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Writable controls with the capability each one maps to.
fn describe_controls(device: &Device) -> Vec<(String, Description, Capability)> {
    let descriptions = match device.query_controls() {
        Ok(descriptions) => descriptions,
        Err(e) => {
            log::debug!("Control query failed: {}", e);
            return Vec::new();
        }
    };

    descriptions
        .into_iter()
        .filter(|d| {
            !d.flags.intersects(
                ControlFlags::DISABLED | ControlFlags::READ_ONLY | ControlFlags::INACTIVE,
            )
        })
        .filter_map(|d| {
            let capability = match d.typ {
                ControlType::Integer | ControlType::Integer64 => Capability::Range(
                    NumericRange::new(d.minimum as f64, d.maximum as f64)
                        .with_step(d.step.max(1) as f64),
                ),
                ControlType::Boolean => Capability::Flag(d.default != 0),
                ControlType::Menu | ControlType::IntegerMenu => {
                    Capability::Options(menu_names(&d).into_iter().map(|(_, n)| n).collect())
                }
                _ => return None,
            };
            Some((control_key(&d.name), d, capability))
        })
        .collect()
}

impl TrackInner {
    fn device(&self) -> Result<&Device, CameraError> {
        self.device
            .as_ref()
            .ok_or_else(|| CameraError::CameraUnavailable("track has ended".to_string()))
    }

    fn capabilities(&self) -> Result<TrackCapabilities, CameraError> {
        let device = self.device()?;
        let format = device
            .format()
            .map_err(|e| CameraError::CameraUnavailable(e.to_string()))?;
        let modes = enumerate_modes(device, format.fourcc);

        let mut caps = TrackCapabilities::new()
            .with(keys::DEVICE_ID, Capability::Text(self.info.device_id.clone()))
            .with(keys::GROUP_ID, Capability::Text(self.info.group_id.clone()));

        if !modes.is_empty() {
            let span = |f: fn(&Mode) -> f64| {
                let values = modes.iter().map(f);
                let min = values.clone().fold(f64::INFINITY, f64::min);
                let max = values.fold(0.0, f64::max);
                NumericRange::new(min, max).with_step(1.0)
            };
            caps.insert(keys::WIDTH, Capability::Range(span(|m| m.width as f64)));
            caps.insert(keys::HEIGHT, Capability::Range(span(|m| m.height as f64)));
            let max_fps = modes.iter().map(|m| m.max_fps).fold(0.0, f64::max);
            if max_fps > 0.0 {
                caps.insert(keys::FRAME_RATE, Capability::Range(NumericRange::new(1.0, max_fps)));
            }
        }

        for (key, _, capability) in describe_controls(device) {
            caps.insert(key, capability);
        }
        Ok(caps)
    }

    fn settings(&self) -> Result<TrackSettings, CameraError> {
        let device = self.device()?;
        let format = device
            .format()
            .map_err(|e| CameraError::CameraUnavailable(e.to_string()))?;

        let mut settings = TrackSettings::new()
            .with(keys::DEVICE_ID, SettingValue::Text(self.info.device_id.clone()))
            .with(keys::GROUP_ID, SettingValue::Text(self.info.group_id.clone()))
            .with(keys::WIDTH, SettingValue::Number(format.width as f64))
            .with(keys::HEIGHT, SettingValue::Number(format.height as f64));

        if let Ok(params) = device.params() {
            if let Some(fps) = fps_of(params.interval.numerator, params.interval.denominator) {
                settings.insert(keys::FRAME_RATE, SettingValue::Number(fps));
            }
        }

        for (key, description, _) in describe_controls(device) {
            let Ok(control) = device.control(description.id) else {
                continue;
            };
            let value = match (description.typ, control.value) {
                (ControlType::Boolean, Value::Boolean(on)) => SettingValue::Flag(on),
                (ControlType::Boolean, Value::Integer(v)) => SettingValue::Flag(v != 0),
                (ControlType::Menu | ControlType::IntegerMenu, Value::Integer(v)) => {
                    match menu_names(&description).into_iter().find(|(i, _)| *i as i64 == v) {
                        Some((_, name)) => SettingValue::Text(name),
                        None => continue,
                    }
                }
                (_, Value::Integer(v)) => SettingValue::Number(v as f64),
                _ => continue,
            };
            settings.insert(key, value);
        }
        Ok(settings)
    }

    fn apply(&self, constraints: &TrackConstraints) -> Result<(), CameraError> {
        let device = self.device()?;
        let failed = |what: &str, e: io::Error| {
            CameraError::ConstraintFailed(format!("{}: {}", what, e))
        };

        let mut format = device.format().map_err(|e| failed("format", e))?;
        let modes = enumerate_modes(device, format.fourcc);

        let width = constraints.number(keys::WIDTH).map(NumberConstraint::range);
        let height = constraints.number(keys::HEIGHT).map(NumberConstraint::range);
        if width.is_some() || height.is_some() {
            let w = width.unwrap_or_default();
            let h = height.unwrap_or_default();
            let target_w = w.exact.or(w.ideal).unwrap_or(format.width as f64);
            let target_h = h.exact.or(h.ideal).unwrap_or(format.height as f64);
            let max_w = w.exact.or(w.max).unwrap_or(f64::INFINITY);
            let max_h = h.exact.or(h.max).unwrap_or(f64::INFINITY);

            let mode = modes
                .iter()
                .filter(|m| m.width as f64 <= max_w && m.height as f64 <= max_h)
                .min_by(|a, b| {
                    let da = (a.width as f64 - target_w).abs() + (a.height as f64 - target_h).abs();
                    let db = (b.width as f64 - target_w).abs() + (b.height as f64 - target_h).abs();
                    da.total_cmp(&db)
                })
                .ok_or_else(|| {
                    CameraError::ConstraintFailed(format!(
                        "no frame size fits {}x{}",
                        target_w, target_h
                    ))
                })?;
            format = device
                .set_format(&Format::new(mode.width, mode.height, format.fourcc))
                .map_err(|e| failed("set_format", e))?;
        }

        if let Some(fps) = constraints.number(keys::FRAME_RATE).map(NumberConstraint::range) {
            let mode_cap = modes
                .iter()
                .find(|m| m.width == format.width && m.height == format.height)
                .map_or(f64::INFINITY, |m| m.max_fps);
            let hi = fps.exact.or(fps.max).unwrap_or(f64::INFINITY).min(mode_cap);
            let lo = fps.exact.or(fps.min).unwrap_or(1.0);
            let target = fps.exact.or(fps.ideal).unwrap_or(hi);
            let rate = if lo > hi { hi } else { target.clamp(lo, hi) };
            if rate.is_finite() && rate >= 1.0 {
                device
                    .set_params(&Parameters::with_fps(rate.round() as u32))
                    .map_err(|e| failed("set_params", e))?;
            }
        }

        let controls = describe_controls(device);
        for (key, value) in constraints.iter() {
            if matches!(
                key,
                keys::WIDTH | keys::HEIGHT | keys::FRAME_RATE | keys::DEVICE_ID | keys::GROUP_ID
            ) {
                continue;
            }
            let Some((_, description, capability)) = controls.iter().find(|(k, _, _)| k == key)
            else {
                continue;
            };

            let raw = match (capability, value) {
                (Capability::Range(range), ConstraintValue::Number(c)) => match c.target() {
                    Some(v) => Value::Integer(range.clamp(v).round() as i64),
                    None => continue,
                },
                (Capability::Flag(_), ConstraintValue::Flag(on)) => Value::Boolean(*on),
                (Capability::Options(_), ConstraintValue::Text(c)) => {
                    let Some(choice) = c.target() else { continue };
                    match menu_names(description).into_iter().find(|(_, n)| n == choice) {
                        Some((index, _)) => Value::Integer(index as i64),
                        None => {
                            return Err(CameraError::ConstraintFailed(format!(
                                "{} does not support {}",
                                key, choice
                            )))
                        }
                    }
                }
                _ => {
                    return Err(CameraError::ConstraintFailed(format!(
                        "{} has the wrong type",
                        key
                    )))
                }
            };

            device
                .set_control(Control {
                    id: description.id,
                    value: raw,
                })
                .map_err(|e| failed(key, e))?;
        }

        Ok(())
    }
}

impl MediaTrack for V4l2Track {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn state(&self) -> TrackState {
        if lock(&self.inner).device.is_some() {
            TrackState::Live
        } else {
            TrackState::Ended
        }
    }

    fn get_capabilities(&self) -> Option<TrackCapabilities> {
        lock(&self.inner)
            .capabilities()
            .map_err(|e| log::debug!("Capabilities unavailable: {}", e))
            .ok()
    }

    fn get_settings(&self) -> Option<TrackSettings> {
        lock(&self.inner)
            .settings()
            .map_err(|e| log::debug!("Settings unavailable: {}", e))
            .ok()
    }

    fn can_apply_constraints(&self) -> bool {
        lock(&self.inner).device.is_some()
    }

    async fn apply_constraints(&self, constraints: &TrackConstraints) -> Result<(), CameraError> {
        lock(&self.inner).apply(constraints)
    }

    fn stop(&self) {
        let mut inner = lock(&self.inner);
        if inner.device.take().is_some() {
            log::info!("Closed {}", inner.info.device_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_control_keys_are_camel_case() {
        assert_eq!(control_key("Brightness"), "brightness");
        assert_eq!(control_key("Zoom, Absolute"), "zoom");
        assert_eq!(
            control_key("White Balance Temperature, Auto"),
            "whiteBalanceTemperatureAuto"
        );
        assert_eq!(control_key("White Balance Temperature"), "colorTemperature");
        assert_eq!(control_key("Power Line Frequency"), "powerLineFrequency");
    }

    #[test]
    fn test_fps_from_interval() {
        assert_eq!(fps_of(1, 30), Some(30.0));
        assert_eq!(fps_of(1001, 30000).map(|f| (f * 100.0).round()), Some(2997.0));
        assert_eq!(fps_of(0, 30), None);
    }

    #[tokio::test]
    async fn test_device_change_unsupported_until_scan_succeeds() {
        let readable = Arc::new(AtomicBool::new(false));
        let flag = readable.clone();
        let scanner: DeviceScanner = Arc::new(move || {
            if flag.load(Ordering::SeqCst) {
                Ok(vec![DeviceInfo::video_input("/dev/video0", "Webcam")])
            } else {
                Err(CameraError::EnumerationFailed("/dev unreadable".to_string()))
            }
        });
        let devices = V4l2MediaDevices::with_scanner(scanner, Duration::from_secs(60));

        assert!(devices.on_device_change(Arc::new(|| {})).is_none());
        assert!(!*lock(&devices.monitoring));

        readable.store(true, Ordering::SeqCst);
        assert!(devices.on_device_change(Arc::new(|| {})).is_some());
        assert!(*lock(&devices.monitoring));
    }

    #[test]
    fn test_without_keys_drops_selection_constraints() {
        let constraints = CameraConstraints::for_device("/dev/video0");
        let filtered = without_keys(constraints.video.to_track_constraints(), &[keys::DEVICE_ID]);
        assert!(filtered.is_empty());
    }
}
