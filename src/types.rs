//! Core data model: constraints, capabilities, settings and device descriptions.
//!
//! Serialized shapes follow the camelCase JSON used by capture platforms, so a
//! capability set or settings snapshot can be exchanged with a host UI as-is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known capability / constraint keys.
pub mod keys {
    pub const DEVICE_ID: &str = "deviceId";
    pub const GROUP_ID: &str = "groupId";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const FRAME_RATE: &str = "frameRate";
    pub const FACING_MODE: &str = "facingMode";
}

/// A width/height pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when both dimensions fit inside `bounds`.
    pub fn fits_within(&self, bounds: Resolution) -> bool {
        self.width <= bounds.width && self.height <= bounds.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// Constraints
// ---------------------------------------------------------------------------

/// Bounds for a numeric constraint. Unset members are unconstrained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NumberRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberConstraint {
    Value(f64),
    Range(NumberRange),
}

impl NumberConstraint {
    /// `{ideal: value, max: value}`: prefer `value`, never exceed it.
    pub fn ideal_max(value: f64) -> Self {
        NumberConstraint::Range(NumberRange {
            ideal: Some(value),
            max: Some(value),
            ..Default::default()
        })
    }

    /// The value a device should aim for, if the constraint names one.
    pub fn target(&self) -> Option<f64> {
        match self {
            NumberConstraint::Value(v) => Some(*v),
            NumberConstraint::Range(r) => r.exact.or(r.ideal),
        }
    }

    pub fn range(&self) -> NumberRange {
        match self {
            NumberConstraint::Value(v) => NumberRange {
                ideal: Some(*v),
                ..Default::default()
            },
            NumberConstraint::Range(r) => *r,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringConstraint {
    Value(String),
    Range(StringRange),
}

impl StringConstraint {
    pub fn exact(value: impl Into<String>) -> Self {
        StringConstraint::Range(StringRange {
            exact: Some(value.into()),
            ideal: None,
        })
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, StringConstraint::Range(StringRange { exact: Some(_), .. }))
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            StringConstraint::Value(v) => Some(v),
            StringConstraint::Range(r) => r.exact.as_deref().or(r.ideal.as_deref()),
        }
    }
}

/// One member of a [`TrackConstraints`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstraintValue {
    Flag(bool),
    Number(NumberConstraint),
    Text(StringConstraint),
}

impl From<SettingValue> for ConstraintValue {
    fn from(value: SettingValue) -> Self {
        match value {
            SettingValue::Number(v) => ConstraintValue::Number(NumberConstraint::Value(v)),
            SettingValue::Text(v) => ConstraintValue::Text(StringConstraint::Value(v)),
            SettingValue::Flag(v) => ConstraintValue::Flag(v),
        }
    }
}

/// The key → constraint map handed to a track's `apply_constraints`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackConstraints(BTreeMap<String, ConstraintValue>);

impl TrackConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding exactly `{key: value}`.
    pub fn single(key: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        Self::new().with(key, value)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConstraintValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConstraintValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<&NumberConstraint> {
        match self.0.get(key) {
            Some(ConstraintValue::Number(n)) => Some(n),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstraintValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<NumberConstraint> for ConstraintValue {
    fn from(value: NumberConstraint) -> Self {
        ConstraintValue::Number(value)
    }
}

impl From<StringConstraint> for ConstraintValue {
    fn from(value: StringConstraint) -> Self {
        ConstraintValue::Text(value)
    }
}

impl From<bool> for ConstraintValue {
    fn from(value: bool) -> Self {
        ConstraintValue::Flag(value)
    }
}

impl From<f64> for ConstraintValue {
    fn from(value: f64) -> Self {
        ConstraintValue::Number(NumberConstraint::Value(value))
    }
}

/// Video member of a capture request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<StringConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<NumberConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<NumberConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<NumberConstraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facing_mode: Option<StringConstraint>,
}

impl VideoConstraints {
    pub fn to_track_constraints(&self) -> TrackConstraints {
        let mut set = TrackConstraints::new();
        if let Some(v) = &self.device_id {
            set = set.with(keys::DEVICE_ID, v.clone());
        }
        if let Some(v) = self.width {
            set = set.with(keys::WIDTH, v);
        }
        if let Some(v) = self.height {
            set = set.with(keys::HEIGHT, v);
        }
        if let Some(v) = self.frame_rate {
            set = set.with(keys::FRAME_RATE, v);
        }
        if let Some(v) = &self.facing_mode {
            set = set.with(keys::FACING_MODE, v.clone());
        }
        set
    }
}

/// A capture request. Audio is never requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConstraints {
    pub video: VideoConstraints,
    #[serde(default)]
    pub audio: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self::facing("user")
    }
}

impl CameraConstraints {
    /// `{ video: { facingMode }, audio: false }`
    pub fn facing(mode: impl Into<String>) -> Self {
        Self {
            video: VideoConstraints {
                facing_mode: Some(StringConstraint::Value(mode.into())),
                ..Default::default()
            },
            audio: false,
        }
    }

    /// `{ video: { deviceId: { exact } }, audio: false }`
    pub fn for_device(device_id: impl Into<String>) -> Self {
        Self {
            video: VideoConstraints {
                device_id: Some(StringConstraint::exact(device_id)),
                ..Default::default()
            },
            audio: false,
        }
    }

    pub fn requested_device_id(&self) -> Option<&str> {
        self.video.device_id.as_ref().and_then(|c| c.target())
    }
}

// ---------------------------------------------------------------------------
// Capabilities and settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            step: None,
        }
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Hardware description of one controllable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Capability {
    Flag(bool),
    Range(NumericRange),
    Options(Vec<String>),
    Text(String),
}

/// Per-property capability snapshot of a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackCapabilities(BTreeMap<String, Capability>);

impl TrackCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, capability: Capability) -> Self {
        self.0.insert(key.into(), capability);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, capability: Capability) {
        self.0.insert(key.into(), capability);
    }

    pub fn get(&self, key: &str) -> Option<&Capability> {
        self.0.get(key)
    }

    pub fn range(&self, key: &str) -> Option<&NumericRange> {
        match self.0.get(key) {
            Some(Capability::Range(r)) => Some(r),
            _ => None,
        }
    }

    pub fn max_resolution(&self) -> Option<Resolution> {
        let width = self.range(keys::WIDTH)?.max;
        let height = self.range(keys::HEIGHT)?.max;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Resolution::new(width as u32, height as u32))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Capability)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A currently-applied value, also the payload of a user edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl SettingValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SettingValue::Number(v) if v.is_finite() => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SettingValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            SettingValue::Flag(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Flag(v) => write!(f, "{}", v),
            SettingValue::Number(v) => write!(f, "{}", v),
            SettingValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Hardware-reported settings of a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackSettings(BTreeMap<String, SettingValue>);

impl TrackSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: SettingValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: SettingValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&SettingValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(SettingValue::as_number)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(SettingValue::as_text)
    }

    pub fn frame_rate(&self) -> Option<f64> {
        self.number(keys::FRAME_RATE)
    }

    pub fn resolution(&self) -> Option<Resolution> {
        let width = self.number(keys::WIDTH)?;
        let height = self.number(keys::HEIGHT)?;
        Some(Resolution::new(width as u32, height as u32))
    }

    /// Device id, when present and non-empty.
    pub fn device_id(&self) -> Option<&str> {
        self.text(keys::DEVICE_ID).filter(|id| !id.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ---------------------------------------------------------------------------
// Devices and tracks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// An enumerated media device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub group_id: String,
    pub kind: DeviceKind,
    /// Empty until the user has granted capture permission.
    #[serde(default)]
    pub label: String,
}

impl DeviceInfo {
    pub fn video_input(device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            group_id: String::new(),
            kind: DeviceKind::VideoInput,
            label: label.into(),
        }
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    pub fn is_video_input(&self) -> bool {
        self.kind == DeviceKind::VideoInput
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constraints_request_user_facing_video_only() {
        let constraints = CameraConstraints::default();
        let json = serde_json::to_value(&constraints).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "video": { "facingMode": "user" }, "audio": false })
        );
    }

    #[test]
    fn test_device_constraints_use_exact_id() {
        let constraints = CameraConstraints::for_device("cam-2");
        let json = serde_json::to_value(&constraints).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "video": { "deviceId": { "exact": "cam-2" } }, "audio": false })
        );
        assert_eq!(constraints.requested_device_id(), Some("cam-2"));
        assert!(constraints.video.device_id.as_ref().unwrap().is_exact());
    }

    #[test]
    fn test_capabilities_parse_platform_json() {
        let caps: TrackCapabilities = serde_json::from_value(serde_json::json!({
            "deviceId": "abc",
            "width": { "min": 320, "max": 1920 },
            "zoom": { "min": 1.0, "max": 3.0, "step": 0.1 },
            "facingMode": ["user", "environment"],
            "torch": true
        }))
        .unwrap();

        assert_eq!(caps.get("deviceId"), Some(&Capability::Text("abc".to_string())));
        assert_eq!(caps.range("width"), Some(&NumericRange::new(320.0, 1920.0)));
        assert_eq!(caps.range("zoom").unwrap().step, Some(0.1));
        assert!(matches!(caps.get("facingMode"), Some(Capability::Options(o)) if o.len() == 2));
        assert_eq!(caps.get("torch"), Some(&Capability::Flag(true)));
    }

    #[test]
    fn test_max_resolution_requires_both_bounds() {
        let caps = TrackCapabilities::new().with("width", Capability::Range(NumericRange::new(1.0, 640.0)));
        assert_eq!(caps.max_resolution(), None);

        let caps = caps.with("height", Capability::Range(NumericRange::new(1.0, 480.0)));
        assert_eq!(caps.max_resolution(), Some(Resolution::new(640, 480)));
    }

    #[test]
    fn test_ideal_max_number_constraint_shape() {
        let json = serde_json::to_value(NumberConstraint::ideal_max(1280.0)).unwrap();
        assert_eq!(json, serde_json::json!({ "ideal": 1280.0, "max": 1280.0 }));
    }

    #[test]
    fn test_settings_accessors() {
        let settings = TrackSettings::new()
            .with("deviceId", SettingValue::Text(String::new()))
            .with("width", SettingValue::Number(1280.0))
            .with("height", SettingValue::Number(720.0))
            .with("frameRate", SettingValue::Number(29.97));

        assert_eq!(settings.device_id(), None);
        assert_eq!(settings.resolution(), Some(Resolution::new(1280, 720)));
        assert_eq!(settings.frame_rate(), Some(29.97));
    }
}
