//! Capability-to-control mapping.
//!
//! Turns a track's capability snapshot into an ordered list of control
//! descriptors. The output depends only on the capabilities and the
//! platform's supported-constraint set, so rebuilding for a new track never
//! carries anything over from the previous one.

use crate::types::{keys, Capability, NumericRange, SettingValue, TrackCapabilities};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Identifier keys that are never user-controllable.
pub const HIDDEN_KEYS: [&str; 2] = [keys::DEVICE_ID, keys::GROUP_ID];

/// Keys listed first, in this order. Everything else follows alphabetically.
pub const PRIORITY_KEYS: [&str; 4] = [keys::WIDTH, keys::HEIGHT, keys::FRAME_RATE, keys::FACING_MODE];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlKind {
    Range { min: f64, max: f64, step: f64 },
    Select { options: Vec<String> },
    Toggle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlDescriptor {
    pub key: String,
    pub label: String,
    #[serde(flatten)]
    pub kind: ControlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ControlDescriptor {
    /// Whether `value` has the shape this control displays.
    pub fn accepts(&self, value: &SettingValue) -> bool {
        match self.kind {
            ControlKind::Range { .. } => value.as_number().is_some(),
            ControlKind::Select { .. } => value.as_text().is_some(),
            ControlKind::Toggle => value.as_flag().is_some(),
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self.kind, ControlKind::Range { .. })
    }
}

/// Build the control set for `capabilities`.
///
/// `supported` is the platform's supported-constraint set; when it is known,
/// keys outside it are dropped.
pub fn build_controls(
    capabilities: &TrackCapabilities,
    supported: Option<&BTreeSet<String>>,
) -> Vec<ControlDescriptor> {
    let mut descriptors: Vec<ControlDescriptor> = capabilities
        .iter()
        .filter(|(key, _)| !HIDDEN_KEYS.contains(key))
        .filter(|(key, _)| supported.map_or(true, |set| set.contains(*key)))
        .filter_map(|(key, capability)| descriptor_for(key, capability))
        .collect();

    descriptors.sort_by(|a, b| compare_keys(&a.key, &b.key));
    descriptors
}

/// Descriptor for a single capability, or `None` if it is not controllable.
pub fn descriptor_for(key: &str, capability: &Capability) -> Option<ControlDescriptor> {
    let kind = match capability {
        Capability::Range(range) => {
            if !range.min.is_finite() || !range.max.is_finite() || range.max <= range.min {
                return None;
            }
            ControlKind::Range {
                min: range.min,
                max: range.max,
                step: range_step(range),
            }
        }
        Capability::Options(options) => {
            if options.len() <= 1 {
                return None;
            }
            ControlKind::Select {
                options: options.clone(),
            }
        }
        Capability::Flag(_) => ControlKind::Toggle,
        Capability::Text(_) => return None,
    };

    Some(ControlDescriptor {
        key: key.to_string(),
        label: format_label(key),
        kind,
        unit: unit_for(key).map(str::to_string),
    })
}

/// Slider step for a range capability.
pub fn range_step(range: &NumericRange) -> f64 {
    if let Some(step) = range.step.filter(|s| s.is_finite() && *s > 0.0) {
        return step;
    }
    let span = range.max - range.min;
    if range.min.fract() == 0.0 && range.max.fract() == 0.0 {
        1.0
    } else if span <= 1.0 {
        0.01
    } else if span <= 10.0 {
        0.1
    } else {
        1.0
    }
}

fn label_override(key: &str) -> Option<&'static str> {
    match key {
        "frameRate" => Some("Frame rate"),
        "facingMode" => Some("Facing mode"),
        "resizeMode" => Some("Resize mode"),
        "whiteBalanceMode" => Some("White balance mode"),
        "exposureMode" => Some("Exposure mode"),
        "focusMode" => Some("Focus mode"),
        _ => None,
    }
}

pub fn unit_for(key: &str) -> Option<&'static str> {
    match key {
        "width" | "height" => Some("px"),
        "frameRate" => Some("fps"),
        "exposureTime" => Some("ms"),
        "zoom" => Some("x"),
        _ => None,
    }
}

/// Human-readable label: an override when one exists, otherwise the
/// camel-case key split into words with the first letter capitalised.
pub fn format_label(key: &str) -> String {
    if let Some(label) = label_override(key) {
        return label.to_string();
    }

    let mut label = String::with_capacity(key.len() + 4);
    let mut prev: Option<char> = None;
    for c in key.chars() {
        if prev.is_some_and(|p| p.is_ascii_lowercase()) && c.is_ascii_uppercase() {
            label.push(' ');
        }
        if prev.is_none() {
            label.extend(c.to_uppercase());
        } else {
            label.push(c);
        }
        prev = Some(c);
    }
    label
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    let rank = |key: &str| PRIORITY_KEYS.iter().position(|p| *p == key);
    match (rank(a), rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min: f64, max: f64) -> Capability {
        Capability::Range(NumericRange::new(min, max))
    }

    fn options(values: &[&str]) -> Capability {
        Capability::Options(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_hidden_and_degenerate_capabilities_are_skipped() {
        let caps = TrackCapabilities::new()
            .with("deviceId", Capability::Text("abc".into()))
            .with("groupId", Capability::Text("grp".into()))
            .with("width", range(320.0, 1920.0))
            .with("height", range(720.0, 720.0))
            .with("resizeMode", options(&["none"]))
            .with("torch", Capability::Flag(false));

        let keys: Vec<String> = build_controls(&caps, None).into_iter().map(|d| d.key).collect();
        assert_eq!(keys, vec!["width", "torch"]);
    }

    #[test]
    fn test_unsupported_keys_are_dropped_when_support_is_known() {
        let caps = TrackCapabilities::new()
            .with("zoom", range(1.0, 3.0))
            .with("width", range(320.0, 1920.0));
        let supported: BTreeSet<String> = ["width".to_string()].into_iter().collect();

        let with_support = build_controls(&caps, Some(&supported));
        assert_eq!(with_support.len(), 1);
        assert_eq!(with_support[0].key, "width");

        let without_support = build_controls(&caps, None);
        assert_eq!(without_support.len(), 2);
    }

    #[test]
    fn test_ordering_puts_priority_keys_first() {
        let caps = TrackCapabilities::new()
            .with("zoom", range(1.0, 3.0))
            .with("brightness", range(0.0, 255.0))
            .with("facingMode", options(&["user", "environment"]))
            .with("frameRate", range(1.0, 60.0))
            .with("height", range(240.0, 1080.0))
            .with("width", range(320.0, 1920.0));

        let keys: Vec<String> = build_controls(&caps, None).into_iter().map(|d| d.key).collect();
        assert_eq!(
            keys,
            vec!["width", "height", "frameRate", "facingMode", "brightness", "zoom"]
        );
    }

    #[test]
    fn test_range_step_rules() {
        assert_eq!(range_step(&NumericRange::new(1.0, 3.0).with_step(0.5)), 0.5);
        assert_eq!(range_step(&NumericRange::new(1.0, 3.0).with_step(0.0)), 1.0);
        assert_eq!(range_step(&NumericRange::new(0.0, 255.0)), 1.0);
        assert_eq!(range_step(&NumericRange::new(0.0, 0.5)), 0.01);
        assert_eq!(range_step(&NumericRange::new(1.0, 10.5)), 0.1);
        assert_eq!(range_step(&NumericRange::new(0.5, 100.0)), 1.0);
    }

    #[test]
    fn test_labels_and_units() {
        assert_eq!(format_label("frameRate"), "Frame rate");
        assert_eq!(format_label("whiteBalanceMode"), "White balance mode");
        assert_eq!(format_label("exposureTime"), "Exposure Time");
        assert_eq!(format_label("colorTemperature"), "Color Temperature");
        assert_eq!(format_label("zoom"), "Zoom");
        assert_eq!(format_label(""), "");

        assert_eq!(unit_for("width"), Some("px"));
        assert_eq!(unit_for("frameRate"), Some("fps"));
        assert_eq!(unit_for("exposureTime"), Some("ms"));
        assert_eq!(unit_for("zoom"), Some("x"));
        assert_eq!(unit_for("brightness"), None);
    }

    #[test]
    fn test_descriptor_serializes_as_tagged_kind() {
        let descriptor = descriptor_for("zoom", &range(1.0, 3.0)).unwrap();
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "key": "zoom",
                "label": "Zoom",
                "kind": "range",
                "min": 1.0,
                "max": 3.0,
                "step": 1.0,
                "unit": "x"
            })
        );
    }

    #[test]
    fn test_accepts_matches_kind() {
        let toggle = descriptor_for("torch", &Capability::Flag(true)).unwrap();
        assert!(toggle.accepts(&SettingValue::Flag(true)));
        assert!(!toggle.accepts(&SettingValue::Number(1.0)));

        let select = descriptor_for("facingMode", &options(&["user", "environment"])).unwrap();
        assert!(select.accepts(&SettingValue::Text("user".into())));
        assert!(!select.accepts(&SettingValue::Flag(false)));

        let slider = descriptor_for("zoom", &range(1.0, 3.0)).unwrap();
        assert!(slider.accepts(&SettingValue::Number(2.0)));
        assert!(!slider.accepts(&SettingValue::Number(f64::NAN)));
    }
}
