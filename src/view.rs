//! Rendering seam for the settings panel.
//!
//! The sync loop drives a [`SettingsView`]; a host UI implements it with real
//! widgets. Nothing here draws anything.

use crate::controls::ControlDescriptor;
use crate::types::{DeviceInfo, SettingValue};
use serde::{Deserialize, Serialize};

pub const STATUS_LOADING: &str = "Loading camera...";
pub const STATUS_STOPPED: &str = "Camera stopped.";

pub const PICKER_UNAVAILABLE: &str = "Camera selection unavailable";
pub const PICKER_NO_CAMERAS: &str = "No cameras found";
pub const PICKER_LIST_FAILED: &str = "Unable to list cameras";
pub const PICKER_LOADING: &str = "Loading cameras...";

pub fn status_unavailable(reason: &str) -> String {
    format!("Camera unavailable: {}", reason)
}

/// One entry of the camera picker. Placeholders carry an empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraOption {
    pub value: String,
    pub label: String,
}

impl CameraOption {
    pub fn placeholder(label: &str) -> Self {
        Self {
            value: String::new(),
            label: label.to_string(),
        }
    }

    /// Option for the `index`-th camera; unlabeled devices get a numbered name.
    pub fn for_device(device: &DeviceInfo, index: usize) -> Self {
        let label = device.label.trim();
        Self {
            value: device.device_id.clone(),
            label: if label.is_empty() {
                format!("Camera {}", index + 1)
            } else {
                label.to_string()
            },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_empty()
    }
}

/// A rendered control widget.
pub trait ControlHandle {
    fn set_value(&mut self, value: &SettingValue);

    fn set_disabled(&mut self, disabled: bool);
}

pub trait SettingsView {
    type Control: ControlHandle;

    fn set_camera_options(&mut self, options: &[CameraOption]);

    fn select_camera(&mut self, device_id: &str);

    fn set_camera_picker_enabled(&mut self, enabled: bool);

    fn set_reset_enabled(&mut self, enabled: bool);

    /// Remove every control widget.
    fn clear_controls(&mut self);

    fn add_control(&mut self, descriptor: &ControlDescriptor) -> Self::Control;

    fn set_controls_visible(&mut self, visible: bool);

    /// Feed status overlay; `None` hides it.
    fn show_status(&mut self, status: Option<&str>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlabeled_devices_are_numbered() {
        let unlabeled = DeviceInfo::video_input("a", "   ");
        let labeled = DeviceInfo::video_input("b", " Front Camera ");

        assert_eq!(CameraOption::for_device(&unlabeled, 0).label, "Camera 1");
        assert_eq!(CameraOption::for_device(&labeled, 1).label, "Front Camera");
        assert_eq!(CameraOption::for_device(&labeled, 1).value, "b");
    }

    #[test]
    fn test_placeholder_has_empty_value() {
        let option = CameraOption::placeholder(PICKER_NO_CAMERAS);
        assert!(option.is_placeholder());
        assert_eq!(option.label, "No cameras found");
        assert_eq!(status_unavailable("busy"), "Camera unavailable: busy");
    }
}
