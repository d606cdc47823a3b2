//! Headless [`SettingsView`] that records what it was told to show.

use crate::controls::ControlDescriptor;
use crate::types::SettingValue;
use crate::view::{CameraOption, ControlHandle, SettingsView};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedControl {
    pub descriptor: ControlDescriptor,
    pub value: Option<SettingValue>,
    pub disabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewSnapshot {
    pub camera_options: Vec<CameraOption>,
    pub selected_camera: Option<String>,
    pub picker_enabled: bool,
    pub reset_enabled: bool,
    pub controls: Vec<RenderedControl>,
    pub controls_visible: bool,
    pub status: Option<String>,
    /// Number of times the control list was cleared.
    pub rebuilds: usize,
}

#[derive(Default)]
struct ViewState {
    snapshot: ViewSnapshot,
    generation: u64,
}

/// Clones share state, so tests keep a handle while the sync loop owns one.
#[derive(Clone, Default)]
pub struct RecordingSettingsView {
    state: Arc<Mutex<ViewState>>,
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingSettingsView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        lock(&self.state).snapshot.clone()
    }

    pub fn control(&self, key: &str) -> Option<RenderedControl> {
        lock(&self.state)
            .snapshot
            .controls
            .iter()
            .find(|c| c.descriptor.key == key)
            .cloned()
    }

    pub fn control_keys(&self) -> Vec<String> {
        lock(&self.state)
            .snapshot
            .controls
            .iter()
            .map(|c| c.descriptor.key.clone())
            .collect()
    }

    pub fn value_of(&self, key: &str) -> Option<SettingValue> {
        self.control(key).and_then(|c| c.value)
    }

    pub fn status(&self) -> Option<String> {
        lock(&self.state).snapshot.status.clone()
    }
}

impl SettingsView for RecordingSettingsView {
    type Control = RecordingControl;

    fn set_camera_options(&mut self, options: &[CameraOption]) {
        let mut state = lock(&self.state);
        state.snapshot.camera_options = options.to_vec();
        state.snapshot.selected_camera = options.first().map(|o| o.value.clone());
    }

    fn select_camera(&mut self, device_id: &str) {
        lock(&self.state).snapshot.selected_camera = Some(device_id.to_string());
    }

    fn set_camera_picker_enabled(&mut self, enabled: bool) {
        lock(&self.state).snapshot.picker_enabled = enabled;
    }

    fn set_reset_enabled(&mut self, enabled: bool) {
        lock(&self.state).snapshot.reset_enabled = enabled;
    }

    fn clear_controls(&mut self) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.snapshot.controls.clear();
        state.snapshot.rebuilds += 1;
    }

    fn add_control(&mut self, descriptor: &ControlDescriptor) -> RecordingControl {
        let mut state = lock(&self.state);
        state.snapshot.controls.push(RenderedControl {
            descriptor: descriptor.clone(),
            value: None,
            disabled: false,
        });
        RecordingControl {
            state: self.state.clone(),
            generation: state.generation,
            index: state.snapshot.controls.len() - 1,
        }
    }

    fn set_controls_visible(&mut self, visible: bool) {
        lock(&self.state).snapshot.controls_visible = visible;
    }

    fn show_status(&mut self, status: Option<&str>) {
        lock(&self.state).snapshot.status = status.map(str::to_string);
    }
}

/// Widget handle from [`RecordingSettingsView`]. Writes after the list was
/// cleared are dropped.
pub struct RecordingControl {
    state: Arc<Mutex<ViewState>>,
    generation: u64,
    index: usize,
}

impl RecordingControl {
    fn with_control(&self, update: impl FnOnce(&mut RenderedControl)) {
        let mut state = lock(&self.state);
        if state.generation != self.generation {
            return;
        }
        if let Some(control) = state.snapshot.controls.get_mut(self.index) {
            update(control);
        }
    }
}

impl ControlHandle for RecordingControl {
    fn set_value(&mut self, value: &SettingValue) {
        self.with_control(|c| c.value = Some(value.clone()));
    }

    fn set_disabled(&mut self, disabled: bool) {
        self.with_control(|c| c.disabled = disabled);
    }
}
