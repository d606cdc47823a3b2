//! Live settings sync.
//!
//! [`SettingsSync`] keeps the settings panel consistent with the camera. It
//! owns the session and the view and processes [`SyncEvent`]s one at a time,
//! so hardware calls never overlap: two quick device switches run strictly
//! one after the other and the last one wins. Slider edits are debounced per
//! control key; only the last value within the window reaches the hardware.
//!
//! After every apply, successful or not, all controls are re-read from the
//! track's reported settings, so the panel shows what the camera actually
//! did rather than what was asked for.

use crate::console::LogSink;
use crate::controls::{self, ControlDescriptor, ControlKind};
use crate::platform::{MediaDevices, Subscription};
use crate::session::CameraSession;
use crate::types::{CameraConstraints, SettingValue};
use crate::view::{self, CameraOption, ControlHandle, SettingsView};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

/// Something the user or platform did that the panel must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    ControlEdited { key: String, value: SettingValue },
    DeviceSelected(String),
    ResetRequested,
    DevicesChanged,
    StartCamera,
    StopCamera,
    Shutdown,
}

/// Sending half of the event queue.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl SyncHandle {
    /// Queue `event`. Returns false once the loop has shut down.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn edit_control(&self, key: impl Into<String>, value: SettingValue) -> bool {
        self.send(SyncEvent::ControlEdited {
            key: key.into(),
            value,
        })
    }

    pub fn select_device(&self, device_id: impl Into<String>) -> bool {
        self.send(SyncEvent::DeviceSelected(device_id.into()))
    }

    pub fn reset(&self) -> bool {
        self.send(SyncEvent::ResetRequested)
    }

    pub fn shutdown(&self) -> bool {
        self.send(SyncEvent::Shutdown)
    }
}

/// Receiving half of the event queue, consumed by [`SettingsSync::run`].
pub struct SyncEvents {
    rx: mpsc::UnboundedReceiver<SyncEvent>,
    hotplug: mpsc::WeakUnboundedSender<SyncEvent>,
}

pub fn channel() -> (SyncHandle, SyncEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    let hotplug = tx.downgrade();
    (SyncHandle { tx }, SyncEvents { rx, hotplug })
}

/// Latest pending value per key, each with its own deadline.
#[derive(Debug, Default)]
pub struct PendingApplies {
    entries: BTreeMap<String, (SettingValue, Instant)>,
}

impl PendingApplies {
    /// Schedule `value` for `key`, replacing whatever was pending.
    pub fn schedule(&mut self, key: &str, value: SettingValue, deadline: Instant) {
        self.entries.insert(key.to_string(), (value, deadline));
    }

    pub fn cancel(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|(_, deadline)| *deadline).min()
    }

    /// Remove and return entries due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<(String, SettingValue)> {
        let mut due: Vec<(Instant, String)> = self
            .entries
            .iter()
            .filter(|(_, (_, deadline))| *deadline <= now)
            .map(|(key, (_, deadline))| (*deadline, key.clone()))
            .collect();
        due.sort();
        due.into_iter()
            .filter_map(|(_, key)| self.entries.remove(&key).map(|(value, _)| (key, value)))
            .collect()
    }
}

/// A rendered control tied to its descriptor. Values pushed to the widget
/// must match the control's kind; anything else is ignored.
pub struct ControlBinding<C: ControlHandle> {
    descriptor: ControlDescriptor,
    handle: C,
    disabled: bool,
}

impl<C: ControlHandle> ControlBinding<C> {
    pub fn new(descriptor: ControlDescriptor, mut handle: C, disabled: bool) -> Self {
        handle.set_disabled(disabled);
        Self {
            descriptor,
            handle,
            disabled,
        }
    }

    pub fn key(&self) -> &str {
        &self.descriptor.key
    }

    pub fn descriptor(&self) -> &ControlDescriptor {
        &self.descriptor
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Show `value` if it fits this control. Returns whether it was shown.
    pub fn push_value(&mut self, value: &SettingValue) -> bool {
        if !self.descriptor.accepts(value) {
            return false;
        }
        self.handle.set_value(value);
        true
    }
}

pub struct SettingsSync<D: MediaDevices, V: SettingsView> {
    session: CameraSession<D>,
    view: V,
    bindings: Vec<ControlBinding<V::Control>>,
    pending: PendingApplies,
    debounce: Duration,
    selected_device: Option<String>,
    reset_enabled: bool,
    logger: Arc<dyn LogSink>,
    hotplug: Option<Subscription>,
}

impl<D: MediaDevices, V: SettingsView> SettingsSync<D, V> {
    pub fn new(session: CameraSession<D>, view: V, logger: Arc<dyn LogSink>) -> Self {
        Self {
            session,
            view,
            bindings: Vec::new(),
            pending: PendingApplies::default(),
            debounce: DEFAULT_DEBOUNCE,
            selected_device: None,
            reset_enabled: false,
            logger,
            hotplug: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn session(&self) -> &CameraSession<D> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CameraSession<D> {
        &mut self.session
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn bindings(&self) -> &[ControlBinding<V::Control>] {
        &self.bindings
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn pending(&self) -> &PendingApplies {
        &self.pending
    }

    pub fn is_reset_enabled(&self) -> bool {
        self.reset_enabled
    }

    /// Start the camera with the session's stored constraints, then fill
    /// the picker and build controls.
    pub async fn initialize(&mut self) {
        self.view.set_camera_options(&[CameraOption::placeholder(view::PICKER_LOADING)]);
        self.view.set_camera_picker_enabled(false);
        self.start_camera().await;
        self.refresh_cameras().await;
    }

    pub async fn start_camera(&mut self) {
        self.view.show_status(Some(view::STATUS_LOADING));
        let result = self.session.start(None).await.map(|_| ());
        self.report_start(result);
    }

    pub fn stop_camera(&mut self) {
        self.session.stop(false);
        self.view.show_status(Some(view::STATUS_STOPPED));
        self.build_controls();
    }

    fn report_start(&mut self, result: Result<(), crate::errors::CameraError>) {
        match result {
            Ok(()) => self.view.show_status(None),
            Err(e) => self
                .view
                .show_status(Some(&view::status_unavailable(e.reason()))),
        }
    }

    /// Repopulate the camera picker and rebuild controls.
    ///
    /// Keeps the previous selection when that camera is still present,
    /// otherwise follows the active stream's device.
    pub async fn refresh_cameras(&mut self) {
        let preferred = self.selected_device.clone();

        match self.session.list_cameras().await {
            Ok(None) => self.show_picker_placeholder(view::PICKER_UNAVAILABLE),
            Ok(Some(cameras)) if cameras.is_empty() => {
                self.show_picker_placeholder(view::PICKER_NO_CAMERAS)
            }
            Ok(Some(cameras)) => {
                let options: Vec<CameraOption> = cameras
                    .iter()
                    .enumerate()
                    .map(|(index, device)| CameraOption::for_device(device, index))
                    .collect();
                self.view.set_camera_options(&options);
                self.view.set_camera_picker_enabled(true);

                let keep = preferred.filter(|id| options.iter().any(|o| &o.value == id));
                let active = self
                    .session
                    .active_device_id()
                    .filter(|id| options.iter().any(|o| &o.value == id));
                let selected = keep
                    .or(active)
                    .or_else(|| options.first().map(|o| o.value.clone()));
                if let Some(id) = &selected {
                    self.view.select_camera(id);
                }
                self.selected_device = selected;
            }
            Err(_) => self.show_picker_placeholder(view::PICKER_LIST_FAILED),
        }

        self.build_controls();
    }

    fn show_picker_placeholder(&mut self, label: &str) {
        self.view.set_camera_options(&[CameraOption::placeholder(label)]);
        self.view.set_camera_picker_enabled(false);
        self.selected_device = None;
    }

    /// Rebuild every control from the live track's capabilities. Pending
    /// applies for the previous control set are dropped.
    pub fn build_controls(&mut self) {
        self.pending.clear();
        self.bindings.clear();
        self.view.clear_controls();

        if let Some(capabilities) = self.session.get_capabilities() {
            let supported = self.session.supported_constraints();
            let disabled = !self.session.can_apply_constraints();
            for descriptor in controls::build_controls(&capabilities, supported.as_ref()) {
                let handle = self.view.add_control(&descriptor);
                self.bindings
                    .push(ControlBinding::new(descriptor, handle, disabled));
            }
        }

        self.view.set_controls_visible(!self.bindings.is_empty());
        self.sync_control_values();
    }

    /// Push the track's reported settings into every control.
    pub fn sync_control_values(&mut self) {
        let settings = self.session.get_settings();
        if let Some(settings) = &settings {
            for binding in &mut self.bindings {
                if let Some(value) = settings.get(binding.key()) {
                    binding.push_value(value);
                }
            }
        }

        self.reset_enabled = self.selected_device.as_deref().is_some_and(|id| !id.is_empty())
            && settings.is_some();
        self.view.set_reset_enabled(self.reset_enabled);
    }

    pub async fn handle_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::ControlEdited { key, value } => self.edit_control(&key, value).await,
            SyncEvent::DeviceSelected(device_id) => self.select_device(&device_id).await,
            SyncEvent::ResetRequested => self.reset().await,
            SyncEvent::DevicesChanged => self.refresh_cameras().await,
            SyncEvent::StartCamera => {
                self.start_camera().await;
                self.build_controls();
            }
            SyncEvent::StopCamera => self.stop_camera(),
            SyncEvent::Shutdown => {}
        }
    }

    async fn edit_control(&mut self, key: &str, value: SettingValue) {
        let Some(binding) = self.bindings.iter().find(|b| b.key() == key) else {
            log::debug!("Ignoring edit for unknown control {}", key);
            return;
        };
        if binding.is_disabled() || !binding.descriptor().accepts(&value) {
            return;
        }

        let delay = match binding.descriptor().kind {
            ControlKind::Range { .. } => self.debounce,
            ControlKind::Select { .. } | ControlKind::Toggle => Duration::ZERO,
        };
        if delay.is_zero() {
            self.pending.cancel(key);
            self.apply(key, value).await;
        } else {
            self.pending.schedule(key, value, Instant::now() + delay);
        }
    }

    async fn apply(&mut self, key: &str, value: SettingValue) {
        if let Err(e) = self.session.apply_constraint(key, value.clone()).await {
            self.logger.warn(&format!(
                "[Settings] Could not apply {} = {}: {}",
                key,
                value,
                e.reason()
            ));
        }
        self.sync_control_values();
    }

    /// Apply every debounced edit whose window has elapsed.
    pub async fn flush_due(&mut self) {
        for (key, value) in self.pending.take_due(Instant::now()) {
            self.apply(&key, value).await;
        }
    }

    async fn select_device(&mut self, device_id: &str) {
        if device_id.is_empty() {
            return;
        }
        self.selected_device = Some(device_id.to_string());
        self.view.select_camera(device_id);

        if self.session.is_active_device(device_id) {
            self.sync_control_values();
            return;
        }

        self.view.show_status(Some(view::STATUS_LOADING));
        let result = self.session.switch(device_id).await.map(|_| ());
        self.report_start(result);
        self.build_controls();
    }

    /// Restart the selected device with fresh constraints, dropping every
    /// live adjustment.
    async fn reset(&mut self) {
        if !self.reset_enabled {
            return;
        }
        let Some(device_id) = self.selected_device.clone() else {
            return;
        };

        self.view.show_status(Some(view::STATUS_LOADING));
        let result = self
            .session
            .start(Some(CameraConstraints::for_device(device_id)))
            .await
            .map(|_| ());
        self.report_start(result);
        self.build_controls();
    }

    /// Process events until `Shutdown` or every [`SyncHandle`] is dropped.
    /// Hot-plug notifications are queued as `DevicesChanged`.
    pub async fn run(&mut self, mut events: SyncEvents) {
        let hotplug = events.hotplug.clone();
        self.hotplug = self.session.on_device_change(Arc::new(move || {
            if let Some(tx) = hotplug.upgrade() {
                let _ = tx.send(SyncEvent::DevicesChanged);
            }
        }));

        loop {
            let deadline = self.pending.next_deadline();
            tokio::select! {
                event = events.rx.recv() => match event {
                    None | Some(SyncEvent::Shutdown) => break,
                    Some(event) => self.handle_event(event).await,
                },
                _ = sleep_until(deadline) => self.flush_due().await,
            }
        }

        self.hotplug = None;
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_keeps_last_value_per_key() {
        let now = Instant::now();
        let mut pending = PendingApplies::default();
        pending.schedule("zoom", SettingValue::Number(1.5), now);
        pending.schedule("zoom", SettingValue::Number(2.0), now + Duration::from_millis(10));
        pending.schedule("brightness", SettingValue::Number(90.0), now + Duration::from_millis(5));

        assert_eq!(pending.next_deadline(), Some(now));
        assert!(pending.take_due(now).is_empty());

        let due = pending.take_due(now + Duration::from_millis(10));
        assert_eq!(
            due,
            vec![
                ("brightness".to_string(), SettingValue::Number(90.0)),
                ("zoom".to_string(), SettingValue::Number(2.0)),
            ]
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn test_cancel_removes_pending_key() {
        let now = Instant::now();
        let mut pending = PendingApplies::default();
        pending.schedule("zoom", SettingValue::Number(1.5), now);
        pending.cancel("zoom");
        assert!(!pending.contains("zoom"));
        assert_eq!(pending.next_deadline(), None);
    }

    struct Widget(Vec<SettingValue>);

    impl ControlHandle for &mut Widget {
        fn set_value(&mut self, value: &SettingValue) {
            self.0.push(value.clone());
        }

        fn set_disabled(&mut self, _disabled: bool) {}
    }

    #[test]
    fn test_binding_ignores_mismatched_values() {
        let descriptor = controls::descriptor_for(
            "zoom",
            &crate::types::Capability::Range(crate::types::NumericRange::new(1.0, 3.0)),
        )
        .unwrap();
        let mut widget = Widget(Vec::new());
        {
            let mut binding = ControlBinding::new(descriptor, &mut widget, false);
            assert!(!binding.push_value(&SettingValue::Text("2".into())));
            assert!(binding.push_value(&SettingValue::Number(2.0)));
        }
        assert_eq!(widget.0, vec![SettingValue::Number(2.0)]);
    }
}
