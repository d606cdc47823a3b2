//! Device monitoring and hot-plug detection
//!
//! Backends without native hot-plug notification poll their device list and
//! diff it against the previous scan. Every scan that finds a change returns
//! its [`DeviceEvent`]s and calls the registered device-change handlers once.

use super::{DeviceChangeHandler, Subscription};
use crate::errors::CameraError;
use crate::types::DeviceInfo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Device event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(String),    // Device ID
    Disconnected(String), // Device ID
}

pub type DeviceScanner = Arc<dyn Fn() -> Result<Vec<DeviceInfo>, CameraError> + Send + Sync>;

type HandlerList = Mutex<Vec<(u64, DeviceChangeHandler)>>;

struct MonitorShared {
    scanner: DeviceScanner,
    active_devices: RwLock<HashMap<String, DeviceInfo>>,
    handlers: Arc<HandlerList>,
}

/// Polling device monitor
pub struct DeviceMonitor {
    shared: Arc<MonitorShared>,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    next_handler: Mutex<u64>,
}

impl DeviceMonitor {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    pub fn new(scanner: DeviceScanner, interval: Duration) -> Self {
        Self {
            shared: Arc::new(MonitorShared {
                scanner,
                active_devices: RwLock::new(HashMap::new()),
                handlers: Arc::new(Mutex::new(Vec::new())),
            }),
            interval,
            task: Mutex::new(None),
            next_handler: Mutex::new(0),
        }
    }

    /// Take an initial snapshot and spawn the polling task. Must be called
    /// from within a tokio runtime.
    pub async fn start_monitoring(&self) -> Result<(), CameraError> {
        if self.is_monitoring() {
            return Ok(());
        }

        log::info!("Starting device monitoring every {:?}", self.interval);

        let initial = (self.shared.scanner)()?;
        {
            let mut active = self.shared.active_devices.write().await;
            active.clear();
            active.extend(initial.into_iter().map(|d| (d.device_id.clone(), d)));
        }

        let shared = self.shared.clone();
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = shared.scan().await {
                    log::debug!("Device scan failed: {}", e);
                }
            }
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            log::info!("Stopping device monitoring");
            handle.abort();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Rescan immediately and return the changes found.
    pub async fn scan_now(&self) -> Result<Vec<DeviceEvent>, CameraError> {
        self.shared.scan().await
    }

    pub async fn get_active_devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> =
            self.shared.active_devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        devices
    }

    /// Register a handler called once per scan that found changes.
    pub fn subscribe(&self, handler: DeviceChangeHandler) -> Subscription {
        let id = {
            let mut next = self.next_handler.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            *next
        };
        self.shared
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, handler));

        let handlers: Weak<HandlerList> = Arc::downgrade(&self.shared.handlers);
        Subscription::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                handlers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(existing, _)| *existing != id);
            }
        })
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

impl MonitorShared {
    async fn scan(&self) -> Result<Vec<DeviceEvent>, CameraError> {
        let devices = (self.scanner)()?;
        let events = {
            let mut active = self.active_devices.write().await;
            let mut events = Vec::new();

            for old_id in active.keys() {
                if !devices.iter().any(|d| &d.device_id == old_id) {
                    log::info!("Device disconnected: {}", old_id);
                    events.push(DeviceEvent::Disconnected(old_id.clone()));
                }
            }
            for device in &devices {
                if !active.contains_key(&device.device_id) {
                    log::info!("Device connected: {}", device.device_id);
                    events.push(DeviceEvent::Connected(device.device_id.clone()));
                }
            }

            active.clear();
            active.extend(devices.into_iter().map(|d| (d.device_id.clone(), d)));
            events
        };

        if !events.is_empty() {
            let handlers: Vec<DeviceChangeHandler> = self
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect();
            for handler in handlers {
                handler();
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scripted(devices: Arc<Mutex<Vec<DeviceInfo>>>) -> DeviceScanner {
        Arc::new(move || Ok(devices.lock().unwrap().clone()))
    }

    #[tokio::test]
    async fn test_scan_reports_connect_and_disconnect() {
        let devices = Arc::new(Mutex::new(vec![DeviceInfo::video_input("0", "Front")]));
        let monitor = DeviceMonitor::new(scripted(devices.clone()), Duration::from_secs(60));
        monitor.start_monitoring().await.unwrap();

        assert!(monitor.scan_now().await.unwrap().is_empty());

        devices.lock().unwrap().push(DeviceInfo::video_input("1", "USB"));
        assert_eq!(
            monitor.scan_now().await.unwrap(),
            vec![DeviceEvent::Connected("1".to_string())]
        );
        assert!(monitor.scan_now().await.unwrap().is_empty());

        devices.lock().unwrap().remove(0);
        assert_eq!(
            monitor.scan_now().await.unwrap(),
            vec![DeviceEvent::Disconnected("0".to_string())]
        );
        let active = monitor.get_active_devices().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device_id, "1");

        monitor.stop_monitoring();
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test]
    async fn test_handlers_fire_once_per_changed_scan_until_unsubscribed() {
        let devices = Arc::new(Mutex::new(Vec::new()));
        let monitor = DeviceMonitor::new(scripted(devices.clone()), Duration::from_secs(60));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let sub = monitor.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        devices.lock().unwrap().push(DeviceInfo::video_input("0", "A"));
        devices.lock().unwrap().push(DeviceInfo::video_input("1", "B"));
        monitor.scan_now().await.unwrap();
        monitor.scan_now().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        devices.lock().unwrap().clear();
        monitor.scan_now().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_repeated_hotplug_keeps_only_current_devices() {
        let devices = Arc::new(Mutex::new(Vec::new()));
        let monitor = DeviceMonitor::new(scripted(devices.clone()), Duration::from_secs(60));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = monitor.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        for _ in 0..500 {
            devices.lock().unwrap().push(DeviceInfo::video_input("usb", "Dock"));
            assert_eq!(
                monitor.scan_now().await.unwrap(),
                vec![DeviceEvent::Connected("usb".to_string())]
            );
            devices.lock().unwrap().clear();
            assert_eq!(
                monitor.scan_now().await.unwrap(),
                vec![DeviceEvent::Disconnected("usb".to_string())]
            );
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1000);
        assert!(monitor.get_active_devices().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_task_detects_changes() {
        let devices = Arc::new(Mutex::new(Vec::new()));
        let monitor = DeviceMonitor::new(scripted(devices.clone()), Duration::from_secs(2));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = monitor.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        monitor.start_monitoring().await.unwrap();
        assert!(monitor.is_monitoring());

        devices.lock().unwrap().push(DeviceInfo::video_input("7", "Hotplugged"));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let active = monitor.get_active_devices().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].device_id, "7");
    }
}
