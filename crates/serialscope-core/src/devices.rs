//! Device enumeration
//!
//! Refreshes run on Tokio's blocking pool because OS enumeration can take a
//! while. The published list is swapped in one step, so readers see either
//! the old list or the new one. A refresh requested while another is in
//! flight is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::task::JoinHandle;

use crate::events::{EventBus, StateEvent};
use crate::transport::{DeviceDescriptor, PortBackend};

/// Resets the in-flight flag even if enumeration panics
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background device list maintained for the UI
pub struct DeviceEnumerator {
    backend: Arc<dyn PortBackend>,
    devices: Arc<RwLock<Arc<Vec<DeviceDescriptor>>>>,
    in_flight: Arc<AtomicBool>,
    events: Arc<EventBus>,
}

impl DeviceEnumerator {
    /// Enumerator over `backend`, publishing on `events`. The list starts empty.
    pub fn new(backend: Arc<dyn PortBackend>, events: Arc<EventBus>) -> Self {
        Self {
            backend,
            devices: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Start a refresh in the background.
    ///
    /// Returns `None` without doing anything if a refresh is already running
    /// or no Tokio runtime is available. Completion publishes
    /// [`StateEvent::DeviceListChanged`].
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("device refresh already in flight");
            return None;
        }
        let guard = InFlight(Arc::clone(&self.in_flight));

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("cannot refresh devices outside a Tokio runtime: {e}");
                return None;
            }
        };

        let backend = Arc::clone(&self.backend);
        let devices = Arc::clone(&self.devices);
        let events = Arc::clone(&self.events);

        Some(runtime.spawn_blocking(move || {
            tracing::debug!("enumerating serial devices");
            match backend.enumerate() {
                Ok(list) => {
                    tracing::info!(count = list.len(), "device list refreshed");
                    *devices.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(list);
                }
                Err(e) => {
                    tracing::warn!("device enumeration failed, keeping previous list: {e}");
                }
            }
            drop(guard);
            events.publish(StateEvent::DeviceListChanged);
        }))
    }

    /// Whether a refresh is currently running
    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Most recently published device list
    pub fn devices(&self) -> Vec<DeviceDescriptor> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MonitorError, Result};
    use crate::transport::{OpenSettings, SerialTransport};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Backend whose enumeration blocks until released
    struct GatedBackend {
        calls: AtomicUsize,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
        fail: bool,
    }

    impl PortBackend for GatedBackend {
        fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(gate) = self.gate.lock() {
                let _ = gate.recv();
            }
            if self.fail {
                return Err(MonitorError::Serial("enumeration failed".to_string()));
            }
            Ok(vec![DeviceDescriptor::new("/dev/ttyUSB0", "FT232R USB UART")])
        }

        fn open(&self, settings: &OpenSettings) -> Result<Box<dyn SerialTransport>> {
            Err(MonitorError::PortNotFound(settings.identifier.clone()))
        }
    }

    fn gated(fail: bool) -> (Arc<GatedBackend>, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let backend = Arc::new(GatedBackend {
            calls: AtomicUsize::new(0),
            gate: Mutex::new(rx),
            fail,
        });
        (backend, tx)
    }

    #[tokio::test]
    async fn test_concurrent_refresh_coalesced() {
        let (backend, release) = gated(false);
        let events = Arc::new(EventBus::new());
        let enumerator = DeviceEnumerator::new(backend.clone(), Arc::clone(&events));

        let first = enumerator.refresh().unwrap();
        assert!(enumerator.is_refreshing());
        assert!(enumerator.refresh().is_none());

        release.send(()).unwrap();
        first.await.unwrap();

        assert!(!enumerator.is_refreshing());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(enumerator.devices()[0].identifier, "/dev/ttyUSB0");
    }

    #[tokio::test]
    async fn test_refresh_publishes_event() {
        let (backend, release) = gated(false);
        let events = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        events.subscribe(StateEvent::DeviceListChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let enumerator = DeviceEnumerator::new(backend, events);

        release.send(()).unwrap();
        enumerator.refresh().unwrap().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_list() {
        let (backend, release) = gated(true);
        let enumerator = DeviceEnumerator::new(backend, Arc::new(EventBus::new()));

        release.send(()).unwrap();
        enumerator.refresh().unwrap().await.unwrap();
        assert!(enumerator.devices().is_empty());
        assert!(!enumerator.is_refreshing());
    }

    #[test]
    fn test_refresh_without_runtime() {
        let (backend, _release) = gated(false);
        let enumerator = DeviceEnumerator::new(backend, Arc::new(EventBus::new()));
        assert!(enumerator.refresh().is_none());
        assert!(!enumerator.is_refreshing());
    }
}
