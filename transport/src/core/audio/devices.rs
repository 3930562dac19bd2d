//! Session-scoped audio device management.
//!
//! [`AudioDeviceManager`] wraps a backend with an explicit lifecycle: a
//! session acquires it while it needs devices and releases it afterwards.
//! While acquired it tracks the available input devices and the user's
//! preferred device.

use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::{AudioBackend, AudioDevice};

#[derive(Debug, Default)]
struct DeviceState {
    managing: bool,
    available: Vec<AudioDevice>,
    preferred: Option<String>,
}

pub struct AudioDeviceManager {
    backend: Arc<dyn AudioBackend>,
    state: Mutex<DeviceState>,
}

impl AudioDeviceManager {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            state: Mutex::new(DeviceState::default()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn AudioBackend> {
        &self.backend
    }

    /// Start managing devices for a session. No-op if already managing.
    pub fn acquire(&self) {
        let mut state = self.state.lock();
        if state.managing {
            return;
        }
        state.managing = true;
        state.available = self.enumerate();
        tracing::debug!(
            "Audio device manager acquired ({} backend, {} input devices)",
            self.backend.name(),
            state.available.len()
        );
    }

    /// Stop managing devices. The preferred device is kept for the next
    /// session.
    pub fn release(&self) {
        let mut state = self.state.lock();
        if !state.managing {
            return;
        }
        state.managing = false;
        state.available.clear();
        tracing::debug!("Audio device manager released");
    }

    pub fn is_managing(&self) -> bool {
        self.state.lock().managing
    }

    pub fn available_devices(&self) -> Vec<AudioDevice> {
        self.state.lock().available.clone()
    }

    pub fn preferred_device(&self) -> Option<String> {
        self.state.lock().preferred.clone()
    }

    pub fn set_preferred_device(&self, device_id: Option<String>) {
        self.state.lock().preferred = device_id;
    }

    /// The input device in use: the preferred device when it is available,
    /// otherwise the backend default.
    pub fn current_input_device(&self) -> Option<AudioDevice> {
        let preferred = {
            let state = self.state.lock();
            state.preferred.as_ref().and_then(|id| {
                state.available.iter().find(|d| &d.id == id).cloned()
            })
        };
        preferred.or_else(|| self.backend.default_input_device())
    }

    /// Re-enumerate devices. Returns whether the available list changed.
    /// Does nothing while not managing.
    pub fn refresh(&self) -> bool {
        let mut state = self.state.lock();
        if !state.managing {
            return false;
        }
        let devices = self.enumerate();
        if devices == state.available {
            return false;
        }
        tracing::info!(
            "Available input devices changed ({} -> {})",
            state.available.len(),
            devices.len()
        );
        state.available = devices;
        true
    }

    fn enumerate(&self) -> Vec<AudioDevice> {
        match self.backend.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Failed to enumerate input devices: {}", e);
                Vec::new()
            }
        }
    }
}
