//! Account-level device management.
//!
//! One [`LockManager`] per authenticated session: it keeps the cache of
//! paired device ids current, receives push-channel events, and fans them
//! out to registered [`DeviceListener`]s. Idempotence lives here: the push
//! channel may replay or reorder notifications, and listeners should see
//! each effective change once.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::api::{CloudApi, DeviceSummary};
use crate::error::AgentError;
use crate::events::{DeviceEvent, DeviceEventKind, DeviceListener};

/// Device cache and push-event dispatcher for one account session.
pub struct LockManager {
    api: Arc<CloudApi>,
    devices: Mutex<HashSet<String>>,
    listeners: Mutex<Vec<Arc<dyn DeviceListener>>>,
}

impl LockManager {
    /// Create a manager over an authenticated API client.
    pub fn new(api: Arc<CloudApi>) -> Self {
        Self {
            api,
            devices: Mutex::new(HashSet::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The API client shared with the per-device agents.
    pub fn api(&self) -> &Arc<CloudApi> {
        &self.api
    }

    /// Refresh the cache of paired devices from the cloud.
    ///
    /// An explicit invalid-session answer surfaces as
    /// [`AgentError::Unauthenticated`], telling the host to re-run pairing
    /// instead of retrying; transport trouble stays a transport error.
    pub async fn update_device_cache(&self) -> Result<Vec<DeviceSummary>, AgentError> {
        let summaries = self.api.fetch_devices().await?;
        let ids: HashSet<String> = summaries.iter().map(|d| d.id.clone()).collect();
        tracing::info!("device cache refreshed: {} paired devices", ids.len());
        *self.devices.lock().expect("device cache lock poisoned") = ids;
        Ok(summaries)
    }

    /// The currently cached set of paired device ids.
    pub fn device_ids(&self) -> HashSet<String> {
        self.devices
            .lock()
            .expect("device cache lock poisoned")
            .clone()
    }

    /// Whether a device id is in the cache.
    pub fn knows_device(&self, device_id: &str) -> bool {
        self.devices
            .lock()
            .expect("device cache lock poisoned")
            .contains(device_id)
    }

    /// Register a listener for device lifecycle events.
    pub fn add_device_listener(&self, listener: Arc<dyn DeviceListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(listener);
    }

    /// Unregister a previously added listener (pointer identity).
    pub fn remove_device_listener(&self, listener: &Arc<dyn DeviceListener>) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Feed one push notification into the manager.
    ///
    /// Idempotent: an `Added` for a known device is downgraded to
    /// `Updated`, a `Removed` for an unknown device is dropped, and an
    /// `Updated` for an unknown device first registers it. Listeners are
    /// invoked after the cache lock is released.
    pub fn handle_event(&self, event: DeviceEvent) {
        let effective = {
            let mut devices = self.devices.lock().expect("device cache lock poisoned");
            match event.kind {
                DeviceEventKind::Added => {
                    if devices.insert(event.device_id.clone()) {
                        Some(DeviceEventKind::Added)
                    } else {
                        tracing::debug!("duplicate add for {}, treating as update", event.device_id);
                        Some(DeviceEventKind::Updated)
                    }
                }
                DeviceEventKind::Removed => {
                    if devices.remove(&event.device_id) {
                        Some(DeviceEventKind::Removed)
                    } else {
                        tracing::debug!("remove for unknown device {}, ignoring", event.device_id);
                        None
                    }
                }
                DeviceEventKind::Updated => {
                    devices.insert(event.device_id.clone());
                    Some(DeviceEventKind::Updated)
                }
            }
        };

        let Some(kind) = effective else {
            return;
        };

        let listeners: Vec<Arc<dyn DeviceListener>> = self
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .clone();
        for listener in &listeners {
            match kind {
                DeviceEventKind::Added => listener.device_added(&event.device_id),
                DeviceEventKind::Removed => listener.device_removed(&event.device_id),
                DeviceEventKind::Updated => listener.device_updated(&event.device_id),
            }
        }
    }
}
