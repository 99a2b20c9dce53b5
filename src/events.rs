//! Inbound device notifications from the vendor's push channel.
//!
//! The push channel itself is opaque to this crate; whatever receives it
//! (MQTT bridge, host framework, test harness) feeds plain
//! [`DeviceEvent`]s into [`crate::manager::LockManager::handle_event`].
//! Events may arrive on any thread and may be duplicated, so handling is
//! idempotent on the receiver side.

/// What happened to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEventKind {
    /// The device was paired to the account.
    Added,
    /// The device was removed from the account.
    Removed,
    /// The device reported new status.
    Updated,
}

/// One push notification about a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device_id: String,
    pub kind: DeviceEventKind,
}

impl DeviceEvent {
    pub fn new(device_id: impl Into<String>, kind: DeviceEventKind) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
        }
    }
}

/// Host hook for device lifecycle notifications.
///
/// Callbacks run on whatever thread delivered the event; implementations
/// dispatch to their own executor if they care.
pub trait DeviceListener: Send + Sync {
    /// A device joined the account.
    fn device_added(&self, device_id: &str);

    /// A device left the account.
    fn device_removed(&self, device_id: &str);

    /// A device reported new status; a poll is worthwhile.
    fn device_updated(&self, device_id: &str);
}
