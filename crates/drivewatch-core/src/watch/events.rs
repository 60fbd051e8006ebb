/// Events flowing into the watch engine.
///
/// The native watcher and the helper bridge feed the same channel; every
/// device event is tagged with where it came from because bridge `Added`
/// events reconcile differently from native ones.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceEventKind {
    /// A device appeared.
    Added,
    /// A device went away.
    Removed,
    /// Media was inserted into an already-present device.
    Inserted,
    /// Media was ejected; the device itself stays.
    Ejected,
}

/// A device event as reported by a watcher or the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub kind: DeviceEventKind,
    pub device_id: String,
}

impl DeviceEvent {
    pub fn new(kind: DeviceEventKind, device_id: impl Into<String>) -> Self {
        Self {
            kind,
            device_id: device_id.into(),
        }
    }

    pub fn added(device_id: impl Into<String>) -> Self {
        Self::new(DeviceEventKind::Added, device_id)
    }

    pub fn removed(device_id: impl Into<String>) -> Self {
        Self::new(DeviceEventKind::Removed, device_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    Native,
    Bridge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Device {
        event: DeviceEvent,
        source: Provenance,
    },
    /// The native watcher finished reporting the devices present at start.
    EnumerationCompleted,
}

impl WatchEvent {
    pub fn native(event: DeviceEvent) -> Self {
        Self::Device {
            event,
            source: Provenance::Native,
        }
    }

    pub fn bridge(event: DeviceEvent) -> Self {
        Self::Device {
            event,
            source: Provenance::Bridge,
        }
    }
}
