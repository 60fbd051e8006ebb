/// Platform seam: drive enumeration, device queries, and folder resolution.
///
/// Everything that touches the operating system goes through
/// [`StorageBackend`]. The Windows and Linux backends talk to the real OS;
/// [`memory::MemoryBackend`] is scripted and drives the tests and the
/// console's simulate mode.
pub mod memory;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

use crate::error::ResolveError;
use crate::model::{RawDriveType, RootHandle};
use std::sync::Arc;

/// A logical drive root as listed by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalDrive {
    /// Root name, e.g. "C:\" or "/media/usb".
    pub name: String,
    pub raw_type: RawDriveType,
}

impl LogicalDrive {
    pub fn new(name: impl Into<String>, raw_type: RawDriveType) -> Self {
        Self {
            name: name.into(),
            raw_type,
        }
    }
}

/// A removable storage device known to the OS device-information store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageDevice {
    /// Opaque device identifier (volume GUID path, `/dev` node, ...).
    pub id: String,
    /// Device display name as the OS reports it.
    pub name: String,
}

impl StorageDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// OS operations the subsystem depends on. All calls may block; none are
/// made while the registry lock is held.
pub trait StorageBackend: Send + Sync {
    /// Every logical drive root currently visible. Synchronous and cheap.
    fn logical_drives(&self) -> Vec<LogicalDrive>;

    /// Removable storage devices from the device-information store.
    fn storage_devices(&self) -> Result<Vec<StorageDevice>, ResolveError>;

    /// Open an arbitrary folder (drive root, UNC server, sync folder).
    fn resolve_folder(&self, path: &str) -> Result<RootHandle, ResolveError>;

    /// Open the root folder of a device by its identifier.
    fn resolve_device_root(&self, device_id: &str) -> Result<RootHandle, ResolveError>;

    /// Raw drive type of the drive owning `path`.
    fn drive_type(&self, path: &str) -> Result<RawDriveType, ResolveError>;

    /// Whether the process already runs with elevated rights.
    fn is_elevated(&self) -> bool {
        false
    }
}

/// The backend for the current OS. Platforms without one get an empty
/// in-memory backend.
pub fn default_backend() -> Arc<dyn StorageBackend> {
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsBackend::new())
    }
    #[cfg(target_os = "linux")]
    {
        Arc::new(linux::LinuxBackend::new())
    }
    #[cfg(not(any(windows, target_os = "linux")))]
    {
        tracing::warn!("No native storage backend for this platform; using an empty one");
        Arc::new(memory::MemoryBackend::new())
    }
}
