/// Scriptable in-memory backend.
///
/// Holds drives, devices, and folders whose resolution outcome is set up
/// front (success or a specific [`ResolveError`]) and can be changed while
/// watchers are running. It never touches real hardware. Used by the test
/// suites and by the console's `--simulate` mode.
use super::{LogicalDrive, StorageBackend, StorageDevice};
use crate::error::ResolveError;
use crate::model::{RawDriveType, RootHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Outcome = Result<RootHandle, ResolveError>;

#[derive(Default)]
struct MemoryState {
    drives: Vec<LogicalDrive>,
    folders: HashMap<String, Outcome>,
    devices: Vec<StorageDevice>,
    device_roots: HashMap<String, Outcome>,
    drive_types: HashMap<String, RawDriveType>,
    device_query_error: Option<ResolveError>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    elevated: AtomicBool,
    device_queries: AtomicUsize,
    folder_resolves: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logical drive and what opening its root yields. A
    /// successful root also answers `drive_type` for that root path.
    pub fn with_drive(self, name: &str, raw_type: RawDriveType, root: Outcome) -> Self {
        {
            let mut state = self.state.lock();
            state.drives.push(LogicalDrive::new(name, raw_type));
            if let Ok(handle) = &root {
                state.drive_types.insert(handle.path.clone(), raw_type);
            }
            state.drive_types.insert(name.to_owned(), raw_type);
            state.folders.insert(name.to_owned(), root);
        }
        self
    }

    /// Register a removable device with the root its id resolves to.
    pub fn with_device(self, id: &str, name: &str, root: Outcome) -> Self {
        self.add_device(id, name, root);
        self
    }

    pub fn with_folder(self, path: &str, root: Outcome) -> Self {
        self.set_folder(path, root);
        self
    }

    /// Plug in a device at runtime.
    pub fn add_device(&self, id: &str, name: &str, root: Outcome) {
        let mut state = self.state.lock();
        state.devices.retain(|d| d.id != id);
        state.devices.push(StorageDevice::new(id, name));
        state.device_roots.insert(id.to_owned(), root);
    }

    /// Unplug a device at runtime. Its root stops resolving.
    pub fn remove_device(&self, id: &str) {
        let mut state = self.state.lock();
        state.devices.retain(|d| d.id != id);
        state
            .device_roots
            .insert(id.to_owned(), Err(ResolveError::NotFound(id.to_owned())));
    }

    /// Change what a device id resolves to (media inserted or ejected).
    pub fn set_device_root(&self, id: &str, root: Outcome) {
        self.state.lock().device_roots.insert(id.to_owned(), root);
    }

    pub fn set_folder(&self, path: &str, root: Outcome) {
        self.state.lock().folders.insert(path.to_owned(), root);
    }

    pub fn set_drive_type(&self, path: &str, raw_type: RawDriveType) {
        self.state
            .lock()
            .drive_types
            .insert(path.to_owned(), raw_type);
    }

    /// Make `storage_devices` fail until cleared with `None`.
    pub fn fail_device_query(&self, error: Option<ResolveError>) {
        self.state.lock().device_query_error = error;
    }

    pub fn set_elevated(&self, elevated: bool) {
        self.elevated.store(elevated, Ordering::Relaxed);
    }

    /// How many times `storage_devices` has been called.
    pub fn device_queries(&self) -> usize {
        self.device_queries.load(Ordering::Relaxed)
    }

    /// How many times `resolve_folder` has been called.
    pub fn folder_resolves(&self) -> usize {
        self.folder_resolves.load(Ordering::Relaxed)
    }
}

impl StorageBackend for MemoryBackend {
    fn logical_drives(&self) -> Vec<LogicalDrive> {
        self.state.lock().drives.clone()
    }

    fn storage_devices(&self) -> Result<Vec<StorageDevice>, ResolveError> {
        self.device_queries.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock();
        match &state.device_query_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.devices.clone()),
        }
    }

    fn resolve_folder(&self, path: &str) -> Result<RootHandle, ResolveError> {
        self.folder_resolves.fetch_add(1, Ordering::Relaxed);
        self.state
            .lock()
            .folders
            .get(path)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::NotFound(path.to_owned())))
    }

    fn resolve_device_root(&self, device_id: &str) -> Result<RootHandle, ResolveError> {
        if device_id.is_empty() {
            return Err(ResolveError::InvalidArgument("empty device id".into()));
        }
        self.state
            .lock()
            .device_roots
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| Err(ResolveError::InvalidArgument(device_id.to_owned())))
    }

    fn drive_type(&self, path: &str) -> Result<RawDriveType, ResolveError> {
        self.state
            .lock()
            .drive_types
            .get(path)
            .copied()
            .ok_or_else(|| ResolveError::NotFound(path.to_owned()))
    }

    fn is_elevated(&self) -> bool {
        self.elevated.load(Ordering::Relaxed)
    }
}
