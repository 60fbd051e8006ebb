/// Path → owning root resolution for paths the generic folder API cannot
/// open directly.
///
/// Two shapes are handled here:
///
/// - **Device paths** (`\\?\USBSTOR#...\photos`, `\\?\E:\photos`): the root
///   is looked up in the registry first, then among the removable storage
///   devices by name.
/// - **UNC paths** (`\\server\share\sub`): the share segment is stripped and
///   the server root (`\\server`) is opened.
///
/// Ordinary drive-letter paths resolve elsewhere and yield `None`.
use crate::model::{trim_separators, RootHandle};
use crate::platform::StorageBackend;
use crate::registry::DriveRegistry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Prefix of Win32 device / long paths.
pub const LONG_PATH_PREFIX: &str = r"\\?\";

const UNC_PREFIX: &str = r"\\";

/// Root segment of an absolute path, `None` for relative paths.
///
/// `C:\a\b` → `C:\`, `\\server\share\a` → `\\server\share`,
/// `\\?\USBSTOR#1\a` → `\\?\USBSTOR#1\`, `/mnt/a` → `/`.
pub fn path_root(path: &str) -> Option<&str> {
    if let Some(rest) = path.strip_prefix(LONG_PATH_PREFIX) {
        if rest.is_empty() {
            return None;
        }
        let end = rest
            .find('\\')
            .map(|i| LONG_PATH_PREFIX.len() + i + 1)
            .unwrap_or(path.len());
        return Some(&path[..end]);
    }
    if let Some(rest) = path.strip_prefix(UNC_PREFIX) {
        let mut segments = rest.splitn(3, '\\');
        let server = segments.next().filter(|s| !s.is_empty())?;
        let end = match segments.next().filter(|s| !s.is_empty()) {
            Some(share) => UNC_PREFIX.len() + server.len() + 1 + share.len(),
            None => UNC_PREFIX.len() + server.len(),
        };
        return Some(&path[..end]);
    }
    let bytes = path.as_bytes();
    if bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/')
    {
        return Some(&path[..3]);
    }
    if path.starts_with('/') {
        return Some(&path[..1]);
    }
    None
}

pub fn is_rooted(path: &str) -> bool {
    path_root(path).is_some()
}

/// Comparison form of a path: trailing separators trimmed, forward slashes
/// turned into backslashes, upper-cased.
pub fn normalize_path(path: &str) -> String {
    trim_separators(path).replace('/', "\\").to_uppercase()
}

pub struct PathRootResolver {
    registry: Arc<DriveRegistry>,
    backend: Arc<dyn StorageBackend>,
}

impl PathRootResolver {
    pub fn new(registry: Arc<DriveRegistry>, backend: Arc<dyn StorageBackend>) -> Self {
        Self { registry, backend }
    }

    /// Resolve `path` to the root folder that owns it, or `None`.
    pub fn resolve_root(&self, path: &str) -> Option<RootHandle> {
        let Some(root) = path_root(path) else {
            debug!("Not resolving relative path {path:?}");
            return None;
        };

        if root.starts_with(LONG_PATH_PREFIX) {
            self.resolve_device_path(root)
        } else if root.starts_with(UNC_PREFIX) {
            self.resolve_network_share(root)
        } else {
            None
        }
    }

    fn resolve_device_path(&self, root: &str) -> Option<RootHandle> {
        let normalized = normalize_path(root);
        let bare = normalize_path(&root[LONG_PATH_PREFIX.len()..]);

        let known = self.registry.snapshot().into_iter().find_map(|entry| {
            let item = entry.item();
            let path = normalize_path(&item.path);
            if path == normalized || path == bare {
                item.root
            } else {
                None
            }
        });
        if known.is_some() {
            return known;
        }

        let devices = match self.backend.storage_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device lookup for {root} failed: {e}");
                return None;
            }
        };
        for device in devices {
            match self.backend.resolve_device_root(&device.id) {
                Ok(handle) if normalize_path(&handle.name) == bare => return Some(handle),
                Ok(_) => {}
                Err(e) => debug!("Skipping device {} while resolving {root}: {e}", device.id),
            }
        }
        debug!("No removable device matches {root}");
        None
    }

    fn resolve_network_share(&self, root: &str) -> Option<RootHandle> {
        let server = match root.rfind('\\') {
            Some(i) if i > 1 => &root[..i],
            _ => root,
        };
        match self.backend.resolve_folder(server) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to open network root {server}: {e}");
                None
            }
        }
    }
}
