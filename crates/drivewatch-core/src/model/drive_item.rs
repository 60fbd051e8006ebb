/// A single discovered volume or virtual drive.
///
/// Items are plain data. The registry wraps each one in a shared
/// [`DriveEntry`](crate::registry::DriveEntry) so that in-place updates are
/// visible to anyone holding the handle.
use compact_str::CompactString;
use serde::Serialize;

/// Drive type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DriveType {
    Fixed,
    Removable,
    Network,
    CdRom,
    Ram,
    FloppyDisk,
    NoRootDirectory,
    Unknown,
    VirtualDrive,
}

impl DriveType {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::Removable => "Removable",
            Self::Network => "Network",
            Self::CdRom => "CD-ROM",
            Self::Ram => "RAM disk",
            Self::FloppyDisk => "Floppy",
            Self::NoRootDirectory => "No root",
            Self::Unknown => "Unknown",
            Self::VirtualDrive => "Cloud",
        }
    }
}

/// Capacity of the volume behind a root handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VolumeSpace {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeSpace {
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// An opened reference to a volume's or folder's root directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootHandle {
    /// Full path of the root, e.g. "E:\" or "/media/usb".
    pub path: String,
    /// Folder name as the OS reports it. For drive roots this is the root
    /// itself ("E:\"); device-path matching compares against it.
    pub name: String,
    /// Label shown to users, e.g. "USB Stick (E:)".
    pub display_name: String,
    /// Total/free bytes, when the backend could measure them.
    pub space: Option<VolumeSpace>,
}

impl RootHandle {
    pub fn new(path: impl Into<String>, display_name: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            name: path.clone(),
            path,
            display_name: display_name.into(),
            space: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_space(mut self, space: VolumeSpace) -> Self {
        self.space = Some(space);
        self
    }
}

/// One discovered volume or virtual drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriveItem {
    /// Canonical root path. Trailing separators are trimmed for physical drives.
    pub path: String,
    /// Opaque OS device identifier. Absent for drives found by path and
    /// always absent for virtual drives.
    pub device_id: Option<CompactString>,
    pub drive_type: DriveType,
    pub root: Option<RootHandle>,
    pub display_text: String,
}

impl DriveItem {
    /// A drive found by enumerating logical drive roots.
    pub fn physical(path: &str, drive_type: DriveType, root: Option<RootHandle>) -> Self {
        let path = trim_separators(path).to_owned();
        let display_text = display_text_for(&path, root.as_ref());
        Self {
            path,
            device_id: None,
            drive_type,
            root,
            display_text,
        }
    }

    /// A drive reported by the device watcher. The path comes from the
    /// resolved root and may be empty for devices without a mount point.
    pub fn from_device(device_id: &str, drive_type: DriveType, root: RootHandle) -> Self {
        let path = trim_separators(&root.path).to_owned();
        let display_text = display_text_for(&path, Some(&root));
        Self {
            path,
            device_id: Some(CompactString::new(device_id)),
            drive_type,
            root: Some(root),
            display_text,
        }
    }

    /// A synthetic entry for a cloud-sync provider's local folder.
    pub fn virtual_drive(name: &str, sync_folder: &str, root: Option<RootHandle>) -> Self {
        Self {
            path: sync_folder.to_owned(),
            device_id: None,
            drive_type: DriveType::VirtualDrive,
            root,
            display_text: name.to_owned(),
        }
    }

    /// True when this item carries exactly `device_id`.
    pub fn has_device_id(&self, device_id: &str) -> bool {
        !device_id.is_empty() && self.device_id.as_deref() == Some(device_id)
    }

    /// Swap in a freshly resolved root (or none, after an eject) and
    /// recompute the display text. Virtual drives keep their provider name.
    pub fn refresh_root(&mut self, root: Option<RootHandle>) {
        self.root = root;
        if self.drive_type != DriveType::VirtualDrive {
            self.display_text = display_text_for(&self.path, self.root.as_ref());
        }
    }
}

fn display_text_for(path: &str, root: Option<&RootHandle>) -> String {
    match root {
        Some(r) if !r.display_name.is_empty() => r.display_name.clone(),
        _ => path.to_owned(),
    }
}

/// Trim trailing path separators, never reducing the path to nothing:
/// `"C:\"` becomes `"C:"` but `"/"` stays `"/"`.
pub fn trim_separators(path: &str) -> &str {
    let trimmed = path.trim_end_matches(['\\', '/']);
    if trimmed.is_empty() {
        path
    } else {
        trimmed
    }
}
