/// Linux backend built on `/proc/self/mounts` and `/sys/block`.
///
/// Every real mount (block device, network share, optical disc, RAM disk
/// under `/mnt` or `/media`) is a logical drive. Removable block devices are
/// identified by their `/dev` node, e.g. `/dev/sdb1`.
use super::{LogicalDrive, StorageBackend, StorageDevice};
use crate::error::ResolveError;
use crate::model::{trim_separators, RawDriveType, RootHandle, VolumeSpace};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const NETWORK_FS: &[&str] = &[
    "nfs",
    "nfs4",
    "cifs",
    "smb3",
    "smbfs",
    "9p",
    "afs",
    "ceph",
    "glusterfs",
    "fuse.sshfs",
];
const OPTICAL_FS: &[&str] = &["iso9660", "udf"];
const RAM_FS: &[&str] = &["tmpfs", "ramfs"];
const HIDDEN_PREFIXES: &[&str] = &["/proc", "/sys", "/dev", "/run", "/snap", "/var/lib/docker"];
const VISIBLE_PREFIXES: &[&str] = &["/run/media", "/media", "/mnt"];

/// One line of a mounts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fstype: String,
}

/// Parse `/proc/mounts` format. Octal escapes (`\040` for a space) in the
/// source and target fields are decoded. Malformed lines are skipped.
pub fn parse_mounts(text: &str) -> Vec<MountEntry> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fstype = fields.next()?;
            Some(MountEntry {
                source: unescape(source),
                target: unescape(target),
                fstype: fstype.to_owned(),
            })
        })
        .collect()
}

fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 4])
                .ok()
                .and_then(|octal| u8::from_str_radix(octal, 8).ok());
            if let Some(value) = decoded {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whole-disk name of a partition: `sdb1` → `sdb`, `nvme0n1p2` → `nvme0n1`,
/// `mmcblk0p1` → `mmcblk0`.
pub fn base_disk(name: &str) -> &str {
    let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        if trimmed.len() < name.len() {
            if let Some(disk) = trimmed.strip_suffix('p') {
                return disk;
            }
        }
        return name;
    }
    trimmed
}

fn is_visible_target(target: &str) -> bool {
    if VISIBLE_PREFIXES.iter().any(|p| target.starts_with(p)) {
        return true;
    }
    !HIDDEN_PREFIXES
        .iter()
        .any(|p| target == *p || target.starts_with(&format!("{p}/")))
}

pub struct LinuxBackend {
    mounts_path: PathBuf,
    sys_block: PathBuf,
}

impl Default for LinuxBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::with_paths("/proc/self/mounts", "/sys/block")
    }

    /// Read the mount table and block-device attributes from other
    /// locations (fixtures, containers with a relocated `/sys`).
    pub fn with_paths(mounts_path: impl Into<PathBuf>, sys_block: impl Into<PathBuf>) -> Self {
        Self {
            mounts_path: mounts_path.into(),
            sys_block: sys_block.into(),
        }
    }

    fn mounts(&self) -> Result<Vec<MountEntry>, ResolveError> {
        let text = fs::read_to_string(&self.mounts_path)
            .map_err(|e| ResolveError::from_io(&self.mounts_path.to_string_lossy(), &e))?;
        Ok(parse_mounts(&text))
    }

    fn is_removable(&self, disk: &str) -> bool {
        fs::read_to_string(self.sys_block.join(disk).join("removable"))
            .map(|content| content.trim() == "1")
            .unwrap_or(false)
    }

    /// Raw type of a mount, or `None` for pseudo filesystems.
    fn raw_type_of(&self, entry: &MountEntry) -> Option<RawDriveType> {
        let fstype = entry.fstype.as_str();
        if NETWORK_FS.contains(&fstype) {
            return Some(RawDriveType::Network);
        }
        if OPTICAL_FS.contains(&fstype) {
            return Some(RawDriveType::CdRom);
        }
        if RAM_FS.contains(&fstype) {
            let user_mount = VISIBLE_PREFIXES.iter().any(|p| entry.target.starts_with(p));
            return user_mount.then_some(RawDriveType::Ram);
        }
        let dev = entry.source.strip_prefix("/dev/")?;
        if dev.starts_with("loop") || dev.starts_with("zram") {
            return None;
        }
        if self.is_removable(base_disk(dev)) {
            Some(RawDriveType::Removable)
        } else {
            Some(RawDriveType::Fixed)
        }
    }

    fn visible_mounts(&self) -> Result<Vec<(MountEntry, RawDriveType)>, ResolveError> {
        let mut seen = HashSet::new();
        let mounts = self
            .mounts()?
            .into_iter()
            .filter(|m| is_visible_target(&m.target))
            .filter_map(|m| self.raw_type_of(&m).map(|t| (m, t)))
            .filter(|(m, _)| seen.insert(m.target.clone()))
            .collect();
        Ok(mounts)
    }

    fn open_folder(&self, path: &str) -> Result<RootHandle, ResolveError> {
        fs::read_dir(path).map_err(|e| ResolveError::from_io(path, &e))?;

        let name = folder_name(path);
        let display = if path == "/" {
            "File System".to_owned()
        } else {
            name.clone()
        };
        let mut handle = RootHandle::new(path, display).with_name(name);
        if let Some(space) = volume_space(Path::new(path)) {
            handle = handle.with_space(space);
        }
        Ok(handle)
    }
}

fn folder_name(path: &str) -> String {
    let trimmed = trim_separators(path);
    if trimmed == "/" {
        return trimmed.to_owned();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_owned()
}

fn volume_space(path: &Path) -> Option<VolumeSpace> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    let fragment = stat.fragment_size() as u64;
    Some(VolumeSpace {
        total_bytes: stat.blocks() as u64 * fragment,
        free_bytes: stat.blocks_available() as u64 * fragment,
    })
}

impl StorageBackend for LinuxBackend {
    fn logical_drives(&self) -> Vec<LogicalDrive> {
        match self.visible_mounts() {
            Ok(mounts) => mounts
                .into_iter()
                .map(|(m, t)| LogicalDrive::new(m.target, t))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to read mount table: {e}");
                Vec::new()
            }
        }
    }

    fn storage_devices(&self) -> Result<Vec<StorageDevice>, ResolveError> {
        Ok(self
            .visible_mounts()?
            .into_iter()
            .filter(|(_, t)| *t == RawDriveType::Removable)
            .map(|(m, _)| StorageDevice::new(m.source, m.target))
            .collect())
    }

    fn resolve_folder(&self, path: &str) -> Result<RootHandle, ResolveError> {
        self.open_folder(path)
    }

    fn resolve_device_root(&self, device_id: &str) -> Result<RootHandle, ResolveError> {
        if !device_id.starts_with("/dev/") {
            return Err(ResolveError::InvalidArgument(device_id.to_owned()));
        }
        let target = self
            .mounts()?
            .into_iter()
            .find(|m| m.source == device_id)
            .map(|m| m.target)
            .ok_or_else(|| ResolveError::NotFound(device_id.to_owned()))?;
        self.open_folder(&target)
    }

    fn drive_type(&self, path: &str) -> Result<RawDriveType, ResolveError> {
        let path = trim_separators(path);
        self.visible_mounts()?
            .into_iter()
            .filter(|(m, _)| {
                m.target == "/"
                    || path == m.target
                    || path.starts_with(&format!("{}/", m.target))
            })
            .max_by_key(|(m, _)| m.target.len())
            .map(|(_, t)| t)
            .ok_or_else(|| ResolveError::NotFound(path.to_owned()))
    }

    fn is_elevated(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid 0 0
proc /proc proc rw 0 0
/dev/nvme0n1p2 / ext4 rw,relatime 0 0
/dev/nvme0n1p1 /boot/efi vfat rw 0 0
/dev/sdb1 /media/me/USB\\040STICK vfat rw 0 0
/dev/loop3 /snap/core/1 squashfs ro 0 0
server:/export /mnt/nfs nfs4 rw 0 0
tmpfs /run/user/1000 tmpfs rw 0 0
/dev/sr0 /media/me/DISC iso9660 ro 0 0
";

    fn fixture() -> (TempDir, LinuxBackend) {
        let tmp = TempDir::new().unwrap();
        let mounts = tmp.path().join("mounts");
        fs::write(&mounts, MOUNTS).unwrap();
        let sys_block = tmp.path().join("block");
        for (disk, removable) in [("nvme0n1", "0"), ("sdb", "1"), ("sr0", "1")] {
            fs::create_dir_all(sys_block.join(disk)).unwrap();
            fs::write(sys_block.join(disk).join("removable"), removable).unwrap();
        }
        let backend = LinuxBackend::with_paths(mounts, sys_block);
        (tmp, backend)
    }

    #[test]
    fn test_parse_mounts_unescapes_spaces() {
        let entries = parse_mounts(MOUNTS);
        assert!(entries
            .iter()
            .any(|e| e.target == "/media/me/USB STICK" && e.source == "/dev/sdb1"));
    }

    #[test]
    fn test_base_disk() {
        assert_eq!(base_disk("sdb1"), "sdb");
        assert_eq!(base_disk("sdb"), "sdb");
        assert_eq!(base_disk("nvme0n1p2"), "nvme0n1");
        assert_eq!(base_disk("nvme0n1"), "nvme0n1");
        assert_eq!(base_disk("mmcblk0p1"), "mmcblk0");
    }

    #[test]
    fn test_logical_drives_skip_pseudo_filesystems() {
        let (_tmp, backend) = fixture();
        let drives = backend.logical_drives();
        let names: Vec<&str> = drives.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["/", "/boot/efi", "/media/me/USB STICK", "/mnt/nfs", "/media/me/DISC"]
        );

        let usb = drives.iter().find(|d| d.name == "/media/me/USB STICK").unwrap();
        assert_eq!(usb.raw_type, RawDriveType::Removable);
        let nfs = drives.iter().find(|d| d.name == "/mnt/nfs").unwrap();
        assert_eq!(nfs.raw_type, RawDriveType::Network);
        let disc = drives.iter().find(|d| d.name == "/media/me/DISC").unwrap();
        assert_eq!(disc.raw_type, RawDriveType::CdRom);
    }

    #[test]
    fn test_storage_devices_lists_removable_block_devices() {
        let (_tmp, backend) = fixture();
        let devices = backend.storage_devices().unwrap();
        assert_eq!(
            devices,
            vec![StorageDevice::new("/dev/sdb1", "/media/me/USB STICK")]
        );
    }

    #[test]
    fn test_drive_type_uses_longest_mount_prefix() {
        let (_tmp, backend) = fixture();
        assert_eq!(
            backend.drive_type("/media/me/USB STICK/photos"),
            Ok(RawDriveType::Removable)
        );
        assert_eq!(backend.drive_type("/home/me"), Ok(RawDriveType::Fixed));
    }

    #[test]
    fn test_resolve_device_root_rejects_non_dev_ids() {
        let (_tmp, backend) = fixture();
        assert!(matches!(
            backend.resolve_device_root("usb-stick"),
            Err(ResolveError::InvalidArgument(_))
        ));
        assert!(matches!(
            backend.resolve_device_root("/dev/sdz9"),
            Err(ResolveError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_folder_reports_space() {
        let (tmp, backend) = fixture();
        let path = tmp.path().to_string_lossy().into_owned();
        let root = backend.resolve_folder(&path).unwrap();
        assert_eq!(root.path, path);
        assert!(root.space.is_some());
    }

    #[test]
    fn test_resolve_folder_missing_is_not_found() {
        let (tmp, backend) = fixture();
        let missing = tmp.path().join("gone").to_string_lossy().into_owned();
        assert!(matches!(
            backend.resolve_folder(&missing),
            Err(ResolveError::NotFound(_))
        ));
    }
}
