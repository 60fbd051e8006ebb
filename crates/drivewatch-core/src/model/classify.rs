/// Drive classification: maps the raw OS drive-type signal to [`DriveType`].
///
/// Pure and total: every raw value maps to exactly one domain type.
use super::drive_item::{trim_separators, DriveType};

// Drive type constants from the Windows API (`GetDriveTypeW`).
const DRIVE_UNKNOWN_VAL: u32 = 0;
const DRIVE_NO_ROOT_DIR_VAL: u32 = 1;
const DRIVE_REMOVABLE_VAL: u32 = 2;
const DRIVE_FIXED_VAL: u32 = 3;
const DRIVE_REMOTE_VAL: u32 = 4;
const DRIVE_CDROM_VAL: u32 = 5;
const DRIVE_RAMDISK_VAL: u32 = 6;

/// Drive type as reported by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawDriveType {
    Unknown,
    NoRootDirectory,
    Removable,
    Fixed,
    Network,
    CdRom,
    Ram,
}

impl RawDriveType {
    /// Map a `GetDriveTypeW` return code. Out-of-range values are `Unknown`.
    pub fn from_win32(value: u32) -> Self {
        match value {
            DRIVE_UNKNOWN_VAL => Self::Unknown,
            DRIVE_NO_ROOT_DIR_VAL => Self::NoRootDirectory,
            DRIVE_REMOVABLE_VAL => Self::Removable,
            DRIVE_FIXED_VAL => Self::Fixed,
            DRIVE_REMOTE_VAL => Self::Network,
            DRIVE_CDROM_VAL => Self::CdRom,
            DRIVE_RAMDISK_VAL => Self::Ram,
            _ => Self::Unknown,
        }
    }
}

/// Classify a drive. `path` is the drive root; `A:` and `B:` fixed drives
/// are floppy disks.
pub fn classify(raw: RawDriveType, path: &str) -> DriveType {
    match raw {
        RawDriveType::Fixed if is_floppy_letter(path) => DriveType::FloppyDisk,
        RawDriveType::Fixed => DriveType::Fixed,
        RawDriveType::Removable => DriveType::Removable,
        RawDriveType::Network => DriveType::Network,
        RawDriveType::CdRom => DriveType::CdRom,
        RawDriveType::Ram => DriveType::Ram,
        RawDriveType::NoRootDirectory => DriveType::NoRootDirectory,
        RawDriveType::Unknown => DriveType::Unknown,
    }
}

fn is_floppy_letter(path: &str) -> bool {
    let root = trim_separators(path);
    root.eq_ignore_ascii_case("A:") || root.eq_ignore_ascii_case("B:")
}
