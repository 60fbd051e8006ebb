/// Windows backend using the Win32 storage APIs.
///
/// Logical drives come from `GetLogicalDriveStringsW` / `GetDriveTypeW`.
/// Removable devices are identified by their volume GUID path
/// (`\\?\Volume{...}\`), which stays stable while the drive letter may not.
use super::{LogicalDrive, StorageBackend, StorageDevice};
use crate::error::ResolveError;
use crate::model::{trim_separators, RawDriveType, RootHandle, VolumeSpace};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY};
use windows::Win32::Storage::FileSystem::{
    GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDriveStringsW, GetVolumeInformationW,
    GetVolumeNameForVolumeMountPointW, GetVolumePathNamesForVolumeNameW,
};
use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

const VOLUME_ID_PREFIX: &str = r"\\?\Volume{";

// Win32 error code for "the device is not ready" (empty card reader, no disc).
const ERROR_NOT_READY: i32 = 21;

#[derive(Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Null-terminated UTF-16 copy of `s`.
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn from_wide_nul(buf: &[u16]) -> String {
    let end = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    String::from_utf16_lossy(&buf[..end])
}

/// "C:\" for any path starting with a drive letter.
fn drive_root(path: &str) -> Option<String> {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        Some(format!("{}:\\", (bytes[0] as char).to_ascii_uppercase()))
    } else {
        None
    }
}

fn is_drive_root(path: &str) -> bool {
    trim_separators(path).len() == 2 && drive_root(path).is_some()
}

fn raw_drive_type(root: &str) -> RawDriveType {
    let root_wide = wide(root);
    let raw = unsafe { GetDriveTypeW(PCWSTR(root_wide.as_ptr())) };
    RawDriveType::from_win32(raw)
}

fn volume_label(root: &str) -> Option<String> {
    let root_wide = wide(root);
    let mut label_buf = [0u16; 256];
    let ok = unsafe {
        GetVolumeInformationW(
            PCWSTR(root_wide.as_ptr()),
            Some(&mut label_buf),
            None,
            None,
            None,
            None,
        )
        .is_ok()
    };
    ok.then(|| from_wide_nul(&label_buf))
}

fn volume_space(root: &str) -> Option<VolumeSpace> {
    let root_wide = wide(root);
    let mut free_caller: u64 = 0;
    let mut total: u64 = 0;
    let mut free_total: u64 = 0;
    let ok = unsafe {
        GetDiskFreeSpaceExW(
            PCWSTR(root_wide.as_ptr()),
            Some(&mut free_caller as *mut u64),
            Some(&mut total as *mut u64),
            Some(&mut free_total as *mut u64),
        )
        .is_ok()
    };
    ok.then_some(VolumeSpace {
        total_bytes: total,
        free_bytes: free_caller,
    })
}

fn volume_guid_path(root: &str) -> Option<String> {
    let root_wide = wide(root);
    let mut name_buf = [0u16; 64];
    unsafe { GetVolumeNameForVolumeMountPointW(PCWSTR(root_wide.as_ptr()), &mut name_buf) }
        .ok()
        .map(|_| from_wide_nul(&name_buf))
}

/// First mount path of a volume GUID path, if it is mounted anywhere.
fn first_mount_path(volume_id: &str) -> Option<String> {
    let id_wide = wide(volume_id);
    let mut paths = [0u16; 1024];
    let mut returned: u32 = 0;
    unsafe {
        GetVolumePathNamesForVolumeNameW(
            PCWSTR(id_wide.as_ptr()),
            Some(&mut paths),
            &mut returned,
        )
    }
    .ok()?;
    let first = from_wide_nul(&paths);
    (!first.is_empty()).then_some(first)
}

/// "Data (D:)" or "Local Disk (D:)" for drive roots; the last path
/// component for anything else.
fn display_name(path: &str) -> String {
    if is_drive_root(path) {
        let letter = trim_separators(path).to_ascii_uppercase();
        return match volume_label(path) {
            Some(label) if !label.is_empty() => format!("{label} ({letter})"),
            _ => format!("Local Disk ({letter})"),
        };
    }
    folder_name(path)
}

fn folder_name(path: &str) -> String {
    trim_separators(path)
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or(path)
        .to_owned()
}

fn open_folder(path: &str) -> Result<RootHandle, ResolveError> {
    if let Err(e) = std::fs::read_dir(path) {
        if e.raw_os_error() == Some(ERROR_NOT_READY) {
            return Err(ResolveError::NotFound(path.to_owned()));
        }
        return Err(ResolveError::from_io(path, &e));
    }

    let name = if is_drive_root(path) {
        drive_root(path).unwrap_or_else(|| path.to_owned())
    } else {
        folder_name(path)
    };
    let mut handle = RootHandle::new(path, display_name(path)).with_name(name);
    if let Some(root) = drive_root(path) {
        if let Some(space) = volume_space(&root) {
            handle = handle.with_space(space);
        }
    }
    Ok(handle)
}

fn process_is_elevated() -> bool {
    unsafe {
        let mut token = HANDLE::default();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token).is_err() {
            return false;
        }

        let mut elevation = TOKEN_ELEVATION::default();
        let mut returned = 0u32;
        let result = GetTokenInformation(
            token,
            TokenElevation,
            Some(&mut elevation as *mut _ as *mut _),
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        let _ = CloseHandle(token);

        result.is_ok() && elevation.TokenIsElevated != 0
    }
}

impl StorageBackend for WindowsBackend {
    fn logical_drives(&self) -> Vec<LogicalDrive> {
        // GetLogicalDriveStringsW returns null-separated drive root strings.
        let mut buffer = [0u16; 256];
        let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) };
        if len == 0 {
            tracing::warn!("GetLogicalDriveStringsW returned 0");
            return Vec::new();
        }

        let full = OsString::from_wide(&buffer[..len as usize]);
        full.to_string_lossy()
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(|root| LogicalDrive::new(root, raw_drive_type(root)))
            .collect()
    }

    fn storage_devices(&self) -> Result<Vec<StorageDevice>, ResolveError> {
        let devices = self
            .logical_drives()
            .into_iter()
            .filter(|d| d.raw_type == RawDriveType::Removable)
            .filter_map(|d| match volume_guid_path(&d.name) {
                Some(id) => Some(StorageDevice::new(id, d.name)),
                None => {
                    tracing::debug!("No volume GUID for removable drive {}", d.name);
                    None
                }
            })
            .collect();
        Ok(devices)
    }

    fn resolve_folder(&self, path: &str) -> Result<RootHandle, ResolveError> {
        open_folder(path)
    }

    fn resolve_device_root(&self, device_id: &str) -> Result<RootHandle, ResolveError> {
        if !device_id.starts_with(VOLUME_ID_PREFIX) {
            return Err(ResolveError::InvalidArgument(device_id.to_owned()));
        }
        let mount = first_mount_path(device_id)
            .ok_or_else(|| ResolveError::NotFound(device_id.to_owned()))?;
        open_folder(&mount)
    }

    fn drive_type(&self, path: &str) -> Result<RawDriveType, ResolveError> {
        let root =
            drive_root(path).ok_or_else(|| ResolveError::InvalidArgument(path.to_owned()))?;
        Ok(raw_drive_type(&root))
    }

    fn is_elevated(&self) -> bool {
        process_is_elevated()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_root() {
        assert_eq!(drive_root("c:\\Users").as_deref(), Some("C:\\"));
        assert_eq!(drive_root("\\\\server\\share"), None);
        assert!(is_drive_root("D:\\"));
        assert!(!is_drive_root("D:\\Data"));
    }

    #[test]
    fn test_folder_name() {
        assert_eq!(folder_name("C:\\Users\\me\\OneDrive\\"), "OneDrive");
    }

    #[test]
    fn test_logical_drives_include_system_drive() {
        let drives = WindowsBackend::new().logical_drives();
        assert!(drives.iter().any(|d| d.raw_type == RawDriveType::Fixed));
    }
}
