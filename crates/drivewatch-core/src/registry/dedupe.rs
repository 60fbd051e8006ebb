/// Identity rule used to decide whether a candidate drive is already known.
///
/// Match by device id first. Otherwise compare paths when the candidate
/// has one; a candidate without a path falls back to checking whether an
/// entry's path contains the device name. Paths compare in their
/// normalised form, so `e:\` and `E:` are the same drive.
use crate::model::{trim_separators, DriveItem};
use crate::resolver::normalize_path;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveMatch {
    device_id: Option<String>,
    path: String,
    name: String,
}

impl DriveMatch {
    /// Path-only match, used by startup enumeration.
    pub fn by_path(path: &str) -> Self {
        Self {
            device_id: None,
            path: trim_separators(path).to_owned(),
            name: String::new(),
        }
    }

    /// Device-id match only, with no path fallback.
    pub fn by_device_id(device_id: &str) -> Self {
        Self {
            device_id: Some(device_id.to_owned()),
            path: String::new(),
            name: String::new(),
        }
    }

    /// Full rule for a device reported by a watcher.
    pub fn for_device(device_id: &str, path: &str, name: &str) -> Self {
        Self {
            device_id: Some(device_id.to_owned()),
            path: trim_separators(path).to_owned(),
            name: name.to_owned(),
        }
    }

    /// Full rule built from the identifying fields of `item`.
    pub fn for_item(item: &DriveItem) -> Self {
        Self {
            device_id: item.device_id.as_ref().map(|id| id.to_string()),
            path: item.path.clone(),
            name: item
                .root
                .as_ref()
                .map(|r| r.name.clone())
                .unwrap_or_default(),
        }
    }

    pub fn matches(&self, item: &DriveItem) -> bool {
        if let Some(id) = self.device_id.as_deref() {
            if item.has_device_id(id) {
                return true;
            }
        }
        if !self.path.is_empty() {
            return normalize_path(&item.path) == normalize_path(&self.path);
        }
        !self.name.is_empty() && !item.path.is_empty() && item.path.contains(self.name.as_str())
    }
}
