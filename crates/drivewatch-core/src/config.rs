/// Subsystem configuration, passed explicitly into [`DriveManager`](crate::DriveManager).
///
/// Loaded from a JSON file; every field has a default so a partial file
/// (or none at all) is valid.
use crate::error::{DriveError, Result};
use crate::providers::CloudProvider;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveWatchConfig {
    /// How often the native watcher re-queries the device list.
    pub poll_interval_ms: u64,
    /// Window in which bursts of change notifications are coalesced.
    pub notify_debounce_ms: u64,
    /// Capacity of the unified watch-event channel.
    pub event_channel_capacity: usize,
    /// Drive roots never listed as physical drives (e.g. a cloud client's
    /// mounted letter, which is listed as a virtual drive instead).
    pub excluded_roots: Vec<String>,
    /// Cloud-sync providers surfaced as virtual drives.
    pub cloud_providers: Vec<CloudProvider>,
}

impl Default for DriveWatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            notify_debounce_ms: 50,
            event_channel_capacity: 256,
            excluded_roots: Vec::new(),
            cloud_providers: Vec::new(),
        }
    }
}

impl DriveWatchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(DriveError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(DriveError::Config(
                "event_channel_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn notify_debounce(&self) -> Duration {
        Duration::from_millis(self.notify_debounce_ms)
    }
}
