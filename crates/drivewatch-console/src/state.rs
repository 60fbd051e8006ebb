/// Console view state.
///
/// Holds the rows currently shown and reconciles them against a registry
/// snapshot whenever the change signal fires. Rows are keyed by
/// [`DriveKey`], so an entry refreshed in place (media eject / insert)
/// keeps its row and only its text changes.
use chrono::{DateTime, Local};
use drivewatch_core::model::VolumeSpace;
use drivewatch_core::registry::DriveEntry;
use drivewatch_core::{DriveKey, DriveType};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Shown once when only removable media could be listed.
pub const CONSENT_HINT: &str = "Some drives could not be opened (access denied). \
Re-run from an elevated prompt to list them.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleRow {
    #[serde(skip)]
    pub key: DriveKey,
    pub drive_type: DriveType,
    pub path: String,
    pub label: String,
    pub device_id: Option<String>,
    pub space: Option<VolumeSpace>,
    pub updated_at: DateTime<Local>,
}

impl ConsoleRow {
    pub fn from_entry(entry: &DriveEntry) -> Self {
        let item = entry.item();
        Self {
            key: entry.key(),
            drive_type: item.drive_type,
            path: item.path,
            label: item.display_text,
            device_id: item.device_id.map(|id| id.to_string()),
            space: item.root.and_then(|r| r.space),
            updated_at: entry.updated_at(),
        }
    }
}

/// What a reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

impl ReconcileSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.updated == 0
    }
}

#[derive(Debug, Default)]
pub struct ConsoleState {
    pub rows: Vec<ConsoleRow>,
    consent_hint_shown: bool,
}

impl ConsoleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the rows in line with `snapshot`: new keys are appended, keys
    /// no longer present are dropped, rows whose entry changed are
    /// refreshed. Row order follows the snapshot.
    pub fn reconcile(&mut self, snapshot: &[Arc<DriveEntry>]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        let live: HashSet<DriveKey> = snapshot.iter().map(|e| e.key()).collect();

        let before = self.rows.len();
        self.rows.retain(|row| live.contains(&row.key));
        summary.removed = before - self.rows.len();

        let mut next = Vec::with_capacity(snapshot.len());
        for entry in snapshot {
            let fresh = ConsoleRow::from_entry(entry);
            match self.rows.iter().find(|row| row.key == fresh.key) {
                Some(existing) if *existing == fresh => {}
                Some(_) => summary.updated += 1,
                None => summary.added += 1,
            }
            next.push(fresh);
        }
        self.rows = next;
        summary
    }

    /// The consent hint, the first time the manager asks for it.
    pub fn consent_hint(&mut self, requested: bool) -> Option<&'static str> {
        if requested && !self.consent_hint_shown {
            self.consent_hint_shown = true;
            Some(CONSENT_HINT)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_hint_once() {
        let mut state = ConsoleState::new();
        assert_eq!(state.consent_hint(false), None);
        assert_eq!(state.consent_hint(true), Some(CONSENT_HINT));
        assert_eq!(state.consent_hint(true), None);
    }

    #[test]
    fn test_empty_snapshot_is_noop() {
        let mut state = ConsoleState::new();
        assert!(state.reconcile(&[]).is_empty());
        assert!(state.rows.is_empty());
    }
}
