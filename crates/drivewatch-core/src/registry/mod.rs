/// The drive registry: the single source of truth for discovered drives.
///
/// Entries are shared handles (`Arc<DriveEntry>`) with a stable
/// [`DriveKey`]. Insert/eject events update an entry in place, so anyone
/// holding a handle sees the change without re-querying.
///
/// # Locking
///
/// One `Mutex` guards the ordered handle list. It is held only for the
/// list operation itself, never across backend I/O: callers resolve roots
/// first, then take the lock to check membership and insert in the same
/// critical section. Each entry's fields sit behind their own `RwLock`;
/// the lock order is always registry → entry, never the reverse.
pub mod dedupe;

pub use dedupe::DriveMatch;

use crate::model::{DriveItem, DriveType};
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Stable identity of a registry entry. Never reused within a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriveKey(pub u64);

struct EntryState {
    item: DriveItem,
    updated_at: DateTime<Local>,
}

/// A registry entry. Fields are read through copies; mutation goes through
/// the registry.
pub struct DriveEntry {
    key: DriveKey,
    state: RwLock<EntryState>,
}

impl DriveEntry {
    fn new(key: DriveKey, item: DriveItem) -> Self {
        Self {
            key,
            state: RwLock::new(EntryState {
                item,
                updated_at: Local::now(),
            }),
        }
    }

    pub fn key(&self) -> DriveKey {
        self.key
    }

    /// Copy of the current item.
    pub fn item(&self) -> DriveItem {
        self.state.read().item.clone()
    }

    pub fn path(&self) -> String {
        self.state.read().item.path.clone()
    }

    pub fn device_id(&self) -> Option<String> {
        self.state.read().item.device_id.as_ref().map(|id| id.to_string())
    }

    pub fn drive_type(&self) -> DriveType {
        self.state.read().item.drive_type
    }

    pub fn display_text(&self) -> String {
        self.state.read().item.display_text.clone()
    }

    /// Wall-clock time of insertion or of the last in-place update.
    pub fn updated_at(&self) -> DateTime<Local> {
        self.state.read().updated_at
    }

    fn matches(&self, rule: &DriveMatch) -> bool {
        rule.matches(&self.state.read().item)
    }

    fn update(&self, f: impl FnOnce(&mut DriveItem)) {
        let mut state = self.state.write();
        f(&mut state.item);
        state.updated_at = Local::now();
    }
}

impl std::fmt::Debug for DriveEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriveEntry")
            .field("key", &self.key)
            .field("item", &self.state.read().item)
            .finish()
    }
}

/// Result of a deduplicating insert.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    /// The candidate was new and is now registered.
    Inserted(Arc<DriveEntry>),
    /// An entry matching the candidate already existed; nothing changed.
    Existing(Arc<DriveEntry>),
}

impl AddOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }

    pub fn entry(&self) -> &Arc<DriveEntry> {
        match self {
            Self::Inserted(e) | Self::Existing(e) => e,
        }
    }
}

struct RegistryInner {
    entries: Vec<Arc<DriveEntry>>,
    next_key: u64,
}

impl RegistryInner {
    fn insert(&mut self, mut item: DriveItem) -> Arc<DriveEntry> {
        if item.drive_type == DriveType::VirtualDrive {
            item.device_id = None;
        }
        let key = DriveKey(self.next_key);
        self.next_key += 1;
        let entry = Arc::new(DriveEntry::new(key, item));
        self.entries.push(Arc::clone(&entry));
        entry
    }

    fn find(&self, rule: &DriveMatch) -> Option<&Arc<DriveEntry>> {
        self.entries.iter().find(|e| e.matches(rule))
    }
}

/// Concurrency-safe, ordered collection of discovered drives.
pub struct DriveRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for DriveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: Vec::new(),
                next_key: 1,
            }),
        }
    }

    /// Copy of the handle list in insertion order. Safe to iterate without
    /// holding the registry lock.
    pub fn snapshot(&self) -> Vec<Arc<DriveEntry>> {
        self.inner.lock().entries.clone()
    }

    /// Copies of every item in insertion order.
    pub fn items(&self) -> Vec<DriveItem> {
        self.snapshot().iter().map(|e| e.item()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Insert `item` unless an entry already matches it under the full
    /// dedupe rule. The check and the insert share one critical section.
    pub fn add(&self, item: DriveItem) -> AddOutcome {
        let rule = DriveMatch::for_item(&item);
        self.add_if_absent(item, &rule)
    }

    /// Insert `item` unless an entry matches `rule`.
    pub fn add_if_absent(&self, item: DriveItem, rule: &DriveMatch) -> AddOutcome {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.find(rule) {
            return AddOutcome::Existing(Arc::clone(existing));
        }
        AddOutcome::Inserted(inner.insert(item))
    }

    /// Insert `item` unless an entry matches `rule`; otherwise apply `f` to
    /// the existing entry in place. Both paths share one critical section.
    pub fn add_or_update(
        &self,
        item: DriveItem,
        rule: &DriveMatch,
        f: impl FnOnce(&mut DriveItem),
    ) -> AddOutcome {
        let mut inner = self.inner.lock();
        if let Some(existing) = inner.find(rule) {
            existing.update(f);
            return AddOutcome::Existing(Arc::clone(existing));
        }
        AddOutcome::Inserted(inner.insert(item))
    }

    /// Insert without any membership check (virtual drives).
    pub fn push(&self, item: DriveItem) -> Arc<DriveEntry> {
        self.inner.lock().insert(item)
    }

    pub fn get(&self, key: DriveKey) -> Option<Arc<DriveEntry>> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| e.key == key)
            .cloned()
    }

    pub fn find(&self, mut pred: impl FnMut(&DriveItem) -> bool) -> Option<Arc<DriveEntry>> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|e| pred(&e.state.read().item))
            .cloned()
    }

    pub fn find_match(&self, rule: &DriveMatch) -> Option<Arc<DriveEntry>> {
        self.inner.lock().find(rule).cloned()
    }

    /// Apply `f` in place to the first entry matching `rule`. Returns the
    /// updated handle, or `None` when nothing matched.
    pub fn update_match(
        &self,
        rule: &DriveMatch,
        f: impl FnOnce(&mut DriveItem),
    ) -> Option<Arc<DriveEntry>> {
        let inner = self.inner.lock();
        let entry = inner.find(rule)?;
        entry.update(f);
        Some(Arc::clone(entry))
    }

    /// Remove every entry for which `pred` holds. Returns how many were removed.
    pub fn remove_where(&self, mut pred: impl FnMut(&DriveItem) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|e| !pred(&e.state.read().item));
        before - inner.entries.len()
    }

    /// Remove every entry carrying `device_id`.
    pub fn remove_device(&self, device_id: &str) -> usize {
        self.remove_where(|item| item.has_device_id(device_id))
    }

    /// True when any entry satisfies `pred`.
    pub fn any(&self, mut pred: impl FnMut(&DriveItem) -> bool) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|e| pred(&e.state.read().item))
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}
