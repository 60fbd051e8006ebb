/// Device watch engine: keeps the registry in step with device arrivals,
/// departures, and media changes after startup.
///
/// Two producers feed one bounded channel:
///
/// - the native watcher ([`poller`]), which polls the backend's device list;
/// - the helper bridge ([`bridge`]), which forwards events the native
///   watcher cannot see (media insert / eject).
///
/// A dispatcher thread drains the channel and applies each event to the
/// registry, then signals the [`ChangeNotifier`]. Handlers are plain `&self`
/// methods and may also be called directly from any thread via
/// [`DeviceWatchEngine::handle_event`].
///
/// # Lifecycle
///
/// `Stopped → Started → EnumerationCompleted → Stopped`. `start` is
/// idempotent while running; `stop` and `dispose` are idempotent in any
/// state. `resume` restarts the watcher unless an enumeration is running.
pub mod bridge;
pub mod events;
pub mod poller;

pub use bridge::{spawn_bridge_reader, BridgeReaderHandle, BridgeSender};
pub use events::{DeviceEvent, DeviceEventKind, Provenance, WatchEvent};

use crate::config::DriveWatchConfig;
use crate::error::Result;
use crate::model::{classify, DriveItem, DriveType};
use crate::notifier::ChangeNotifier;
use crate::platform::StorageBackend;
use crate::registry::{AddOutcome, DriveMatch, DriveRegistry};
use compact_str::CompactString;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use poller::{PollerHandle, CANCEL_POLL};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Stopped,
    Started,
    /// The native watcher has reported every device present at start.
    EnumerationCompleted,
}

/// Applies watch events to the registry. Shared with the dispatcher thread.
struct EventHandler {
    registry: Arc<DriveRegistry>,
    backend: Arc<dyn StorageBackend>,
    notifier: Arc<ChangeNotifier>,
    state: Mutex<WatchState>,
}

impl EventHandler {
    fn handle(&self, event: WatchEvent) {
        match event {
            WatchEvent::EnumerationCompleted => {
                let mut state = self.state.lock();
                if *state == WatchState::Started {
                    *state = WatchState::EnumerationCompleted;
                    info!("Device watcher: enumeration completed");
                }
            }
            WatchEvent::Device { event, source } => {
                let id = event.device_id.as_str();
                if id.is_empty() {
                    warn!("Ignoring {:?} event with an empty device id", event.kind);
                    return;
                }
                match event.kind {
                    DeviceEventKind::Added => self.on_added(id, source),
                    DeviceEventKind::Removed => self.on_removed(id),
                    DeviceEventKind::Inserted | DeviceEventKind::Ejected => {
                        self.on_media_changed(id, event.kind)
                    }
                }
            }
        }
    }

    fn on_added(&self, id: &str, source: Provenance) {
        let root = match self.backend.resolve_device_root(id) {
            Ok(root) => root,
            Err(e) => {
                warn!("Failed to open root of device {id}: {e}");
                return;
            }
        };
        let drive_type = match self.backend.drive_type(&root.path) {
            Ok(raw) => classify(raw, &root.path),
            Err(e) => {
                debug!("No drive type for {} ({e}); assuming removable", root.path);
                DriveType::Removable
            }
        };

        let item = DriveItem::from_device(id, drive_type, root);
        let rule = DriveMatch::for_item(&item);
        let outcome = match source {
            // Startup enumeration registers drives by path with no device id;
            // adopt it here so the matching `Removed` finds the entry.
            Provenance::Native => self.registry.add_or_update(item, &rule, |existing| {
                if existing.device_id.is_none() && existing.drive_type != DriveType::VirtualDrive
                {
                    existing.device_id = Some(CompactString::new(id));
                }
            }),
            Provenance::Bridge => self.registry.add_or_update(item, &rule, |existing| {
                if existing.drive_type != DriveType::VirtualDrive {
                    existing.device_id = Some(CompactString::new(id));
                }
            }),
        };

        match outcome {
            AddOutcome::Inserted(entry) => {
                info!("Device added: {id} at {:?}", entry.path());
                self.notifier.notify();
            }
            AddOutcome::Existing(entry) => {
                debug!("Device {id} already registered as {:?}", entry.key());
                if source == Provenance::Bridge {
                    self.notifier.notify();
                }
            }
        }
    }

    fn on_removed(&self, id: &str) {
        let removed = self.registry.remove_device(id);
        if removed > 0 {
            info!("Device removed: {id} ({removed} entries)");
            self.notifier.notify();
        } else {
            debug!("Removal of unknown device {id} ignored");
        }
    }

    fn on_media_changed(&self, id: &str, kind: DeviceEventKind) {
        let rule = DriveMatch::by_device_id(id);
        if self.registry.find_match(&rule).is_none() {
            debug!("{kind:?} for unknown device {id} ignored");
            return;
        }

        // Resolve outside the registry lock. After an eject the root is
        // usually gone and the entry falls back to its path.
        let root = match self.backend.resolve_device_root(id) {
            Ok(root) => Some(root),
            Err(e) => {
                debug!("Device {id} has no root after {kind:?}: {e}");
                None
            }
        };

        match self.registry.update_match(&rule, |item| item.refresh_root(root)) {
            Some(entry) => {
                info!("Media {kind:?} on {id}: now {:?}", entry.display_text());
                self.notifier.notify();
            }
            None => debug!("Device {id} went away while refreshing"),
        }
    }
}

/// Threads of one running session.
struct Session {
    cancel: Arc<AtomicBool>,
    poller: PollerHandle,
    dispatcher: JoinHandle<()>,
}

/// Busy flag held for the duration of an initial enumeration.
pub struct EnumerationGuard {
    busy: Arc<AtomicUsize>,
}

impl Drop for EnumerationGuard {
    fn drop(&mut self) {
        self.busy.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct DeviceWatchEngine {
    handler: Arc<EventHandler>,
    tx: Sender<WatchEvent>,
    rx: Receiver<WatchEvent>,
    session: Mutex<Option<Session>>,
    busy: Arc<AtomicUsize>,
    /// Set on dispose; shared with every [`BridgeSender`].
    disposed: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl DeviceWatchEngine {
    pub fn new(
        registry: Arc<DriveRegistry>,
        backend: Arc<dyn StorageBackend>,
        notifier: Arc<ChangeNotifier>,
        config: &DriveWatchConfig,
    ) -> Self {
        let (tx, rx) = bounded(config.event_channel_capacity.max(1));
        Self {
            handler: Arc::new(EventHandler {
                registry,
                backend,
                notifier,
                state: Mutex::new(WatchState::Stopped),
            }),
            tx,
            rx,
            session: Mutex::new(None),
            busy: Arc::new(AtomicUsize::new(0)),
            disposed: Arc::new(AtomicBool::new(false)),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn state(&self) -> WatchState {
        *self.handler.state.lock()
    }

    /// Handle for injecting bridge events. Valid across restarts.
    pub fn bridge(&self) -> BridgeSender {
        BridgeSender::new(self.tx.clone(), Arc::clone(&self.disposed))
    }

    /// Apply one event synchronously on the calling thread.
    pub fn handle_event(&self, event: WatchEvent) {
        self.handler.handle(event);
    }

    /// Mark an enumeration as running until the guard drops.
    pub fn enumeration_guard(&self) -> EnumerationGuard {
        self.busy.fetch_add(1, Ordering::AcqRel);
        EnumerationGuard {
            busy: Arc::clone(&self.busy),
        }
    }

    pub fn is_enumerating(&self) -> bool {
        self.busy.load(Ordering::Acquire) > 0
    }

    /// Start the native watcher and the dispatcher. No-op while running or
    /// after `dispose`.
    pub fn start(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            warn!("Device watcher: start after dispose ignored");
            return Ok(());
        }
        let mut session = self.session.lock();
        if session.is_some() {
            debug!("Device watcher: already started");
            return Ok(());
        }

        self.apply_stale_events();

        // Set before the poller runs so its EnumerationCompleted is not lost.
        *self.handler.state.lock() = WatchState::Started;
        let cancel = Arc::new(AtomicBool::new(false));
        let poller = match poller::spawn_poller(
            Arc::clone(&self.handler.backend),
            self.poll_interval,
            self.tx.clone(),
        ) {
            Ok(poller) => poller,
            Err(e) => {
                *self.handler.state.lock() = WatchState::Stopped;
                return Err(e.into());
            }
        };
        let dispatcher = {
            let handler = Arc::clone(&self.handler);
            let rx = self.rx.clone();
            let cancel = Arc::clone(&cancel);
            std::thread::Builder::new()
                .name("drivewatch-dispatch".to_owned())
                .spawn(move || run_dispatcher(handler, rx, cancel))
        };
        let dispatcher = match dispatcher {
            Ok(handle) => handle,
            Err(e) => {
                poller.join();
                *self.handler.state.lock() = WatchState::Stopped;
                return Err(e.into());
            }
        };

        *session = Some(Session {
            cancel,
            poller,
            dispatcher,
        });
        info!("Device watcher started");
        Ok(())
    }

    /// Stop both threads and wait for them. Safe in any state.
    pub fn stop(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };
        session.cancel.store(true, Ordering::Relaxed);
        session.poller.join();
        if session.dispatcher.thread().id() != std::thread::current().id() {
            let _ = session.dispatcher.join();
        }
        *self.handler.state.lock() = WatchState::Stopped;
        info!("Device watcher stopped");
    }

    /// Restart the watcher. Returns `false` without doing anything while an
    /// enumeration is running.
    pub fn resume(&self) -> Result<bool> {
        if self.is_enumerating() {
            debug!("Device watcher: resume skipped, enumeration in progress");
            return Ok(false);
        }
        self.stop();
        self.start()?;
        Ok(true)
    }

    /// Stop for good and empty the registry. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stop();
        // Senders waiting on a full channel see `disposed` and give up;
        // dropping the backlog releases any that are mid-send.
        let dropped = self.rx.try_iter().count();
        self.handler.registry.clear();
        info!("Device watcher disposed ({dropped} queued events dropped)");
    }

    /// Events left over from a previous session. Native ones are stale (the
    /// next first pass re-reports every device); bridge ones are applied.
    fn apply_stale_events(&self) {
        let mut discarded = 0;
        for event in self.rx.try_iter() {
            match event {
                WatchEvent::Device {
                    source: Provenance::Bridge,
                    ..
                } => self.handler.handle(event),
                _ => discarded += 1,
            }
        }
        if discarded > 0 {
            debug!("Device watcher: discarded {discarded} stale native events");
        }
    }
}

impl Drop for DeviceWatchEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_dispatcher(handler: Arc<EventHandler>, rx: Receiver<WatchEvent>, cancel: Arc<AtomicBool>) {
    debug!("Dispatcher: starting");
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(CANCEL_POLL) {
            Ok(event) => handler.handle(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("Dispatcher: stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
    use crate::model::{RawDriveType, RootHandle};
    use crate::platform::memory::MemoryBackend;

    fn setup(backend: MemoryBackend) -> (Arc<DriveRegistry>, Arc<MemoryBackend>, DeviceWatchEngine) {
        let registry = Arc::new(DriveRegistry::new());
        let backend = Arc::new(backend);
        let notifier = Arc::new(ChangeNotifier::new(Duration::ZERO));
        let engine = DeviceWatchEngine::new(
            registry.clone(),
            backend.clone(),
            notifier,
            &DriveWatchConfig::default(),
        );
        (registry, backend, engine)
    }

    fn usb_root(path: &str) -> std::result::Result<RootHandle, ResolveError> {
        Ok(RootHandle::new(path, format!("USB ({path})")))
    }

    #[test]
    fn test_native_added_inserts_once() {
        let backend = MemoryBackend::new().with_device("vol-1", "E:\\", usb_root("E:\\"));
        let (registry, _, engine) = setup(backend);

        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));

        assert_eq!(registry.len(), 1);
        let item = registry.items().remove(0);
        assert_eq!(item.drive_type, DriveType::Removable);
        assert_eq!(item.path, "E:");
    }

    #[test]
    fn test_added_uses_backend_drive_type() {
        let backend = MemoryBackend::new().with_device("vol-1", "F:\\", usb_root("F:\\"));
        backend.set_drive_type("F:\\", RawDriveType::Fixed);
        let (registry, _, engine) = setup(backend);

        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        assert_eq!(registry.items()[0].drive_type, DriveType::Fixed);
    }

    #[test]
    fn test_added_with_unresolvable_root_is_ignored() {
        let backend = MemoryBackend::new().with_device(
            "vol-1",
            "E:\\",
            Err(ResolveError::Unauthorized("vol-1".into())),
        );
        let (registry, _, engine) = setup(backend);
        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_removed_drops_every_entry_with_id() {
        let backend = MemoryBackend::new().with_device("vol-1", "E:\\", usb_root("E:\\"));
        let (registry, _, engine) = setup(backend);
        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        engine.handle_event(WatchEvent::native(DeviceEvent::removed("vol-1")));
        assert!(registry.is_empty());
        // Unknown id is a no-op.
        engine.handle_event(WatchEvent::native(DeviceEvent::removed("vol-404")));
    }

    #[test]
    fn test_bridge_added_attaches_device_id_to_path_entry() {
        let backend = MemoryBackend::new().with_device("vol-1", "E:\\", usb_root("E:\\"));
        let (registry, _, engine) = setup(backend);
        let existing = registry
            .add(DriveItem::physical("E:\\", DriveType::Removable, None))
            .entry()
            .clone();

        engine.handle_event(WatchEvent::bridge(DeviceEvent::added("vol-1")));

        assert_eq!(registry.len(), 1);
        assert_eq!(existing.device_id().as_deref(), Some("vol-1"));
    }

    #[test]
    fn test_native_added_adopts_path_entry_then_removes_it() {
        let backend = MemoryBackend::new().with_device("vol-1", "E:\\", usb_root("E:\\"));
        let (registry, _, engine) = setup(backend);
        let existing = registry
            .add(DriveItem::physical("e:\\", DriveType::Removable, None))
            .entry()
            .clone();

        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        assert_eq!(registry.len(), 1);
        assert_eq!(existing.device_id().as_deref(), Some("vol-1"));

        engine.handle_event(WatchEvent::native(DeviceEvent::removed("vol-1")));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_native_added_keeps_existing_device_id() {
        let backend = MemoryBackend::new().with_device("vol-2", "E:\\", usb_root("E:\\"));
        let (registry, _, engine) = setup(backend);
        let item = DriveItem::from_device("vol-1", DriveType::Removable, RootHandle::new("E:\\", "USB"));
        let existing = registry.add(item).entry().clone();

        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-2")));

        assert_eq!(registry.len(), 1);
        assert_eq!(existing.device_id().as_deref(), Some("vol-1"));
    }

    #[test]
    fn test_eject_then_insert_refreshes_in_place() {
        let backend = MemoryBackend::new().with_device("vol-1", "E:\\", usb_root("E:\\"));
        let (registry, backend, engine) = setup(backend);
        engine.handle_event(WatchEvent::native(DeviceEvent::added("vol-1")));
        let entry = registry.snapshot().remove(0);
        assert_eq!(entry.display_text(), "USB (E:\\)");

        backend.set_device_root("vol-1", Err(ResolveError::NotFound("vol-1".into())));
        engine.handle_event(WatchEvent::bridge(DeviceEvent::new(
            DeviceEventKind::Ejected,
            "vol-1",
        )));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&entry, &registry.snapshot()[0]));
        assert_eq!(entry.display_text(), "E:");
        assert!(entry.item().root.is_none());

        backend.set_device_root("vol-1", Ok(RootHandle::new("E:\\", "Holiday Photos")));
        engine.handle_event(WatchEvent::bridge(DeviceEvent::new(
            DeviceEventKind::Inserted,
            "vol-1",
        )));
        assert_eq!(entry.display_text(), "Holiday Photos");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_media_change_for_unknown_id_is_ignored() {
        let (registry, _, engine) = setup(MemoryBackend::new());
        engine.handle_event(WatchEvent::bridge(DeviceEvent::new(
            DeviceEventKind::Inserted,
            "vol-404",
        )));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_enumeration_completed_only_from_started() {
        let (_, _, engine) = setup(MemoryBackend::new());
        engine.handle_event(WatchEvent::EnumerationCompleted);
        assert_eq!(engine.state(), WatchState::Stopped);
    }

    #[test]
    fn test_resume_is_noop_while_enumerating() {
        let (_, _, engine) = setup(MemoryBackend::new());
        let guard = engine.enumeration_guard();
        assert!(engine.is_enumerating());
        assert!(!engine.resume().unwrap());
        assert_eq!(engine.state(), WatchState::Stopped);

        drop(guard);
        assert!(!engine.is_enumerating());
        assert!(engine.resume().unwrap());
        assert_ne!(engine.state(), WatchState::Stopped);
        engine.stop();
    }

    #[test]
    fn test_stop_and_dispose_are_idempotent() {
        let (registry, _, engine) = setup(MemoryBackend::new());
        engine.stop();
        engine.start().unwrap();
        engine.start().unwrap();
        engine.stop();
        engine.stop();
        assert_eq!(engine.state(), WatchState::Stopped);

        registry.add(DriveItem::physical("C:\\", DriveType::Fixed, None));
        engine.dispose();
        engine.dispose();
        assert!(registry.is_empty());

        engine.start().unwrap();
        assert_eq!(engine.state(), WatchState::Stopped);
    }
}
