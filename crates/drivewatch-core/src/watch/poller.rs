/// Native device watcher: polls the backend's removable device list.
///
/// The first pass reports every device already present as `Added`, then
/// `EnumerationCompleted`. Later passes diff the id set against the last
/// one and report only arrivals and departures. A failed query keeps the
/// last known set, so a flaky device store never looks like a mass removal.
///
/// # Cancellation
///
/// The thread sleeps in short slices and checks the cancel flag between
/// them, so it exits within ~100 ms of [`PollerHandle::stop`].
use super::events::{DeviceEvent, WatchEvent};
use crate::platform::StorageBackend;
use crossbeam_channel::Sender;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Granularity of the cancel check while waiting for the next pass.
pub const CANCEL_POLL: Duration = Duration::from_millis(100);

pub struct PollerHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Ask the thread to exit. Non-blocking.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Stop and wait for the thread to exit.
    pub fn join(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub fn spawn_poller(
    backend: Arc<dyn StorageBackend>,
    interval: Duration,
    tx: Sender<WatchEvent>,
) -> std::io::Result<PollerHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let thread = std::thread::Builder::new()
        .name("drivewatch-poller".to_owned())
        .spawn(move || run_poller(backend, interval, tx, cancel_clone))?;
    Ok(PollerHandle {
        cancel,
        thread: Some(thread),
    })
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_poller(
    backend: Arc<dyn StorageBackend>,
    interval: Duration,
    tx: Sender<WatchEvent>,
    cancel: Arc<AtomicBool>,
) {
    debug!("Poller: starting, interval {:?}", interval);
    let mut known: Option<BTreeSet<String>> = None;

    while !cancel.load(Ordering::Relaxed) {
        match backend.storage_devices() {
            Ok(devices) => {
                let current: BTreeSet<String> = devices.into_iter().map(|d| d.id).collect();
                let first_pass = known.is_none();
                let previous = known.take().unwrap_or_default();
                let events = diff(&previous, &current);
                known = Some(current);

                for event in events {
                    if !send(&tx, &cancel, WatchEvent::native(event)) {
                        return;
                    }
                }
                if first_pass {
                    info!("Poller: initial device pass complete");
                    if !send(&tx, &cancel, WatchEvent::EnumerationCompleted) {
                        return;
                    }
                }
            }
            Err(e) => warn!("Poller: device query failed, keeping last known set: {e}"),
        }

        if !sleep_unless_cancelled(interval, &cancel) {
            break;
        }
    }
    debug!("Poller: stopped");
}

/// Arrivals in sorted order, then departures.
fn diff(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Vec<DeviceEvent> {
    let added = current.difference(previous).map(DeviceEvent::added);
    let removed = previous.difference(current).map(DeviceEvent::removed);
    added.chain(removed).collect()
}

/// Send, giving up when cancelled or when the engine is gone.
fn send(tx: &Sender<WatchEvent>, cancel: &AtomicBool, event: WatchEvent) -> bool {
    let mut event = event;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        match tx.send_timeout(event, CANCEL_POLL) {
            Ok(()) => return true,
            Err(crossbeam_channel::SendTimeoutError::Timeout(e)) => event = e,
            Err(crossbeam_channel::SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn sleep_unless_cancelled(total: Duration, cancel: &AtomicBool) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(CANCEL_POLL.min(deadline - now));
    }
}
