/// "Drive set changed" signal for the presentation layer.
///
/// The signal carries no payload: the listener re-reads the registry
/// snapshot and reconciles its own list.
///
/// # Readiness
///
/// Until a listener is attached, notifications are deferred rather than
/// lost. [`ChangeNotifier::attach`] is the readiness signal: a deferred
/// notification is delivered exactly once, then the deferral is cleared.
///
/// # Delivery
///
/// Notifications go through a `bounded(1)` channel to a delivery thread.
/// `notify` never blocks: if a signal is already queued the new one is
/// coalesced into it. The delivery thread waits out the debounce window
/// before calling the listener, so a burst of mutations yields one call.
use crate::error::{DriveError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Receives "drive set changed" signals.
pub trait DriveSetListener: Send + Sync + 'static {
    fn drives_changed(&self);
}

impl<F> DriveSetListener for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn drives_changed(&self) {
        self()
    }
}

/// What happened to a single `notify` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// A signal was queued for the delivery thread.
    Queued,
    /// A signal was already pending; this one merged into it.
    Coalesced,
    /// No listener yet; the signal is held until `attach`.
    Deferred,
}

struct Attached {
    tx: Sender<()>,
    worker: JoinHandle<()>,
}

#[derive(Default)]
struct NotifierState {
    attached: Option<Attached>,
    deferred: bool,
}

pub struct ChangeNotifier {
    state: Mutex<NotifierState>,
    debounce: Duration,
}

impl ChangeNotifier {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Mutex::new(NotifierState::default()),
            debounce,
        }
    }

    /// Signal that the registry changed.
    pub fn notify(&self) -> Delivery {
        let mut state = self.state.lock();
        match Self::try_deliver(&state) {
            Ok(delivery) => delivery,
            Err(DriveError::DeliveryNotReady) => {
                if !state.deferred {
                    debug!("Change listener not ready; deferring notification");
                }
                state.deferred = true;
                Delivery::Deferred
            }
            Err(e) => {
                warn!("Dropping change notification: {e}");
                Delivery::Coalesced
            }
        }
    }

    fn try_deliver(state: &NotifierState) -> Result<Delivery> {
        let attached = state.attached.as_ref().ok_or(DriveError::DeliveryNotReady)?;
        match attached.tx.try_send(()) {
            Ok(()) => Ok(Delivery::Queued),
            Err(TrySendError::Full(())) => Ok(Delivery::Coalesced),
            Err(TrySendError::Disconnected(())) => Err(DriveError::ChannelClosed),
        }
    }

    /// Attach the listener. This is the readiness signal: any deferred
    /// notification is delivered once. Attaching again replaces the
    /// previous listener.
    pub fn attach(&self, listener: Arc<dyn DriveSetListener>) {
        let (tx, rx) = bounded::<()>(1);
        let debounce = self.debounce;
        let worker = thread::Builder::new()
            .name("drivewatch-notifier".to_owned())
            .spawn(move || run_delivery(rx, listener, debounce));
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to spawn notifier thread: {e}");
                return;
            }
        };

        let previous = {
            let mut state = self.state.lock();
            let previous = state.attached.replace(Attached { tx, worker });
            if state.deferred {
                state.deferred = false;
                let _ = Self::try_deliver(&state);
                debug!("Delivered deferred change notification");
            }
            previous
        };
        if let Some(old) = previous {
            stop_worker(old);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().attached.is_some()
    }

    /// True while a notification is waiting for a listener.
    pub fn has_deferred(&self) -> bool {
        self.state.lock().deferred
    }

    /// Detach the listener and stop the delivery thread. Later
    /// notifications are deferred again.
    pub fn shutdown(&self) {
        let attached = self.state.lock().attached.take();
        if let Some(old) = attached {
            stop_worker(old);
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn stop_worker(attached: Attached) {
    let Attached { tx, worker } = attached;
    // Closing the channel ends the delivery loop.
    drop(tx);
    if worker.thread().id() != thread::current().id() {
        let _ = worker.join();
    }
}

fn run_delivery(rx: Receiver<()>, listener: Arc<dyn DriveSetListener>, debounce: Duration) {
    while rx.recv().is_ok() {
        if !debounce.is_zero() {
            thread::sleep(debounce);
        }
        // Anything that arrived during the window is covered by this call.
        while rx.try_recv().is_ok() {}
        listener.drives_changed();
    }
    debug!("Notifier delivery thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn counting() -> (Arc<AtomicUsize>, Arc<dyn DriveSetListener>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let listener: Arc<dyn DriveSetListener> = Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, listener)
    }

    fn wait_for(count: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < expected {
            assert!(Instant::now() < deadline, "listener was not called in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_notify_before_attach_is_deferred() {
        let notifier = ChangeNotifier::new(Duration::ZERO);
        assert_eq!(notifier.notify(), Delivery::Deferred);
        assert_eq!(notifier.notify(), Delivery::Deferred);
        assert!(notifier.has_deferred());
        assert!(!notifier.is_ready());
    }

    #[test]
    fn test_deferred_signal_delivered_exactly_once_on_attach() {
        let notifier = ChangeNotifier::new(Duration::ZERO);
        notifier.notify();
        notifier.notify();

        let (count, listener) = counting();
        notifier.attach(listener);
        wait_for(&count, 1);
        assert!(!notifier.has_deferred());

        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_burst_is_coalesced() {
        let notifier = ChangeNotifier::new(Duration::from_millis(100));
        let (count, listener) = counting();
        notifier.attach(listener);

        for _ in 0..20 {
            notifier.notify();
        }
        wait_for(&count, 1);
        thread::sleep(Duration::from_millis(250));
        let calls = count.load(Ordering::SeqCst);
        assert!(calls <= 2, "expected the burst to coalesce, got {calls} calls");
    }

    #[test]
    fn test_attach_without_pending_signal_does_not_call_listener() {
        let notifier = ChangeNotifier::new(Duration::ZERO);
        let (count, listener) = counting();
        notifier.attach(listener);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_shutdown_defers_again() {
        let notifier = ChangeNotifier::new(Duration::ZERO);
        let (_count, listener) = counting();
        notifier.attach(listener);
        notifier.shutdown();
        assert_eq!(notifier.notify(), Delivery::Deferred);
    }
}
