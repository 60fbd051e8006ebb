/// Inbound device events from the helper process.
///
/// The helper writes one JSON object per line:
///
/// ```text
/// {"kind":"Added","device_id":"\\\\?\\Volume{...}\\"}
/// {"kind":"Ejected","device_id":"\\\\?\\Volume{...}\\"}
/// ```
///
/// In-process producers use [`BridgeSender`] directly.
use super::events::{DeviceEvent, WatchEvent};
use super::poller::CANCEL_POLL;
use crate::error::{DriveError, Result};
use crossbeam_channel::{SendTimeoutError, Sender};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// Cloneable handle that injects bridge events into the watch engine.
#[derive(Clone)]
pub struct BridgeSender {
    tx: Sender<WatchEvent>,
    closed: Arc<AtomicBool>,
}

impl BridgeSender {
    pub(crate) fn new(tx: Sender<WatchEvent>, closed: Arc<AtomicBool>) -> Self {
        Self { tx, closed }
    }

    /// Queue `event`. Waits while the event channel is full; fails once the
    /// engine has been disposed or dropped.
    pub fn send(&self, event: DeviceEvent) -> Result<()> {
        self.send_until(event, &AtomicBool::new(false))
    }

    /// As [`send`](Self::send), but also gives up when `cancel` is set.
    fn send_until(&self, event: DeviceEvent, cancel: &AtomicBool) -> Result<()> {
        let mut event = WatchEvent::bridge(event);
        loop {
            if self.closed.load(Ordering::Acquire) || cancel.load(Ordering::Relaxed) {
                return Err(DriveError::ChannelClosed);
            }
            match self.tx.send_timeout(event, CANCEL_POLL) {
                Ok(()) => return Ok(()),
                Err(SendTimeoutError::Timeout(e)) => event = e,
                Err(SendTimeoutError::Disconnected(_)) => return Err(DriveError::ChannelClosed),
            }
        }
    }
}

/// Parse one bridge line. Blank lines yield `Ok(None)`.
pub fn parse_bridge_line(line: &str) -> Result<Option<DeviceEvent>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: DeviceEvent = serde_json::from_str(line)?;
    Ok(Some(event))
}

/// Handle to a running bridge reader thread.
pub struct BridgeReaderHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<usize>,
}

impl BridgeReaderHandle {
    /// Stop forwarding. The thread exits after its current read returns, or
    /// within ~100 ms if it is waiting on a full event channel.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for end of input. Returns how many events were forwarded.
    pub fn join(self) -> usize {
        self.thread.join().unwrap_or(0)
    }
}

/// Forward JSON lines from `reader` into the engine until end of input,
/// a read error, or the engine closing. Malformed lines are logged and
/// skipped.
pub fn spawn_bridge_reader<R>(reader: R, sender: BridgeSender) -> Result<BridgeReaderHandle>
where
    R: BufRead + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let thread = std::thread::Builder::new()
        .name("drivewatch-bridge".to_owned())
        .spawn(move || run_reader(reader, sender, cancel_clone))?;
    Ok(BridgeReaderHandle { cancel, thread })
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_reader<R: BufRead>(reader: R, sender: BridgeSender, cancel: Arc<AtomicBool>) -> usize {
    let mut forwarded = 0;
    for (lineno, line) in reader.lines().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!("Bridge: read failed: {e}");
                break;
            }
        };
        match parse_bridge_line(&line) {
            Ok(Some(event)) => {
                debug!("Bridge: {:?} {}", event.kind, event.device_id);
                if sender.send_until(event, &cancel).is_err() {
                    debug!("Bridge: engine closed or reader stopped");
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => warn!("Bridge: skipping malformed line {}: {e}", lineno + 1),
        }
    }
    info!("Bridge reader finished after {forwarded} events");
    forwarded
}
