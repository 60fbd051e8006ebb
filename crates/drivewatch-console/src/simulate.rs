/// Scripted hardware for `--simulate`.
///
/// Builds a `MemoryBackend` with a plausible desktop layout and runs a
/// background thread that cycles a USB stick through plug in → eject →
/// re-insert → unplug, so the live table can be watched without touching
/// real devices.
use drivewatch_core::error::ResolveError;
use drivewatch_core::model::{RawDriveType, RootHandle, VolumeSpace};
use drivewatch_core::platform::memory::MemoryBackend;
use drivewatch_core::watch::{BridgeSender, DeviceEvent, DeviceEventKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

const GIB: u64 = 1024 * 1024 * 1024;

pub const SIM_USB_ID: &str = "\\\\?\\Volume{5e1f0a2c-usb0-0000-0000-000000000001}\\";

fn disk(path: &str, label: &str, total_gib: u64, free_gib: u64) -> RootHandle {
    RootHandle::new(path, format!("{label} ({})", path.trim_end_matches('\\'))).with_space(
        VolumeSpace {
            total_bytes: total_gib * GIB,
            free_bytes: free_gib * GIB,
        },
    )
}

/// A system disk, a data disk the user may not open, an optical drive,
/// and a mapped network share.
pub fn simulated_backend() -> MemoryBackend {
    MemoryBackend::new()
        .with_drive("C:\\", RawDriveType::Fixed, Ok(disk("C:\\", "Local Disk", 476, 121)))
        .with_drive(
            "D:\\",
            RawDriveType::Fixed,
            Err(ResolveError::Unauthorized("D:\\".into())),
        )
        .with_drive("E:\\", RawDriveType::CdRom, Err(ResolveError::NotFound("E:\\".into())))
        .with_drive("Z:\\", RawDriveType::Network, Ok(disk("Z:\\", "share on nas", 3726, 2048)))
        .with_folder(
            "\\\\nas",
            Ok(RootHandle::new("\\\\nas", "nas")),
        )
}

pub struct SimulatorHandle {
    cancel: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SimulatorHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    pub fn stop(mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Cycle the simulated USB stick every `step`.
pub fn spawn_simulator(
    backend: Arc<MemoryBackend>,
    bridge: BridgeSender,
    step: Duration,
) -> std::io::Result<SimulatorHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    let thread = std::thread::Builder::new()
        .name("drivewatch-simulator".to_owned())
        .spawn(move || run_simulator(backend, bridge, step, cancel_clone))?;
    Ok(SimulatorHandle {
        cancel,
        thread: Some(thread),
    })
}

// ─── Background thread ──────────────────────────────────────────────────────

fn run_simulator(
    backend: Arc<MemoryBackend>,
    bridge: BridgeSender,
    step: Duration,
    cancel: Arc<AtomicBool>,
) {
    let stick = || Ok(disk("F:\\", "SANDISK", 58, 40));
    let mut phase = 0usize;
    while wait(step, &cancel) {
        let sent = match phase % 4 {
            0 => {
                info!("Simulator: plugging in USB stick");
                backend.set_drive_type("F:\\", RawDriveType::Removable);
                backend.add_device(SIM_USB_ID, "F:\\", stick());
                Ok(())
            }
            1 => {
                info!("Simulator: ejecting media");
                backend.set_device_root(SIM_USB_ID, Err(ResolveError::NotFound("F:\\".into())));
                bridge.send(DeviceEvent::new(DeviceEventKind::Ejected, SIM_USB_ID))
            }
            2 => {
                info!("Simulator: re-inserting media");
                backend.set_device_root(SIM_USB_ID, stick());
                bridge.send(DeviceEvent::new(DeviceEventKind::Inserted, SIM_USB_ID))
            }
            _ => {
                info!("Simulator: unplugging USB stick");
                backend.remove_device(SIM_USB_ID);
                Ok(())
            }
        };
        if let Err(e) = sent {
            warn!("Simulator: bridge closed, stopping: {e}");
            break;
        }
        phase += 1;
    }
    debug!("Simulator: stopped");
}

fn wait(total: Duration, cancel: &AtomicBool) -> bool {
    let slice = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while waited < total {
        if cancel.load(Ordering::Relaxed) {
            return false;
        }
        std::thread::sleep(slice);
        waited += slice;
    }
    !cancel.load(Ordering::Relaxed)
}
