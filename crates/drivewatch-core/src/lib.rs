/// DriveWatch Core: drive discovery, classification, and the live registry.
///
/// This crate contains all business logic with zero UI dependencies.
/// Any frontend (console, GUI, service) consumes the registry snapshot and
/// the "drive set changed" signal.
///
/// # Modules
///
/// - [`model`]: `DriveItem`, `DriveType`, root handles, and classification.
/// - [`registry`]: The shared, lock-guarded drive registry.
/// - [`platform`]: OS backends (Windows, Linux, in-memory) behind one trait.
/// - [`resolver`]: Path → owning root resolution for device and UNC paths.
/// - [`providers`]: Cloud-sync providers surfaced as virtual drives.
/// - [`enumerator`]: One-shot startup enumeration.
/// - [`watch`]: Device watch engine fed by the native watcher and the helper bridge.
/// - [`notifier`]: Debounced change signal with an explicit readiness step.
/// - [`manager`]: Composition root that wires everything together.
pub mod config;
pub mod enumerator;
pub mod error;
pub mod manager;
pub mod model;
pub mod notifier;
pub mod platform;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod watch;

pub use config::DriveWatchConfig;
pub use error::{DriveError, ResolveError, Result};
pub use manager::DriveManager;
pub use model::{DriveItem, DriveType, RootHandle};
pub use registry::{DriveEntry, DriveKey, DriveRegistry};
