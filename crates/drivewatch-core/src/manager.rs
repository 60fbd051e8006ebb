/// Composition root: owns the registry and wires the enumerator, watch
/// engine, resolver, and notifier together.
///
/// # Usage
///
/// ```ignore
/// let manager = DriveManager::with_platform_defaults(config);
/// manager.attach_listener(Arc::new(|| println!("drives changed")));
/// manager.start()?;
/// let report = manager.wait_for_enumeration();
/// for entry in manager.drives() { /* ... */ }
/// ```
use crate::config::DriveWatchConfig;
use crate::enumerator::{EnumerationReport, InitialEnumerator};
use crate::error::Result;
use crate::model::{DriveItem, RootHandle};
use crate::notifier::{ChangeNotifier, DriveSetListener};
use crate::platform::{self, StorageBackend};
use crate::providers::{CloudProviderSource, ConfiguredProviders};
use crate::registry::{DriveEntry, DriveRegistry};
use crate::resolver::PathRootResolver;
use crate::watch::{BridgeSender, DeviceWatchEngine, WatchState};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

pub struct DriveManager {
    registry: Arc<DriveRegistry>,
    backend: Arc<dyn StorageBackend>,
    providers: Arc<dyn CloudProviderSource>,
    notifier: Arc<ChangeNotifier>,
    engine: Arc<DeviceWatchEngine>,
    resolver: PathRootResolver,
    excluded_roots: Vec<String>,
    consent_prompt: Arc<AtomicBool>,
    enumerated: AtomicBool,
    enumeration: Mutex<Option<JoinHandle<EnumerationReport>>>,
}

impl DriveManager {
    pub fn new(
        config: DriveWatchConfig,
        backend: Arc<dyn StorageBackend>,
        providers: Arc<dyn CloudProviderSource>,
    ) -> Self {
        let registry = Arc::new(DriveRegistry::new());
        let notifier = Arc::new(ChangeNotifier::new(config.notify_debounce()));
        let engine = Arc::new(DeviceWatchEngine::new(
            Arc::clone(&registry),
            Arc::clone(&backend),
            Arc::clone(&notifier),
            &config,
        ));
        let resolver = PathRootResolver::new(Arc::clone(&registry), Arc::clone(&backend));
        Self {
            registry,
            backend,
            providers,
            notifier,
            engine,
            resolver,
            excluded_roots: config.excluded_roots,
            consent_prompt: Arc::new(AtomicBool::new(false)),
            enumerated: AtomicBool::new(false),
            enumeration: Mutex::new(None),
        }
    }

    /// The current OS backend, with cloud providers taken from `config`.
    pub fn with_platform_defaults(config: DriveWatchConfig) -> Self {
        let providers = Arc::new(ConfiguredProviders::new(config.cloud_providers.clone()));
        Self::new(config, platform::default_backend(), providers)
    }

    /// Start watching and, the first time, run the initial enumeration on
    /// its own thread. Returns immediately.
    pub fn start(&self) -> Result<()> {
        self.engine.start()?;
        if self.enumerated.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let guard = self.engine.enumeration_guard();
        let enumerator = InitialEnumerator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.backend),
            Arc::clone(&self.providers),
            Arc::clone(&self.notifier),
            self.excluded_roots.clone(),
        );
        let backend = Arc::clone(&self.backend);
        let consent_prompt = Arc::clone(&self.consent_prompt);
        let handle = std::thread::Builder::new()
            .name("drivewatch-enumerate".to_owned())
            .spawn(move || {
                let _guard = guard;
                let report = enumerator.run();
                // Already elevated: asking for consent would change nothing.
                if report.show_consent_prompt && !backend.is_elevated() {
                    consent_prompt.store(true, Ordering::Release);
                }
                report
            });
        match handle {
            Ok(handle) => {
                *self.enumeration.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.enumerated.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Block until the initial enumeration finishes. `None` if it was never
    /// started or its report was already collected.
    pub fn wait_for_enumeration(&self) -> Option<EnumerationReport> {
        let handle = self.enumeration.lock().take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                warn!("Enumeration thread panicked");
                None
            }
        }
    }

    /// True exactly once after an enumeration that could only list
    /// removable media because access was denied.
    pub fn take_consent_prompt(&self) -> bool {
        self.consent_prompt.swap(false, Ordering::AcqRel)
    }

    pub fn registry(&self) -> &Arc<DriveRegistry> {
        &self.registry
    }

    /// Snapshot of the registry handles.
    pub fn drives(&self) -> Vec<Arc<DriveEntry>> {
        self.registry.snapshot()
    }

    pub fn items(&self) -> Vec<DriveItem> {
        self.registry.items()
    }

    pub fn resolve_root(&self, path: &str) -> Option<RootHandle> {
        self.resolver.resolve_root(path)
    }

    pub fn bridge(&self) -> BridgeSender {
        self.engine.bridge()
    }

    pub fn engine(&self) -> &Arc<DeviceWatchEngine> {
        &self.engine
    }

    pub fn watch_state(&self) -> WatchState {
        self.engine.state()
    }

    /// Attach the presentation listener. Deferred notifications are
    /// delivered now.
    pub fn attach_listener(&self, listener: Arc<dyn DriveSetListener>) {
        self.notifier.attach(listener);
    }

    pub fn resume(&self) -> Result<bool> {
        self.engine.resume()
    }

    pub fn stop(&self) {
        self.engine.stop();
    }

    /// Stop everything and empty the registry. Idempotent.
    pub fn dispose(&self) {
        // The enumerator must not repopulate after the registry is cleared.
        let _ = self.wait_for_enumeration();
        self.engine.dispose();
        self.notifier.shutdown();
        info!("Drive manager disposed");
    }
}

impl Drop for DriveManager {
    fn drop(&mut self) {
        self.engine.stop();
        self.notifier.shutdown();
    }
}
