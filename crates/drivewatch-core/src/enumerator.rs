/// One-shot startup enumeration.
///
/// 1. List logical drives while the removable device store is queried on a
///    second thread.
/// 2. Drop removable drives the device store does not know (stale metadata)
///    and drives excluded by configuration.
/// 3. Open the remaining roots in parallel, then insert them in enumeration
///    order, deduplicated by path.
/// 4. Append every installed cloud provider as a virtual drive.
///
/// Access-denied roots are skipped but remembered: if nothing except
/// removable media could be listed, the caller should offer the consent
/// prompt.
use crate::error::{DriveError, ResolveError};
use crate::model::{classify, DriveItem, DriveType, RawDriveType};
use crate::notifier::ChangeNotifier;
use crate::platform::{LogicalDrive, StorageBackend};
use crate::providers::CloudProviderSource;
use crate::registry::{AddOutcome, DriveMatch, DriveRegistry};
use crate::resolver::normalize_path;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Removable drive unknown to the device store.
    UnsupportedRemovable,
    /// Listed in the configured excluded roots.
    Excluded,
    Unauthorized,
    Unavailable(ResolveError),
    /// Already registered under the same path.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDrive {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumerationReport {
    /// Physical drives inserted.
    pub added: usize,
    /// At least one root was refused with access denied.
    pub unauthorized: bool,
    /// Access was refused and nothing but removable media got listed.
    pub show_consent_prompt: bool,
    pub skipped: Vec<SkippedDrive>,
    pub virtual_drives: usize,
}

pub struct InitialEnumerator {
    registry: Arc<DriveRegistry>,
    backend: Arc<dyn StorageBackend>,
    providers: Arc<dyn CloudProviderSource>,
    notifier: Arc<ChangeNotifier>,
    excluded_roots: Vec<String>,
}

impl InitialEnumerator {
    pub fn new(
        registry: Arc<DriveRegistry>,
        backend: Arc<dyn StorageBackend>,
        providers: Arc<dyn CloudProviderSource>,
        notifier: Arc<ChangeNotifier>,
        excluded_roots: Vec<String>,
    ) -> Self {
        Self {
            registry,
            backend,
            providers,
            notifier,
            excluded_roots,
        }
    }

    pub fn run(&self) -> EnumerationReport {
        let start = Instant::now();
        let mut report = EnumerationReport::default();

        let providers = match self.providers.list_installed_providers() {
            Ok(list) => list,
            Err(e) => {
                warn!("Cloud provider discovery failed: {e}");
                Vec::new()
            }
        };

        let (drives, devices) = self.query_drives_and_devices();
        let supported = supported_device_names(devices);

        let excluded: HashSet<String> = self
            .excluded_roots
            .iter()
            .map(|root| normalize_path(root))
            .collect();

        let mut candidates = Vec::with_capacity(drives.len());
        for drive in drives {
            if drive.raw_type == RawDriveType::Removable
                && !supported.contains(&normalize_name(&drive.name))
            {
                debug!("Skipping removable drive {} unknown to the device store", drive.name);
                report.skipped.push(skip(&drive.name, SkipReason::UnsupportedRemovable));
            } else if excluded.contains(&normalize_path(&drive.name)) {
                debug!("Skipping excluded drive {}", drive.name);
                report.skipped.push(skip(&drive.name, SkipReason::Excluded));
            } else {
                candidates.push(drive);
            }
        }

        // Opening a root can block for seconds on a sleeping disk or a dead
        // network mount; `collect` keeps enumeration order.
        let opened: Vec<_> = candidates
            .par_iter()
            .map(|drive| self.backend.resolve_folder(&drive.name))
            .collect();

        for (drive, result) in candidates.iter().zip(opened) {
            match result {
                Ok(root) => {
                    let drive_type = classify(drive.raw_type, &drive.name);
                    let item = DriveItem::physical(&drive.name, drive_type, Some(root));
                    match self.registry.add_if_absent(item, &DriveMatch::by_path(&drive.name)) {
                        AddOutcome::Inserted(_) => {
                            report.added += 1;
                            self.notifier.notify();
                        }
                        AddOutcome::Existing(_) => {
                            report.skipped.push(skip(&drive.name, SkipReason::Duplicate));
                        }
                    }
                }
                Err(ResolveError::Unauthorized(_)) => {
                    warn!("Access denied opening {}", drive.name);
                    report.unauthorized = true;
                    report.skipped.push(skip(&drive.name, SkipReason::Unauthorized));
                }
                Err(e) => {
                    warn!("Failed to open {}: {e}", drive.name);
                    report.skipped.push(skip(&drive.name, SkipReason::Unavailable(e)));
                }
            }
        }

        report.show_consent_prompt = report.unauthorized
            && !self
                .registry
                .any(|item| item.drive_type != DriveType::Removable);

        for provider in &providers {
            let root = match self.backend.resolve_folder(&provider.sync_folder) {
                Ok(root) => Some(root),
                Err(e) => {
                    debug!("Sync folder of {} not resolvable: {e}", provider.name);
                    None
                }
            };
            self.registry
                .push(DriveItem::virtual_drive(&provider.name, &provider.sync_folder, root));
            report.virtual_drives += 1;
            self.notifier.notify();
        }

        info!(
            "Enumeration finished in {:.1?}: {} drives, {} virtual, {} skipped{}",
            start.elapsed(),
            report.added,
            report.virtual_drives,
            report.skipped.len(),
            if report.unauthorized { " (access denied)" } else { "" }
        );
        report
    }

    fn query_drives_and_devices(&self) -> (Vec<LogicalDrive>, Vec<String>) {
        std::thread::scope(|s| {
            let devices = s.spawn(|| self.backend.storage_devices());
            let drives = self.backend.logical_drives();
            let devices = match devices.join() {
                Ok(Ok(list)) => list.into_iter().map(|d| d.name).collect(),
                Ok(Err(e)) => {
                    warn!("{}", DriveError::LookupFailure(e.to_string()));
                    Vec::new()
                }
                Err(_) => {
                    warn!("Device query thread panicked");
                    Vec::new()
                }
            };
            (drives, devices)
        })
    }
}

fn supported_device_names(names: Vec<String>) -> HashSet<String> {
    names.iter().map(|n| normalize_name(n)).collect()
}

/// Device names compare with whitespace and trailing separators removed,
/// ignoring case: `"E:\"`, `"e:"` and `" E: "` are the same device.
pub fn normalize_name(name: &str) -> String {
    let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .trim_end_matches(['\\', '/'])
        .to_uppercase()
}

fn skip(name: &str, reason: SkipReason) -> SkippedDrive {
    SkippedDrive {
        name: name.to_owned(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RootHandle;
    use crate::platform::memory::MemoryBackend;
    use crate::providers::{CloudProvider, ConfiguredProviders};
    use std::time::Duration;

    fn run(backend: MemoryBackend, providers: Vec<CloudProvider>, excluded: &[&str]) -> (Arc<DriveRegistry>, EnumerationReport) {
        let registry = Arc::new(DriveRegistry::new());
        let enumerator = InitialEnumerator::new(
            registry.clone(),
            Arc::new(backend),
            Arc::new(ConfiguredProviders::new(providers)),
            Arc::new(ChangeNotifier::new(Duration::ZERO)),
            excluded.iter().map(|s| s.to_string()).collect(),
        );
        let report = enumerator.run();
        (registry, report)
    }

    fn root(path: &str) -> Result<RootHandle, ResolveError> {
        Ok(RootHandle::new(path, format!("Disk ({path})")))
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name(" e: \\"), "E:");
        assert_eq!(normalize_name("E:\\"), normalize_name("e:"));
    }

    #[test]
    fn test_one_fixed_drive_unauthorized() {
        let backend = MemoryBackend::new()
            .with_drive("C:\\", RawDriveType::Fixed, root("C:\\"))
            .with_drive(
                "D:\\",
                RawDriveType::Fixed,
                Err(ResolveError::Unauthorized("D:\\".into())),
            );
        let (registry, report) = run(backend, vec![], &[]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.items()[0].path, "C:");
        assert!(report.unauthorized);
        assert!(!report.show_consent_prompt);
        assert_eq!(report.skipped, vec![skip("D:\\", SkipReason::Unauthorized)]);
    }

    #[test]
    fn test_consent_prompt_when_only_removable_listed() {
        let backend = MemoryBackend::new()
            .with_drive(
                "C:\\",
                RawDriveType::Fixed,
                Err(ResolveError::Unauthorized("C:\\".into())),
            )
            .with_drive("E:\\", RawDriveType::Removable, root("E:\\"))
            .with_device("vol-e", "E:\\", root("E:\\"));
        let (registry, report) = run(backend, vec![], &[]);

        assert_eq!(registry.len(), 1);
        assert!(report.show_consent_prompt);
    }

    #[test]
    fn test_virtual_drives_do_not_suppress_consent_prompt() {
        let backend = MemoryBackend::new().with_drive(
            "C:\\",
            RawDriveType::Fixed,
            Err(ResolveError::Unauthorized("C:\\".into())),
        );
        let providers = vec![CloudProvider::new("OneDrive", "C:\\Users\\me\\OneDrive")];
        let (registry, report) = run(backend, providers, &[]);

        assert!(report.show_consent_prompt);
        assert_eq!(report.virtual_drives, 1);
        assert_eq!(registry.items()[0].drive_type, DriveType::VirtualDrive);
        assert!(registry.items()[0].root.is_none());
    }

    #[test]
    fn test_removable_unknown_to_device_store_is_dropped() {
        let backend = MemoryBackend::new()
            .with_drive("E:\\", RawDriveType::Removable, root("E:\\"))
            .with_drive("F:\\", RawDriveType::Removable, root("F:\\"))
            .with_device("vol-f", "f:", root("F:\\"));
        let (registry, report) = run(backend, vec![], &[]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.items()[0].path, "F:");
        assert_eq!(
            report.skipped,
            vec![skip("E:\\", SkipReason::UnsupportedRemovable)]
        );
    }

    #[test]
    fn test_failed_device_query_drops_all_removables() {
        let backend = MemoryBackend::new()
            .with_drive("C:\\", RawDriveType::Fixed, root("C:\\"))
            .with_drive("E:\\", RawDriveType::Removable, root("E:\\"))
            .with_device("vol-e", "E:\\", root("E:\\"));
        backend.fail_device_query(Some(ResolveError::Other("store offline".into())));
        let (registry, _) = run(backend, vec![], &[]);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.items()[0].drive_type, DriveType::Fixed);
    }

    #[test]
    fn test_provider_drive_is_kept_alongside_virtual_entry() {
        let backend = MemoryBackend::new()
            .with_drive("C:\\", RawDriveType::Fixed, root("C:\\"))
            .with_drive("G:\\", RawDriveType::Fixed, root("G:\\"))
            .with_drive("Z:\\", RawDriveType::Network, root("Z:\\"));
        let providers = vec![CloudProvider::new("Google Drive", "G:\\")];
        let (registry, report) = run(backend, providers, &["z:"]);

        let items = registry.items();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].path, "C:");
        assert_eq!(items[1].path, "G:");
        assert_eq!(items[1].drive_type, DriveType::Fixed);
        assert_eq!(items[2].drive_type, DriveType::VirtualDrive);
        assert_eq!(items[2].display_text, "Google Drive");
        assert!(items[2].root.is_some());
        assert_eq!(report.added, 2);
        assert_eq!(report.skipped, vec![skip("Z:\\", SkipReason::Excluded)]);
    }

    #[test]
    fn test_floppy_classification_and_order() {
        let backend = MemoryBackend::new()
            .with_drive("A:\\", RawDriveType::Fixed, root("A:\\"))
            .with_drive("C:\\", RawDriveType::Fixed, root("C:\\"))
            .with_drive("D:\\", RawDriveType::CdRom, root("D:\\"));
        let (registry, report) = run(backend, vec![], &[]);

        let types: Vec<DriveType> = registry.items().iter().map(|i| i.drive_type).collect();
        assert_eq!(
            types,
            vec![DriveType::FloppyDisk, DriveType::Fixed, DriveType::CdRom]
        );
        assert_eq!(report.added, 3);
    }
}
