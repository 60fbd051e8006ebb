/// Cloud-sync providers, surfaced in the registry as virtual drives.
///
/// How a provider's installation is detected is not this crate's concern;
/// anything implementing [`CloudProviderSource`] can feed the enumerator.
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// An installed cloud-sync client and its local sync folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudProvider {
    pub name: String,
    pub sync_folder: String,
}

impl CloudProvider {
    pub fn new(name: impl Into<String>, sync_folder: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sync_folder: sync_folder.into(),
        }
    }
}

pub trait CloudProviderSource: Send + Sync {
    fn list_installed_providers(&self) -> Result<Vec<CloudProvider>>;
}

/// Providers listed in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredProviders {
    providers: Vec<CloudProvider>,
}

impl ConfiguredProviders {
    pub fn new(providers: Vec<CloudProvider>) -> Self {
        Self { providers }
    }
}

impl CloudProviderSource for ConfiguredProviders {
    fn list_installed_providers(&self) -> Result<Vec<CloudProvider>> {
        Ok(self
            .providers
            .iter()
            .filter(|p| !p.name.is_empty() && !p.sync_folder.is_empty())
            .cloned()
            .collect())
    }
}
