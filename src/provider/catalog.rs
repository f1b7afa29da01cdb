//! Provider lookup.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{AppType, ProviderConfig};
use crate::provider::Provider;

/// Read-only view of the providers the host application manages.
pub trait ProviderCatalog: Send + Sync {
    fn get(&self, app: AppType, provider_id: &str) -> Option<Arc<Provider>>;
}

type ProviderTable = HashMap<(AppType, String), Arc<Provider>>;

/// Catalog backed by the `[[providers]]` section of the config file.
///
/// Lookups read a snapshot; `replace` swaps in a new table on reload.
#[derive(Debug)]
pub struct StaticCatalog {
    providers: ArcSwap<ProviderTable>,
}

impl StaticCatalog {
    pub fn new(configs: Vec<ProviderConfig>) -> Self {
        Self {
            providers: ArcSwap::from_pointee(Self::table(configs)),
        }
    }

    fn table(configs: Vec<ProviderConfig>) -> ProviderTable {
        configs
            .into_iter()
            .map(|config| {
                let provider = Provider::from(config);
                ((provider.app_type, provider.id.clone()), Arc::new(provider))
            })
            .collect()
    }

    pub fn replace(&self, configs: Vec<ProviderConfig>) {
        let table = Self::table(configs);
        tracing::info!(providers = table.len(), "Provider catalog replaced");
        self.providers.store(Arc::new(table));
    }
}

impl ProviderCatalog for StaticCatalog {
    fn get(&self, app: AppType, provider_id: &str) -> Option<Arc<Provider>> {
        self.providers
            .load()
            .get(&(app, provider_id.to_string()))
            .cloned()
    }
}
