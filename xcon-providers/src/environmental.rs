//! A provider backed by the current process's environment variables.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use xcon_core::{Directory, DirectoryChain, DirectoryItem, ItemValue, Provider, ProviderChain, ProviderError};

/// Reads config values out of the process environment.
///
/// Lazily snapshots `std::env::vars()` the first time it's asked for a
/// value, lower-casing every key. The snapshot lives behind an `ArcSwap` so
/// tests can install a fake environment with [`EnvironmentalProvider::from_map`]
/// without touching real process state.
pub struct EnvironmentalProvider {
    snapshot: ArcSwap<Option<HashMap<String, String>>>,
    fixed: bool,
}

impl EnvironmentalProvider {
    /// Create a provider that lazily snapshots the real process environment
    /// on first use.
    #[must_use]
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(None),
            fixed: false,
        }
    }

    /// Create a provider fixed to `vars`, for tests. Never reads the real
    /// process environment.
    #[must_use]
    pub fn from_map(vars: HashMap<String, String>) -> Self {
        let lowered = vars
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Self {
            snapshot: ArcSwap::from_pointee(Some(lowered)),
            fixed: true,
        }
    }

    fn ensure_snapshot(&self) {
        if self.fixed {
            return;
        }
        if self.snapshot.load().is_some() {
            return;
        }
        let vars: HashMap<String, String> = std::env::vars()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        tracing::debug!(count = vars.len(), "snapshotted process environment");
        self.snapshot.store(Arc::new(Some(vars)));
    }
}

impl Default for EnvironmentalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for EnvironmentalProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn query_before_cache_if_possible(&self) -> bool {
        true
    }

    fn needs_directory(&self) -> bool {
        false
    }

    async fn get_item(
        &self,
        name: &str,
        _directory: &Directory,
        _dir_chain: &DirectoryChain,
        _provider_chain: &ProviderChain,
        _environ: &Directory,
    ) -> Result<Option<DirectoryItem>, ProviderError> {
        self.ensure_snapshot();
        let guard = self.snapshot.load();
        let value = guard
            .as_ref()
            .as_ref()
            .and_then(|vars| vars.get(name))
            .cloned();
        Ok(value.map(|v| {
            DirectoryItem::new(name, ItemValue::Str(v), Directory::non_existent(), self.name())
                .with_cacheable(false)
        }))
    }

    async fn retrieved_items_map(
        &self,
        _directory: &Directory,
    ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError> {
        // Environment values are never written to the shared cache; an
        // empty map (not None) tells the chain this provider has nothing
        // more to contribute for this directory without stopping the merge.
        Ok(Some(HashMap::new()))
    }
}
