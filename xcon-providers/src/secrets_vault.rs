//! A provider backed by a secrets vault that can enumerate names cheaply but
//! only fetch values one at a time (e.g. AWS Secrets Manager).
//!
//! Every secret path reachable by this process is listed once and cached
//! (with a null value, meaning "known to exist, not yet fetched"); values
//! are fetched lazily, one per directory+name, and cached under their own
//! key so a repeat lookup of the same name never re-invokes the client.

use crate::remote::{ConnectionPool, RemoteProviderState, SecretsVaultClient};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use xcon_core::{Directory, DirectoryChain, DirectoryItem, ItemValue, Provider, ProviderChain, ProviderError};
use xcon_local_cache::InternalLocalCache;

/// Names known to be available per directory, with values filled in lazily
/// as they're fetched.
type AvailableListing = HashMap<String, Option<String>>;

/// A secrets-vault-backed provider. Unlike [`crate::ParameterStoreProvider`],
/// listing happens once for the *entire vault*, not per directory: the
/// vault's list operation already returns full paths, so the per-directory
/// split is done locally after one list call.
pub struct SecretsVaultProvider<C> {
    pool: ConnectionPool<C>,
    local_cache: Arc<InternalLocalCache>,
    state: RemoteProviderState,
}

impl<C: SecretsVaultClient + 'static> SecretsVaultProvider<C> {
    /// Build a provider pooling `clients`, sharing `local_cache` with the
    /// rest of the provider chain.
    pub fn new(clients: impl IntoIterator<Item = C>, local_cache: Arc<InternalLocalCache>) -> Self {
        Self {
            pool: ConnectionPool::new(clients),
            local_cache,
            state: RemoteProviderState::default(),
        }
    }

    /// The "what's available, grouped by directory" listing, for the entire
    /// vault. Fetched once per process (subject to the shared local-cache
    /// expiry) since the vault's list operation is vault-wide.
    async fn available(&self) -> Result<Arc<HashMap<String, AvailableListing>>, ProviderError> {
        if let Some(cached) = self
            .local_cache
            .get::<HashMap<String, AvailableListing>>(self.name(), "*")
        {
            return Ok(cached);
        }

        let mut client = self.pool.acquire().await;
        match client.list_secret_paths().await {
            Ok(paths) => {
                let mut by_directory: HashMap<String, AvailableListing> = HashMap::new();
                for full_path in paths {
                    let Some(split_at) = full_path.rfind('/') else {
                        tracing::warn!(full_path, "secret path had no directory component, skipping");
                        continue;
                    };
                    let (directory, name) = full_path.split_at(split_at);
                    let name = &name[1..];
                    by_directory
                        .entry(directory.to_string())
                        .or_default()
                        .insert(name.to_lowercase(), None);
                }
                tracing::debug!(directories = by_directory.len(), "listed secrets vault");
                let listing = Arc::new(by_directory);
                self.local_cache
                    .insert(self.name(), "*", listing.clone());
                Ok(listing)
            }
            Err(error) => {
                self.state.record_error(&Directory::non_existent(), &error);
                Err(error)
            }
        }
    }
}

#[async_trait]
impl<C: SecretsVaultClient + 'static> Provider for SecretsVaultProvider<C> {
    fn name(&self) -> &str {
        "secrets"
    }

    async fn get_item(
        &self,
        name: &str,
        directory: &Directory,
        _dir_chain: &DirectoryChain,
        _provider_chain: &ProviderChain,
        _environ: &Directory,
    ) -> Result<Option<DirectoryItem>, ProviderError> {
        if self.state.is_errored(directory) {
            return Ok(None);
        }
        if let Some(sticky) = self.state.sticky_error() {
            return Err(sticky);
        }

        let available = match self.available().await {
            Ok(available) => available,
            Err(error) if error.is_recoverable() => return Ok(None),
            Err(error) => return Err(error),
        };
        let Some(names) = available.get(directory.path()) else {
            return Ok(None);
        };
        if !names.contains_key(name) {
            return Ok(None);
        }

        let full_path = format!("{}/{}", directory.path(), name);
        if let Some(cached) = self.local_cache.get::<DirectoryItem>(self.name(), &full_path) {
            return Ok(Some((*cached).clone()));
        }

        let mut client = self.pool.acquire().await;
        match client.get_secret_value(&full_path).await {
            Ok(Some(value)) => {
                let item = DirectoryItem::new(name, ItemValue::Str(value), directory.clone(), self.name())
                    .with_cacheable(true);
                self.local_cache
                    .insert(self.name(), &full_path, Arc::new(item.clone()));
                Ok(Some(item))
            }
            Ok(None) => Ok(None),
            Err(error) if error.is_recoverable() => {
                self.state.record_error(directory, &error);
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn retrieved_items_map(
        &self,
        _directory: &Directory,
    ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError> {
        // Values are fetched one at a time and never batch-retrieved, so
        // there's nothing coherent to contribute to an opportunistic cache
        // write beyond the single item the chain already has.
        Ok(Some(HashMap::new()))
    }
}
