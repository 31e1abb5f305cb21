//! A provider backed by a hierarchical key/value parameter store (e.g. AWS
//! Systems Manager Parameter Store), listed non-recursively per directory.

use crate::remote::{ConnectionPool, ParameterStoreClient, RemoteProviderState};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use xcon_core::{Directory, DirectoryChain, DirectoryItem, Provider, ProviderChain, ProviderError};
use xcon_local_cache::InternalLocalCache;

/// Looks up items directly under a directory's path in a parameter store.
/// The full directory listing is fetched and cached the first time any name
/// in it is requested.
pub struct ParameterStoreProvider<C> {
    pool: ConnectionPool<C>,
    local_cache: Arc<InternalLocalCache>,
    state: RemoteProviderState,
}

impl<C: ParameterStoreClient + 'static> ParameterStoreProvider<C> {
    /// Build a provider pooling `clients`, sharing `local_cache` with the
    /// rest of the provider chain.
    pub fn new(clients: impl IntoIterator<Item = C>, local_cache: Arc<InternalLocalCache>) -> Self {
        Self {
            pool: ConnectionPool::new(clients),
            local_cache,
            state: RemoteProviderState::default(),
        }
    }

    async fn listing_for(
        &self,
        directory: &Directory,
    ) -> Result<Arc<HashMap<String, DirectoryItem>>, ProviderError> {
        if let Some(listing) = self
            .local_cache
            .get::<HashMap<String, DirectoryItem>>(self.name(), directory.path())
        {
            return Ok(listing);
        }

        let mut client = self.pool.acquire().await;
        match client.list_parameters(directory.path()).await {
            Ok(params) => {
                let listing: HashMap<String, DirectoryItem> = params
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            name.to_lowercase(),
                            DirectoryItem::new(&name, value, directory.clone(), self.name())
                                .with_cacheable(true),
                        )
                    })
                    .collect();
                tracing::debug!(directory = %directory, count = listing.len(), "listed parameter store directory");
                let listing = Arc::new(listing);
                self.local_cache
                    .insert(self.name(), directory.path(), listing.clone());
                Ok(listing)
            }
            Err(error) => {
                self.state.record_error(directory, &error);
                Err(error)
            }
        }
    }
}

#[async_trait]
impl<C: ParameterStoreClient + 'static> Provider for ParameterStoreProvider<C> {
    fn name(&self) -> &str {
        "ssm"
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
        match self.listing_for(directory).await {
            Ok(listing) => Ok(listing.get(name).cloned()),
            Err(error) if error.is_recoverable() => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn retrieved_items_map(
        &self,
        directory: &Directory,
    ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError> {
        Ok(self
            .local_cache
            .get::<HashMap<String, DirectoryItem>>(self.name(), directory.path())
            .map(|listing| listing.as_ref().clone()))
    }
}
