//! A provider backed by a structured content table (e.g. a DynamoDB table
//! named for the whole organization's config), queried per directory
//! partition.

use crate::remote::{ConnectionPool, ContentTableClient, RemoteProviderState};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use xcon_core::{Directory, DirectoryChain, DirectoryItem, Provider, ProviderChain, ProviderError};
use xcon_local_cache::InternalLocalCache;

/// Looks up items by querying a structured content table's partition for a
/// directory. Supports an optional consistent-read flag, since most callers
/// don't need one and it costs more read capacity on the table.
pub struct ContentTableProvider<C> {
    pool: ConnectionPool<C>,
    local_cache: Arc<InternalLocalCache>,
    state: RemoteProviderState,
    consistent_read: bool,
}

impl<C: ContentTableClient + 'static> ContentTableProvider<C> {
    /// Build a provider pooling `clients`, sharing `local_cache` with the
    /// rest of the provider chain. `consistent_read` is forwarded to every
    /// query against the table.
    pub fn new(
        clients: impl IntoIterator<Item = C>,
        local_cache: Arc<InternalLocalCache>,
        consistent_read: bool,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(clients),
            local_cache,
            state: RemoteProviderState::default(),
            consistent_read,
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
        match client
            .items_for_directory(directory.path(), self.consistent_read)
            .await
        {
            Ok(rows) => {
                let listing: HashMap<String, DirectoryItem> = rows
                    .into_iter()
                    .map(|(name, value)| {
                        (
                            name.to_lowercase(),
                            DirectoryItem::new(&name, value, directory.clone(), self.name())
                                .with_cacheable(true),
                        )
                    })
                    .collect();
                tracing::debug!(directory = %directory, count = listing.len(), "queried content table directory");
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
impl<C: ContentTableClient + 'static> Provider for ContentTableProvider<C> {
    fn name(&self) -> &str {
        "content-table"
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
