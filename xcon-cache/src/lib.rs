#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! The shared-table cache provider: wraps a remote key/value table as a
//! [`xcon_core::Provider`] that sits at the seam between fast local
//! providers and slow remote ones, memoizing whatever the chain finds past
//! it.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::{collections::HashMap, sync::Arc};
use xcon_core::{
    ConnectionPool, Directory, DirectoryChain, DirectoryItem, Provider, ProviderChain,
    ProviderError, TableRecord,
};
use xcon_local_cache::InternalLocalCache;

/// A remote key/value table client backing the shared cache. Implementations
/// are supplied by the embedding service.
#[async_trait]
pub trait CacheStoreClient: Send + Sync {
    /// Fetch every row for the given hash key (an `/{service}/{environment}`
    /// style directory path).
    async fn get_items(&mut self, hash_key: &str) -> Result<Vec<TableRecord>, ProviderError>;

    /// Write `items` to the table, overwriting any existing row with the
    /// same hash/range key pair.
    async fn put_items(&mut self, items: Vec<TableRecord>) -> Result<(), ProviderError>;
}

/// The shared cache, implemented as a [`Provider`] so the provider chain can
/// interleave it with everything else without special-casing it.
///
/// Reads: fetch every row for the ambient hash key once (cached locally per
/// process), filter to rows whose fingerprints match the current directory
/// chain and provider chain, and serve from that filtered listing.
///
/// Writes: every cacheable item found past the cache seam whose value
/// differs from what's already locally cached is written back with a shared
/// TTL computed once at construction (the default, jittered by up to
/// `ttl_jitter` either direction so many processes don't expire in
/// lockstep), unless the item carries its own TTL override. A successful
/// write patches this provider's own local-cache entries in place rather
/// than invalidating the process-wide local cache every other provider
/// shares.
pub struct CacheProvider<C> {
    pool: ConnectionPool<C>,
    local_cache: Arc<InternalLocalCache>,
    ttl: DateTime<Utc>,
}

impl<C: CacheStoreClient + 'static> CacheProvider<C> {
    /// Build a cache provider pooling `clients`. `default_ttl` and
    /// `ttl_jitter` come from [`xcon_settings`]'s `SharedCacheSettings`; the
    /// jittered TTL is fixed once here and reused for every write for the
    /// life of this provider instance, the same way a single process keeps
    /// one random offset rather than re-rolling per item.
    pub fn new(
        clients: impl IntoIterator<Item = C>,
        local_cache: Arc<InternalLocalCache>,
        default_ttl: std::time::Duration,
        ttl_jitter: std::time::Duration,
    ) -> Self {
        let jitter_secs = ttl_jitter.as_secs() as i64;
        let offset = if jitter_secs > 0 {
            rand::thread_rng().gen_range(-jitter_secs..=jitter_secs)
        } else {
            0
        };
        let ttl = Utc::now()
            + ChronoDuration::seconds(default_ttl.as_secs() as i64)
            + ChronoDuration::seconds(offset);
        Self {
            pool: ConnectionPool::new(clients),
            local_cache,
            ttl,
        }
    }

    fn fingerprint_matches(record: &TableRecord, dir_paths: &str, provider_names: &str) -> bool {
        record.cache_concat_directory_paths.as_deref() == Some(dir_paths)
            && record.cache_concat_provider_names.as_deref() == Some(provider_names)
    }

    /// The local-cache key a listing for this `(environ, dir_paths,
    /// provider_names)` triple is stored under, shared by the read path and
    /// the in-place patch the write path applies after a successful write.
    fn listing_cache_key(environ: &Directory, dir_paths: &str, provider_names: &str) -> String {
        format!("{}|{dir_paths}|+|{provider_names}", environ.path())
    }

    async fn listing_for(
        &self,
        environ: &Directory,
        dir_paths: &str,
        provider_names: &str,
    ) -> Result<Arc<HashMap<String, DirectoryItem>>, ProviderError> {
        let listing_key = Self::listing_cache_key(environ, dir_paths, provider_names);
        if let Some(listing) = self
            .local_cache
            .get::<HashMap<String, DirectoryItem>>("cacher", &listing_key)
        {
            return Ok(listing);
        }

        let rows = self.rows_for_environ(environ).await?;
        let now = Utc::now();
        let listing: HashMap<String, DirectoryItem> = rows
            .iter()
            .filter(|row| !row.is_expired(now))
            .filter(|row| Self::fingerprint_matches(row, dir_paths, provider_names))
            .map(|row| {
                let item = DirectoryItem::from_record(row, environ.clone()).with_from_cacher();
                (item.name.clone(), item)
            })
            .collect();

        let listing = Arc::new(listing);
        self.local_cache.insert("cacher", &listing_key, listing.clone());
        Ok(listing)
    }

    /// Fold newly written rows into this provider's own local-cache entries
    /// (the filtered-listing and raw-rows entries `listing_for` populates)
    /// in place, rather than invalidating the whole process-wide local
    /// cache every other provider also shares.
    fn patch_local_listing(
        &self,
        environ: &Directory,
        dir_paths: &str,
        provider_names: &str,
        new_rows: &[TableRecord],
    ) {
        let listing_key = Self::listing_cache_key(environ, dir_paths, provider_names);
        let mut listing: HashMap<String, DirectoryItem> = self
            .local_cache
            .get::<HashMap<String, DirectoryItem>>("cacher", &listing_key)
            .map(|existing| existing.as_ref().clone())
            .unwrap_or_default();
        for row in new_rows {
            let item = DirectoryItem::from_record(row, environ.clone()).with_from_cacher();
            listing.insert(item.name.clone(), item);
        }
        self.local_cache.insert("cacher", &listing_key, Arc::new(listing));

        let mut rows: Vec<TableRecord> = self
            .local_cache
            .get::<Vec<TableRecord>>("cacher-rows", environ.path())
            .map(|existing| existing.as_ref().clone())
            .unwrap_or_default();
        for new_row in new_rows {
            rows.retain(|row| row.name_key != new_row.name_key);
            rows.push(new_row.clone());
        }
        self.local_cache
            .insert("cacher-rows", environ.path(), Arc::new(rows));
    }

    async fn rows_for_environ(&self, environ: &Directory) -> Result<Arc<Vec<TableRecord>>, ProviderError> {
        if let Some(rows) = self
            .local_cache
            .get::<Vec<TableRecord>>("cacher-rows", environ.path())
        {
            return Ok(rows);
        }

        let mut client = self.pool.acquire().await;
        let rows = client.get_items(environ.path()).await?;
        tracing::debug!(environ = %environ, count = rows.len(), "fetched shared cache rows");
        let rows = Arc::new(rows);
        self.local_cache
            .insert("cacher-rows", environ.path(), rows.clone());
        Ok(rows)
    }
}

#[async_trait]
impl<C: CacheStoreClient + 'static> Provider for CacheProvider<C> {
    fn name(&self) -> &str {
        "cacher"
    }

    fn is_cacher(&self) -> bool {
        true
    }

    async fn get_item(
        &self,
        name: &str,
        _directory: &Directory,
        dir_chain: &DirectoryChain,
        provider_chain: &ProviderChain,
        environ: &Directory,
    ) -> Result<Option<DirectoryItem>, ProviderError> {
        let listing = self
            .listing_for(
                environ,
                dir_chain.concatenated_directory_paths(),
                provider_chain.concatenated_provider_names(),
            )
            .await?;
        Ok(listing.get(name).cloned())
    }

    async fn retrieved_items_map(
        &self,
        _directory: &Directory,
    ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError> {
        // The cache doesn't accumulate a per-directory listing the way the
        // remote providers do; it writes its batch once at the end of a
        // lookup via `cache_items`, so it has nothing to contribute here.
        Ok(Some(HashMap::new()))
    }

    async fn cache_items(
        &self,
        items: Vec<DirectoryItem>,
        dir_chain: &DirectoryChain,
        provider_chain: &ProviderChain,
        environ: &Directory,
    ) -> Result<(), ProviderError> {
        let dir_paths = dir_chain.concatenated_directory_paths();
        let provider_names = provider_chain.concatenated_provider_names();

        let current = self
            .listing_for(environ, dir_paths, provider_names)
            .await
            .unwrap_or_else(|_| Arc::new(HashMap::new()));

        let changed: Vec<DirectoryItem> = items
            .into_iter()
            .filter(|item| item.cacheable)
            .filter(|item| {
                !current
                    .get(&item.name)
                    .is_some_and(|cached| cached.value == item.value)
            })
            .collect();

        if changed.is_empty() {
            return Ok(());
        }

        let rows: Vec<TableRecord> = changed
            .into_iter()
            .map(|item| {
                let ttl = item.ttl.unwrap_or(self.ttl);
                let range_key = format!("{}|+|{dir_paths}|+|{provider_names}", item.name);
                item.with_cache_fingerprints(environ.path(), range_key, dir_paths, provider_names)
                    .with_ttl(ttl)
            })
            .map(|item| item.to_record())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|error| ProviderError::Internal(error.into()))?;

        tracing::debug!(environ = %environ, count = rows.len(), "writing to shared cache");
        let mut client = self.pool.acquire().await;
        client.put_items(rows.clone()).await?;

        self.patch_local_listing(environ, dir_paths, provider_names, &rows);
        Ok(())
    }
}
