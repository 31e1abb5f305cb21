//! The `Provider` contract and the `ProviderChain` that orchestrates
//! traversal across a list of them.

use crate::{
    directory::{Directory, DirectoryChain},
    errors::ProviderError,
    item::DirectoryItem,
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};

/// A source of [`DirectoryItem`]s for a directory: the process environment,
/// a remote service, or the shared cache.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Identifier used in cache fingerprints and logs. Stable across the
    /// life of the provider instance.
    fn name(&self) -> &str;

    /// Marks the shared-cache provider. The chain treats all providers
    /// uniformly, but positions the cacher specially and checks this flag
    /// before calling [`Provider::cache_items`].
    fn is_cacher(&self) -> bool {
        false
    }

    /// If true, this provider is consulted *before* the shared cache is
    /// checked (the environment provider is the canonical example). Such
    /// providers are excluded from the provider-chain fingerprint while
    /// they remain the leading prefix of the chain.
    fn query_before_cache_if_possible(&self) -> bool {
        false
    }

    /// If false, this provider may be queried with a null/placeholder
    /// directory (again, the environment provider: it answers the same way
    /// regardless of directory).
    fn needs_directory(&self) -> bool {
        true
    }

    /// Look up `name` in `directory`. Returns `Ok(None)` for "not found
    /// here, keep looking"; a recoverable [`ProviderError`] is treated the
    /// same way by the chain, after being logged.
    async fn get_item(
        &self,
        name: &str,
        directory: &Directory,
        dir_chain: &DirectoryChain,
        provider_chain: &ProviderChain,
        environ: &Directory,
    ) -> Result<Option<DirectoryItem>, ProviderError>;

    /// Return every item this provider has already retrieved for
    /// `directory`, or `Ok(None)` if this provider has not yet queried that
    /// directory at all. The `None` case is distinct from `Ok(Some(empty
    /// map))` and is load-bearing: [`ProviderChain::get_item`]'s cache-write
    /// merge stops at the first provider that returns `None`, to avoid
    /// writing a partial chain's results to the shared cache.
    async fn retrieved_items_map(
        &self,
        directory: &Directory,
    ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError>;

    /// Write `items` to the shared cache, keyed by the given chain
    /// fingerprints. Only the cache provider overrides this; all other
    /// providers inherit the default, which fails with
    /// [`ProviderError::NotACacher`].
    async fn cache_items(
        &self,
        _items: Vec<DirectoryItem>,
        _dir_chain: &DirectoryChain,
        _provider_chain: &ProviderChain,
        _environ: &Directory,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::NotACacher)
    }
}

/// Ordered collection of providers walked per lookup per directory.
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
    concatenated_provider_names: String,
    have_any_cacheable_providers: bool,
}

impl ProviderChain {
    /// Build a chain from an ordered list of providers.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        let concatenated_provider_names = Self::fingerprint(&providers);
        let have_any_cacheable_providers = providers.iter().any(|p| !p.query_before_cache_if_possible());
        Self {
            providers,
            concatenated_provider_names,
            have_any_cacheable_providers,
        }
    }

    /// The providers, in traversal order.
    #[must_use]
    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    /// The comma-joined fingerprint used as a cache-key component. Excludes
    /// any leading run of `query_before_cache_if_possible` providers (they
    /// never reach the cache seam), but includes such a provider if one
    /// appears after the leading run ends.
    #[must_use]
    pub fn concatenated_provider_names(&self) -> &str {
        &self.concatenated_provider_names
    }

    /// True if at least one provider in the chain can reach the shared
    /// cache seam (i.e. is not part of the leading `query_before_cache_if_possible`
    /// prefix).
    #[must_use]
    pub fn have_any_cacheable_providers(&self) -> bool {
        self.have_any_cacheable_providers
    }

    fn fingerprint(providers: &[Arc<dyn Provider>]) -> String {
        let mut names = Vec::with_capacity(providers.len());
        let mut in_leading_prefix = true;
        for provider in providers {
            if in_leading_prefix && provider.query_before_cache_if_possible() {
                continue;
            }
            in_leading_prefix = false;
            names.push(provider.name().to_string());
        }
        names.join(",")
    }

    /// Interleave the cache provider into the chain, inserted exactly once,
    /// immediately before the first provider whose
    /// `query_before_cache_if_possible` is false.
    fn interleaved_with_cache<'a>(&'a self, cache: Option<&'a dyn Provider>) -> Vec<&'a dyn Provider> {
        let mut result = Vec::with_capacity(self.providers.len() + 1);
        let mut inserted = cache.is_none();
        for provider in &self.providers {
            if !inserted && !provider.query_before_cache_if_possible() {
                if let Some(cache) = cache {
                    result.push(cache);
                }
                inserted = true;
            }
            result.push(provider.as_ref());
        }
        if !inserted {
            if let Some(cache) = cache {
                result.push(cache);
            }
        }
        result
    }

    /// Walk `dir_chain`, consulting `self.providers` (with `cache`
    /// interleaved at the correct seam) for each directory in order, and
    /// return the first item found. On success, opportunistically writes a
    /// flattened, coherent record to the shared cache.
    pub async fn get_item(
        &self,
        name: &str,
        dir_chain: &DirectoryChain,
        cache: Option<&dyn Provider>,
        environ: &Directory,
    ) -> DirectoryItem {
        let lower_name = name.to_lowercase();
        let interleaved = self.interleaved_with_cache(cache);
        let mut cache_in_use = cache.is_some();
        let mut items_to_write: HashMap<String, DirectoryItem> = HashMap::new();
        let mut result: Option<DirectoryItem> = None;

        for directory in dir_chain.directories() {
            let mut item: Option<DirectoryItem> = None;

            for provider in &interleaved {
                match provider
                    .get_item(&lower_name, directory, dir_chain, self, environ)
                    .await
                {
                    Ok(Some(found)) => {
                        tracing::debug!(
                            provider = provider.name(),
                            directory = %directory,
                            "found item"
                        );
                        item = Some(found);
                        break;
                    }
                    Ok(None) => continue,
                    Err(error) if error.is_recoverable() => {
                        tracing::warn!(
                            provider = provider.name(),
                            directory = %directory,
                            %error,
                            "recoverable provider error, skipping directory"
                        );
                        continue;
                    }
                    Err(error) => {
                        tracing::error!(
                            provider = provider.name(),
                            directory = %directory,
                            %error,
                            "unrecoverable provider error, aborting lookup"
                        );
                        return DirectoryItem::non_existent(name);
                    }
                }
            }

            if cache_in_use {
                if let Some(found) = &item {
                    if !found.cacheable {
                        // The environment (or another authoritative,
                        // non-cacheable) value won; the cache has nothing
                        // useful to say about this lookup.
                        cache_in_use = false;
                    }
                }
            }

            if cache_in_use {
                self.merge_retrieved_items(&interleaved, directory, &mut items_to_write)
                    .await;
            }

            if let Some(found) = item {
                result = Some(found);
                break;
            }
        }

        let final_item = result.unwrap_or_else(|| DirectoryItem::non_existent(name));

        if cache_in_use && final_item.cacheable {
            if let Some(cache_provider) = cache {
                items_to_write.insert(final_item.name.clone(), final_item.clone());
                let to_write: Vec<DirectoryItem> = items_to_write.into_values().collect();
                if let Err(error) = cache_provider
                    .cache_items(to_write, dir_chain, self, environ)
                    .await
                {
                    tracing::warn!(%error, "failed to write to shared cache");
                }
            }
        }

        final_item
    }

    /// Merge every walked provider's `retrieved_items_map` for `directory`
    /// into `items_to_write`, stopping at the first provider that hasn't
    /// queried this directory yet.
    async fn merge_retrieved_items(
        &self,
        interleaved: &[&dyn Provider],
        directory: &Directory,
        items_to_write: &mut HashMap<String, DirectoryItem>,
    ) {
        for provider in interleaved {
            match provider.retrieved_items_map(directory).await {
                Ok(Some(map)) => {
                    for (key, value) in map {
                        items_to_write.entry(key).or_insert(value);
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(
                        provider = provider.name(),
                        %error,
                        "error merging retrieved items for cache write, stopping merge"
                    );
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeProvider {
        name: String,
        query_before_cache: bool,
        items: HashMap<(String, String), DirectoryItem>,
        seen_directories: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(name: &str, query_before_cache: bool) -> Self {
            Self {
                name: name.to_string(),
                query_before_cache,
                items: HashMap::new(),
                seen_directories: Mutex::new(Vec::new()),
            }
        }

        fn with_item(mut self, directory: &str, item: DirectoryItem) -> Self {
            self.items
                .insert((directory.to_string(), item.name.clone()), item);
            self
        }
    }

    #[async_trait]
    impl Provider for FakeProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn query_before_cache_if_possible(&self) -> bool {
            self.query_before_cache
        }

        async fn get_item(
            &self,
            name: &str,
            directory: &Directory,
            _dir_chain: &DirectoryChain,
            _provider_chain: &ProviderChain,
            _environ: &Directory,
        ) -> Result<Option<DirectoryItem>, ProviderError> {
            self.seen_directories
                .lock()
                .unwrap()
                .push(directory.path().to_string());
            Ok(self
                .items
                .get(&(directory.path().to_string(), name.to_string()))
                .cloned())
        }

        async fn retrieved_items_map(
            &self,
            directory: &Directory,
        ) -> Result<Option<HashMap<String, DirectoryItem>>, ProviderError> {
            let map: HashMap<String, DirectoryItem> = self
                .items
                .iter()
                .filter(|((dir, _), _)| dir == directory.path())
                .map(|((_, name), item)| (name.clone(), item.clone()))
                .collect();
            Ok(Some(map))
        }
    }

    fn item(name: &str, dir: &str, value: &str, cacheable: bool) -> DirectoryItem {
        DirectoryItem::new(
            name,
            crate::item::ItemValue::from(value),
            Directory::from_path(dir).unwrap(),
            "test",
        )
        .with_cacheable(cacheable)
    }

    #[tokio::test]
    async fn first_matching_provider_and_directory_wins() {
        let env = Arc::new(FakeProvider::new("env", true));
        let param_store = Arc::new(
            FakeProvider::new("param", false)
                .with_item("/acme/prod", item("test_name", "/acme/prod", "ssmValue", true)),
        );
        let chain = ProviderChain::new(vec![env, param_store]);
        let dir_chain = DirectoryChain::new(vec![Directory::from_path("/acme/prod").unwrap()]);
        let environ = Directory::from_path("/acme/prod").unwrap();

        let found = chain.get_item("test_name", &dir_chain, None, &environ).await;
        assert_eq!(found.value.as_str(), Some("ssmValue"));
        assert!(!found.is_non_existent());
    }

    #[tokio::test]
    async fn missing_name_returns_non_existent_sentinel() {
        let param_store = Arc::new(FakeProvider::new("param", false));
        let chain = ProviderChain::new(vec![param_store]);
        let dir_chain = DirectoryChain::new(vec![Directory::from_path("/acme").unwrap()]);
        let environ = Directory::from_path("/acme").unwrap();

        let found = chain
            .get_item("does_not_exist", &dir_chain, None, &environ)
            .await;
        assert!(found.is_non_existent());
    }

    #[test]
    fn fingerprint_excludes_leading_query_before_cache_providers() {
        let env = Arc::new(FakeProvider::new("env", true));
        let param = Arc::new(FakeProvider::new("param", false));
        let chain = ProviderChain::new(vec![env, param]);
        assert_eq!(chain.concatenated_provider_names(), "param");
    }

    #[test]
    fn fingerprint_includes_trailing_query_before_cache_provider() {
        let env = Arc::new(FakeProvider::new("env", true));
        let param = Arc::new(FakeProvider::new("param", false));
        let late_env_like = Arc::new(FakeProvider::new("late", true));
        let chain = ProviderChain::new(vec![env, param, late_env_like]);
        assert_eq!(chain.concatenated_provider_names(), "param,late");
    }

    #[test]
    fn fingerprint_is_stable_for_equal_chains() {
        let chain_a = ProviderChain::new(vec![
            Arc::new(FakeProvider::new("env", true)),
            Arc::new(FakeProvider::new("param", false)),
        ]);
        let chain_b = ProviderChain::new(vec![
            Arc::new(FakeProvider::new("env", true)),
            Arc::new(FakeProvider::new("param", false)),
        ]);
        assert_eq!(
            chain_a.concatenated_provider_names(),
            chain_b.concatenated_provider_names()
        );
    }
}
