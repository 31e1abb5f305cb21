//! The public resolution object: per-instance overrides and defaults, the
//! inheritable provider/directory/export/cache/service/environment fields,
//! and the lookup algorithm that ties them together.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use xcon_core::{Directory, DirectoryChain, DirectoryItem, ItemValue, Provider, ProviderChain};
use xcon_local_cache::InternalLocalCache;
use xcon_providers::EnvironmentalProvider;
use xcon_settings::Settings;

use crate::inherit::{resolve_list, InheritableList, ListItem, Scalar};
use crate::stack;

/// One configured export: items under `/{service}/{environment}/export` are
/// appended to the effective directory chain.
#[derive(Debug, Clone)]
pub struct ExportSpec {
    /// The other service whose `export` directory should be consulted.
    pub service: String,
}

/// Per-lookup switches. Both default to `false`, matching an ordinary
/// `get`/`get_item` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupOptions {
    /// Restrict the lookup to the override and default layers; the provider
    /// chain (and therefore the shared cache) is never consulted.
    pub skip_providers: bool,
    /// Reset the per-process local cache before this lookup, forcing every
    /// provider to issue a fresh remote call (or shared-cache read) rather
    /// than answer from a listing it already holds.
    pub ignore_local_caches: bool,
}

/// The default directory list used when nothing inheritable resolves to an
/// explicit value: `/{service}/{environment}`, `/{service}`,
/// `/global/{environment}`, `/global`.
fn factory_default_directories() -> Vec<Directory> {
    ["/{service}/{environment}", "/{service}", "/global/{environment}", "/global"]
        .into_iter()
        .map(|path| Directory::from_path(path).expect("literal default directory templates are valid"))
        .collect()
}

/// Holds per-instance overrides/defaults and the inheritable fields that
/// resolve (via the ambient parent chain) into an effective provider chain,
/// directory chain, and cache.
pub struct Config {
    use_parent: bool,
    providers: InheritableList<Arc<dyn Provider>>,
    directories: InheritableList<Directory>,
    exports: InheritableList<ExportSpec>,
    cache: Scalar<Option<Arc<dyn Provider>>>,
    service: Scalar<String>,
    environment: Scalar<String>,
    overrides: RwLock<HashMap<String, ItemValue>>,
    defaults: RwLock<HashMap<String, ItemValue>>,
    settings: Arc<Settings>,
    local_cache: Arc<InternalLocalCache>,
}

impl Config {
    /// Build a `Config` with every inheritable field set to `Inherit`: an
    /// island with nothing configured of its own until the caller calls
    /// `add_provider`/`add_directory`/`set_cache`/etc., or relies entirely on
    /// the parent chain and factory defaults.
    #[must_use]
    pub fn new_root(settings: Arc<Settings>, local_cache: Arc<InternalLocalCache>) -> Self {
        Self {
            use_parent: true,
            providers: vec![ListItem::Inherit],
            directories: vec![ListItem::Inherit],
            exports: vec![ListItem::Inherit],
            cache: Scalar::Inherit,
            service: Scalar::Inherit,
            environment: Scalar::Inherit,
            overrides: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
            settings,
            local_cache,
        }
    }

    /// Stop ascending the parent chain at this `Config` (inclusive) once it
    /// is itself reached while walking from a descendant.
    #[must_use]
    pub fn with_use_parent(mut self, use_parent: bool) -> Self {
        self.use_parent = use_parent;
        self
    }

    /// Append a provider to this `Config`'s own provider list.
    pub fn add_provider(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.push(ListItem::Value(provider));
        self
    }

    /// Append a directory to this `Config`'s own directory list.
    pub fn add_directory(&mut self, directory: Directory) -> &mut Self {
        self.directories.push(ListItem::Value(directory));
        self
    }

    /// Append an export.
    pub fn add_export(&mut self, service: impl Into<String>) -> &mut Self {
        self.exports.push(ListItem::Value(ExportSpec {
            service: service.into(),
        }));
        self
    }

    /// Replace the entire export list.
    pub fn set_exports(&mut self, exports: Vec<ExportSpec>) -> &mut Self {
        self.exports = exports.into_iter().map(ListItem::Value).collect();
        self
    }

    /// Set an explicit shared cache (or `None` to explicitly disable it,
    /// distinct from leaving it as `Inherit`).
    pub fn set_cache(&mut self, cache: Option<Arc<dyn Provider>>) -> &mut Self {
        self.cache = Scalar::Value(cache);
        self
    }

    /// Override `service` for the purpose of resolving directory templates.
    /// Does not change the shared cache's hash key, which always uses the
    /// ambient settings' service.
    pub fn set_service(&mut self, service: impl Into<String>) -> &mut Self {
        self.service = Scalar::Value(service.into());
        self
    }

    /// Override `environment`, the same way `set_service` overrides
    /// `service`.
    pub fn set_environment(&mut self, environment: impl Into<String>) -> &mut Self {
        self.environment = Scalar::Value(environment.into());
        self
    }

    /// Set an override for `name`, stored under the synthetic `/_override`
    /// path. Overrides always win over the provider chain and defaults.
    pub fn set_override(&self, name: &str, value: ItemValue) {
        self.overrides
            .write()
            .unwrap()
            .insert(name.to_lowercase(), value);
    }

    /// Remove a previously set override.
    pub fn remove_override(&self, name: &str) {
        self.overrides.write().unwrap().remove(&name.to_lowercase());
    }

    /// Set a default for `name`, stored under the synthetic
    /// `/_default/user-set` path. Defaults are consulted after the provider
    /// chain, before the hard-coded fallback.
    pub fn set_default(&self, name: &str, value: ItemValue) {
        self.defaults
            .write()
            .unwrap()
            .insert(name.to_lowercase(), value);
    }

    /// Remove a previously set default.
    pub fn remove_default(&self, name: &str) {
        self.defaults.write().unwrap().remove(&name.to_lowercase());
    }

    /// Push this `Config` onto the ambient stack for the life of the
    /// returned guard, making it available as the current parent-chain
    /// starting point for any lookup performed while the guard is held.
    #[must_use]
    pub fn push(self: &Arc<Self>) -> stack::ConfigScope {
        stack::push(self.clone())
    }

    /// Collect the parent chain: ascend the ambient stack from its top,
    /// skipping `self`, stopping (inclusively) at the first `Config` whose
    /// `use_parent` is false. If `self.use_parent` is false and `self` isn't
    /// itself present in the ambient stack, the chain is empty — `self` is
    /// an island with no parents.
    fn parent_chain(self: &Arc<Self>) -> Vec<Arc<Config>> {
        let ambient = stack::snapshot();
        if !self.use_parent && !ambient.iter().any(|c| Arc::ptr_eq(c, self)) {
            return Vec::new();
        }

        let mut chain = Vec::new();
        for candidate in &ambient {
            if Arc::ptr_eq(candidate, self) {
                continue;
            }
            chain.push(candidate.clone());
            if !candidate.use_parent {
                break;
            }
        }
        chain
    }

    /// Resolve the effective provider chain and shared cache, honoring the
    /// env-only and disable-cache switches.
    fn effective_providers_and_cache(
        &self,
        parents: &[Arc<Config>],
    ) -> (ProviderChain, Option<Arc<dyn Provider>>) {
        if self.settings.only_env_provider {
            let env_provider: Arc<dyn Provider> = Arc::new(EnvironmentalProvider::new());
            return (ProviderChain::new(vec![env_provider]), None);
        }

        let providers = resolve_list(
            &self.providers,
            parents,
            &|c| c.providers.clone(),
            &Vec::new,
        );
        let (cache, explicit) = self.cache.resolve(parents, &|c| c.cache.clone(), &|| None);
        let cache = if !explicit && self.settings.disable_default_cacher {
            None
        } else {
            cache
        };
        (ProviderChain::new(providers), cache)
    }

    /// Resolve the effective directory chain (normal directories plus
    /// templated export directories, all resolved against the effective
    /// service/environment) and the environ directory used as the shared
    /// cache's hash key.
    fn effective_directories_and_environ(&self, parents: &[Arc<Config>]) -> (DirectoryChain, Directory) {
        let (service, _) = self
            .service
            .resolve(parents, &|c| c.service.clone(), &|| self.settings.service.clone());
        let (environment, _) = self.environment.resolve(
            parents,
            &|c| c.environment.clone(),
            &|| self.settings.environment.clone(),
        );

        let mut directories = resolve_list(
            &self.directories,
            parents,
            &|c| c.directories.clone(),
            &factory_default_directories,
        );
        let exports = resolve_list(&self.exports, parents, &|c| c.exports.clone(), &Vec::new);
        for export in exports {
            if let Ok(dir) = Directory::from_parts(export.service, Some(environment.clone()), true) {
                directories.push(dir);
            }
        }

        let resolved: Vec<Directory> = directories
            .into_iter()
            .filter_map(|d| d.resolve(&service, &environment).ok())
            .collect();

        let environ = Directory::from_parts(
            self.settings.service.clone(),
            Some(self.settings.environment.clone()),
            false,
        )
        .unwrap_or_else(|_| Directory::non_existent());

        (DirectoryChain::new(resolved), environ)
    }

    fn synthetic_item(name: &str, value: ItemValue, path: &str) -> DirectoryItem {
        let directory = Directory::from_path(path).unwrap_or_else(|_| Directory::non_existent());
        DirectoryItem::new(name, value, directory, path)
    }

    /// Look up `name`, trying, in order: this `Config`'s overrides, each
    /// parent's overrides (nearest first), the provider chain, and this
    /// `Config`'s defaults. Returns the non-existent sentinel if nothing
    /// answers.
    pub async fn get_item(self: &Arc<Self>, name: &str) -> DirectoryItem {
        self.get_item_opts(name, LookupOptions::default()).await
    }

    /// [`Config::get_item`] with [`LookupOptions`].
    pub async fn get_item_opts(self: &Arc<Self>, name: &str, opts: LookupOptions) -> DirectoryItem {
        let lower = name.to_lowercase();

        if let Some(value) = self.overrides.read().unwrap().get(&lower).cloned() {
            return Self::synthetic_item(name, value, "/_override");
        }

        let parents = self.parent_chain();

        for parent in &parents {
            if let Some(value) = parent.overrides.read().unwrap().get(&lower).cloned() {
                return Self::synthetic_item(name, value, "/_override");
            }
        }

        if !opts.skip_providers {
            if opts.ignore_local_caches {
                self.local_cache.reset_cache();
            }

            let (providers, cache) = self.effective_providers_and_cache(&parents);
            let (directories, environ) = self.effective_directories_and_environ(&parents);

            let item = providers
                .get_item(&lower, &directories, cache.as_deref(), &environ)
                .await;
            if !item.is_non_existent() {
                return item;
            }
        }

        if let Some(value) = self.defaults.read().unwrap().get(&lower).cloned() {
            return Self::synthetic_item(name, value, "/_default/user-set");
        }

        DirectoryItem::non_existent(name)
    }

    /// Look up `name`, falling back to `default` (recorded with source
    /// `/_default/hard-coded`) if nothing else answers.
    pub async fn get(self: &Arc<Self>, name: &str, default: ItemValue) -> DirectoryItem {
        self.get_with_opts(name, default, LookupOptions::default())
            .await
    }

    /// [`Config::get`] with [`LookupOptions`].
    pub async fn get_with_opts(
        self: &Arc<Self>,
        name: &str,
        default: ItemValue,
        opts: LookupOptions,
    ) -> DirectoryItem {
        let item = self.get_item_opts(name, opts).await;
        if item.is_non_existent() {
            Self::synthetic_item(name, default, "/_default/hard-coded")
        } else {
            item
        }
    }
}
