//! End-to-end lookups through [`xcon::Config`], wired to fake provider
//! backends instead of real remote clients.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use xcon::Config;
use xcon_cache::{CacheProvider, CacheStoreClient};
use xcon_core::{ItemValue, ProviderError, TableRecord};
use xcon_local_cache::InternalLocalCache;
use xcon_providers::{
    ContentTableClient, ContentTableProvider, EnvironmentalProvider, ParameterStoreClient,
    ParameterStoreProvider, SecretsVaultClient, SecretsVaultProvider,
};
use xcon_settings::Settings;

fn settings(service: &str, environment: &str) -> Arc<Settings> {
    Arc::new(Settings {
        service: service.to_string(),
        environment: environment.to_string(),
        ..Settings::default_for_tests()
    })
}

fn local_cache(expiry: Duration) -> Arc<InternalLocalCache> {
    Arc::new(InternalLocalCache::new(expiry))
}

#[tokio::test]
async fn plain_environment_lookup() {
    xcon::with_stack(|| async {
        let env = EnvironmentalProvider::from_map(HashMap::from([(
            "django_settings_module".to_string(),
            "acme.settings.prod".to_string(),
        )]));

        let mut config = Config::new_root(settings("global", "all"), local_cache(Duration::from_secs(60)));
        config.add_provider(Arc::new(env));
        let config = Arc::new(config);

        let item = config.get_item("DJANGO_SETTINGS_MODULE").await;
        assert_eq!(item.value, ItemValue::Str("acme.settings.prod".to_string()));
        assert_eq!(item.source, "env");
    })
    .await;
}

struct ParamClient {
    rows: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
}

#[async_trait]
impl ParameterStoreClient for ParamClient {
    async fn list_parameters(&mut self, directory: &str) -> Result<Vec<(String, ItemValue)>, ProviderError> {
        Ok(self
            .rows
            .get(directory)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(n, v)| (n.to_string(), ItemValue::Str(v.to_string())))
            .collect())
    }
}

struct ContentClient {
    rows: HashMap<&'static str, Vec<(&'static str, &'static str)>>,
}

#[async_trait]
impl ContentTableClient for ContentClient {
    async fn items_for_directory(
        &mut self,
        directory: &str,
        _consistent_read: bool,
    ) -> Result<Vec<(String, ItemValue)>, ProviderError> {
        Ok(self
            .rows
            .get(directory)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(n, v)| (n.to_string(), ItemValue::Str(v.to_string())))
            .collect())
    }
}

#[tokio::test]
async fn parameter_store_wins_over_content_table_when_earlier_in_chain() {
    xcon::with_stack(|| async {
        let env = EnvironmentalProvider::from_map(HashMap::new());
        let ssm = ParamClient {
            rows: HashMap::from([("/acme/prod", vec![("test_name", "ssm-value")])]),
        };
        let content = ContentClient {
            rows: HashMap::from([("/acme/prod", vec![("test_name", "content-value")])]),
        };

        let mut config = Config::new_root(settings("acme", "prod"), local_cache(Duration::from_secs(60)));
        config
            .add_provider(Arc::new(env))
            .add_provider(Arc::new(ParameterStoreProvider::new(
                vec![ssm],
                Arc::new(InternalLocalCache::new(Duration::from_secs(60))),
            )))
            .add_provider(Arc::new(ContentTableProvider::new(
                vec![content],
                Arc::new(InternalLocalCache::new(Duration::from_secs(60))),
                false,
            )));
        let config = Arc::new(config);

        let item = config.get_item("test_name").await;
        assert_eq!(item.value, ItemValue::Str("ssm-value".to_string()));
        assert_eq!(item.source, "ssm");
    })
    .await;
}

struct StoreHandle(Arc<FakeStore>);

#[derive(Default)]
struct FakeStore {
    rows: Mutex<Vec<TableRecord>>,
}

impl FakeStore {
    fn get(&self, hash_key: &str) -> Vec<TableRecord> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.app_key == hash_key)
            .cloned()
            .collect()
    }

    fn put(&self, items: Vec<TableRecord>) {
        self.rows.lock().unwrap().extend(items);
    }

    fn delete(&self, name: &str) {
        self.rows.lock().unwrap().retain(|r| r.real_name != name);
    }
}

#[async_trait]
impl CacheStoreClient for StoreHandle {
    async fn get_items(&mut self, hash_key: &str) -> Result<Vec<TableRecord>, ProviderError> {
        Ok(self.0.get(hash_key))
    }

    async fn put_items(&mut self, items: Vec<TableRecord>) -> Result<(), ProviderError> {
        self.0.put(items);
        Ok(())
    }
}

#[tokio::test]
async fn environment_provider_wins_over_a_previously_cached_value() {
    xcon::with_stack(|| async {
        let local = local_cache(Duration::from_secs(60));
        let store = Arc::new(FakeStore::default());

        let ssm = ParamClient {
            rows: HashMap::from([("/acme/prod", vec![("x", "from-param-store")])]),
        };
        let mut config = Config::new_root(settings("acme", "prod"), local.clone());
        config
            .add_provider(Arc::new(ParameterStoreProvider::new(vec![ssm], local.clone())))
            .set_cache(Some(Arc::new(CacheProvider::new(
                vec![StoreHandle(store.clone())],
                local.clone(),
                Duration::from_secs(3600),
                Duration::from_secs(0),
            ))));
        let config = Arc::new(config);

        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("from-param-store".to_string()));

        let env = EnvironmentalProvider::from_map(HashMap::from([("x".to_string(), "from-env".to_string())]));
        let mut config = Config::new_root(settings("acme", "prod"), local.clone());
        config
            .add_provider(Arc::new(env))
            .set_cache(Some(Arc::new(CacheProvider::new(
                vec![StoreHandle(store.clone())],
                local.clone(),
                Duration::from_secs(3600),
                Duration::from_secs(0),
            ))));
        let config = Arc::new(config);

        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("from-env".to_string()));
        assert_eq!(item.source, "env");

        let rows = store.get("/acme/prod");
        assert!(
            rows.iter().any(|r| r.real_name == "x" && r.value == Some(ItemValue::Str("from-param-store".to_string()))),
            "env-sourced items are never cacheable, so the shared table should still only hold the earlier param-store row: {rows:?}"
        );
    })
    .await;
}

struct CountingParamClient {
    rows: Arc<Mutex<HashMap<String, Vec<(String, String)>>>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl ParameterStoreClient for CountingParamClient {
    async fn list_parameters(&mut self, directory: &str) -> Result<Vec<(String, ItemValue)>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .rows
            .lock()
            .unwrap()
            .get(directory)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(n, v)| (n, ItemValue::Str(v)))
            .collect())
    }
}

#[tokio::test]
async fn local_cache_serves_stale_value_until_expiry() {
    xcon::with_stack(|| async {
        let calls = Arc::new(AtomicUsize::new(0));
        let rows = Arc::new(Mutex::new(HashMap::from([(
            "/s/e".to_string(),
            vec![("x".to_string(), "v1".to_string())],
        )])));
        let client = CountingParamClient {
            rows: rows.clone(),
            calls: calls.clone(),
        };

        let local = local_cache(Duration::from_millis(250));
        let mut config = Config::new_root(settings("s", "e"), local.clone());
        config.add_provider(Arc::new(ParameterStoreProvider::new(vec![client], local.clone())));
        let config = Arc::new(config);

        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        rows.lock()
            .unwrap()
            .get_mut("/s/e")
            .unwrap()
            .first_mut()
            .unwrap()
            .1 = "v2".to_string();

        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v1".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "local cache should have avoided a second fetch");

        tokio::time::sleep(Duration::from_millis(260)).await;

        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    })
    .await;
}

struct CountingStoreHandle {
    store: Arc<FakeStore>,
    get_calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CacheStoreClient for CountingStoreHandle {
    async fn get_items(&mut self, hash_key: &str) -> Result<Vec<TableRecord>, ProviderError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.get(hash_key))
    }

    async fn put_items(&mut self, items: Vec<TableRecord>) -> Result<(), ProviderError> {
        self.store.put(items);
        Ok(())
    }
}

/// Drives the shared-cache seam itself (not just a provider's own local
/// cache) through disabling, re-enabling, local-cache expiry, and a direct
/// row deletion in the backing table.
#[tokio::test]
async fn cache_provider_seam_handles_disable_reenable_expiry_and_delete() {
    xcon::with_stack(|| async {
        let store = Arc::new(FakeStore::default());
        let get_calls = Arc::new(AtomicUsize::new(0));
        let cache_local = local_cache(Duration::from_millis(250));

        let rows = Arc::new(Mutex::new(HashMap::from([(
            "/s/e".to_string(),
            vec![("x".to_string(), "v1".to_string())],
        )])));
        let param_calls = Arc::new(AtomicUsize::new(0));
        let make_param_provider = || {
            Arc::new(ParameterStoreProvider::new(
                vec![CountingParamClient {
                    rows: rows.clone(),
                    calls: param_calls.clone(),
                }],
                local_cache(Duration::from_secs(60)),
            ))
        };
        let make_cache_provider = || {
            Arc::new(CacheProvider::new(
                vec![CountingStoreHandle {
                    store: store.clone(),
                    get_calls: get_calls.clone(),
                }],
                cache_local.clone(),
                Duration::from_secs(3600),
                Duration::from_secs(0),
            ))
        };

        // 1. Cache enabled: the lookup falls through to the parameter store
        // and the result is written back to the shared table.
        let mut config = Config::new_root(settings("s", "e"), local_cache(Duration::from_secs(60)));
        config
            .add_provider(make_param_provider())
            .set_cache(Some(make_cache_provider()));
        let config = Arc::new(config);
        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v1".to_string()));
        assert!(
            store.get("/s/e").iter().any(|r| r.real_name == "x"),
            "cacheable result should have been written to the shared table"
        );

        // 2. Cache disabled: a changed upstream value is served directly,
        // bypassing whatever the shared table holds.
        rows.lock().unwrap().get_mut("/s/e").unwrap().first_mut().unwrap().1 = "v2".to_string();
        let mut config = Config::new_root(settings("s", "e"), local_cache(Duration::from_secs(60)));
        config.add_provider(make_param_provider()).set_cache(None);
        let config = Arc::new(config);
        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v2".to_string()), "disabled cache should not mask a fresh value");

        // 3. Cache re-enabled, still within the cache provider's local-cache
        // expiry window: the stale listing from step 1 is served without a
        // second `get_items` call against the backing store.
        let calls_before = get_calls.load(Ordering::SeqCst);
        let mut config = Config::new_root(settings("s", "e"), local_cache(Duration::from_secs(60)));
        config
            .add_provider(make_param_provider())
            .set_cache(Some(make_cache_provider()));
        let config = Arc::new(config);
        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v1".to_string()), "re-enabled cache should still be serving the earlier listing");
        assert_eq!(
            get_calls.load(Ordering::SeqCst),
            calls_before,
            "serving from the cache provider's own local cache should not re-read the backing store"
        );

        // 4. After the cache provider's local-cache entry expires and the row
        // is deleted directly from the backing store, the lookup falls
        // through to the parameter store again.
        tokio::time::sleep(Duration::from_millis(260)).await;
        store.delete("x");
        let mut config = Config::new_root(settings("s", "e"), local_cache(Duration::from_secs(60)));
        config
            .add_provider(make_param_provider())
            .set_cache(Some(make_cache_provider()));
        let config = Arc::new(config);
        let item = config.get_item("x").await;
        assert_eq!(item.value, ItemValue::Str("v2".to_string()), "deleted row should force a fresh parameter-store read");
    })
    .await;
}

struct SecretsClient;

#[async_trait]
impl SecretsVaultClient for SecretsClient {
    async fn list_secret_paths(&mut self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["/acme/prod/db_password".to_string()])
    }

    async fn get_secret_value(&mut self, _full_path: &str) -> Result<Option<String>, ProviderError> {
        Ok(Some("hunter2".to_string()))
    }
}

#[tokio::test]
async fn env_only_mode_ignores_configured_providers_and_cache() {
    std::env::set_var("XCON_SCENARIO_DB_PASSWORD", "from-process-env");

    xcon::with_stack(|| async {
        let mut settings = Settings::default_for_tests();
        settings.only_env_provider = true;
        let local = local_cache(Duration::from_secs(60));
        let store = Arc::new(FakeStore::default());

        let mut config = Config::new_root(Arc::new(settings), local.clone());
        config
            .add_provider(Arc::new(SecretsVaultProvider::new(vec![SecretsClient], local.clone())))
            .set_cache(Some(Arc::new(CacheProvider::new(
                vec![StoreHandle(store)],
                local,
                Duration::from_secs(3600),
                Duration::from_secs(0),
            ))));
        let config = Arc::new(config);

        let item = config.get_item("XCON_SCENARIO_DB_PASSWORD").await;
        assert_eq!(item.value, ItemValue::Str("from-process-env".to_string()));
        assert_eq!(item.source, "env");
    })
    .await;

    std::env::remove_var("XCON_SCENARIO_DB_PASSWORD");
}

#[tokio::test]
async fn export_directory_reaches_another_services_parameter_store() {
    xcon::with_stack(|| async {
        let ssm = ParamClient {
            rows: HashMap::from([("/other/prod/export", vec![("some_name", "exported")])]),
        };

        let local = local_cache(Duration::from_secs(60));
        let mut config = Config::new_root(settings("acme", "prod"), local.clone());
        config
            .add_provider(Arc::new(ParameterStoreProvider::new(vec![ssm], local)))
            .add_export("other");
        let config = Arc::new(config);

        let item = config.get("SOME_NAME", ItemValue::from("missing")).await;
        assert_eq!(item.value, ItemValue::Str("exported".to_string()));
    })
    .await;
}
