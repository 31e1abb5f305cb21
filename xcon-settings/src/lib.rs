//! # xcon settings
//!
//! Configuration for the `xcon` resolution engine is layered, with later
//! sources overriding earlier ones:
//!
//! 1. A base configuration checked into the repository, `config/base.yaml`.
//! 2. A per-environment file selected by `APP_ENV` (`config/${APP_ENV}.yaml`),
//!    if present. Defaults to `development`.
//! 3. A local, gitignored file, `config/local.yaml`.
//! 4. Environment variables prefixed `XCON_`, with `__` separating nested
//!    keys, e.g. `XCON_LOCAL_CACHE__EXPIRE_AFTER_SECS`.
//! 5. A handful of flat, un-prefixed environment variables that are part of
//!    the engine's public contract rather than ordinary settings overlay:
//!    `APP_NAME`, `APP_ENV`, `XCON_ONLY_ENV_PROVIDER`,
//!    `XCON_DISABLE_DEFAULT_CACHER`, `XCON_INTERNAL_CACHE_EXPIRATION_MINUTES`.
//!
//! Tests should use [`Settings::load_for_tests`], which only reads from
//! `config/base.yaml`, `config/test.yaml`, and `config/local_test.yaml` (if
//! present), and does not consult the process environment.

mod logging;

pub use logging::{LogFormat, LoggingSettings};

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top level settings object for the `xcon` resolution engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// The environment xcon is running in. Should only be set via `APP_ENV`.
    pub env: String,

    /// Enable additional diagnostics. Should not be set in production.
    pub debug: bool,

    /// The effective service name, used to resolve default directories and as
    /// the shared cache's hash-key identity. Sourced from `APP_NAME`.
    pub service: String,

    /// The effective environment name, used the same way as `service`.
    /// Sourced from `APP_ENV`.
    pub environment: String,

    /// Logging settings.
    pub logging: LoggingSettings,

    /// Tunables for the per-process [`InternalLocalCache`](../xcon_local_cache/struct.InternalLocalCache.html).
    pub local_cache: LocalCacheSettings,

    /// Tunables for the shared-table cache provider.
    pub shared_cache: SharedCacheSettings,

    /// Tunables for the content-table provider.
    pub content_table: ContentTableSettings,

    /// If true, force the resolved provider list to `[Environmental]` and
    /// disable the shared cache, regardless of any per-`Config` settings.
    /// Sourced from `XCON_ONLY_ENV_PROVIDER`.
    pub only_env_provider: bool,

    /// If true, disable the shared cache whenever a `Config`'s cache setting
    /// is the `inherit` sentinel (an explicit cache is still honored).
    /// Sourced from `XCON_DISABLE_DEFAULT_CACHER`.
    pub disable_default_cacher: bool,
}

/// Settings for [`InternalLocalCache`](../xcon_local_cache/struct.InternalLocalCache.html).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocalCacheSettings {
    /// How long a provider's per-directory listing stays valid before the
    /// entire local cache is reset. Sourced from
    /// `XCON_INTERNAL_CACHE_EXPIRATION_MINUTES` (in minutes) or
    /// `XCON_LOCAL_CACHE__EXPIRE_AFTER_SECS` (in seconds); the minutes form
    /// wins if both are set.
    #[serde(with = "humantime_secs")]
    pub expire_after: Duration,
}

impl Default for LocalCacheSettings {
    fn default() -> Self {
        Self {
            expire_after: Duration::from_secs(15 * 60),
        }
    }
}

/// Settings for the shared-table cache provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SharedCacheSettings {
    /// Default TTL applied to rows written to the shared cache table, absent
    /// a shorter explicit TTL on the item being cached.
    #[serde(with = "humantime_secs")]
    pub default_ttl: Duration,

    /// Maximum jitter applied (in either direction is not meaningful here;
    /// jitter always shortens the TTL, to desynchronize expiry across
    /// services) on top of `default_ttl`.
    #[serde(with = "humantime_secs")]
    pub ttl_jitter: Duration,
}

impl Default for SharedCacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(12 * 60 * 60),
            ttl_jitter: Duration::from_secs(25 * 60),
        }
    }
}

/// Settings for the content-table provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentTableSettings {
    /// Use a strongly consistent read for the per-directory partition query.
    /// Defaults to false, matching the shared cache table's eventually
    /// consistent reads.
    pub consistent_read: bool,
}

impl Default for ContentTableSettings {
    fn default() -> Self {
        Self {
            consistent_read: false,
        }
    }
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// # Errors
    /// If any of the configured values are invalid or malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut s = Config::new();

        s.merge(File::with_name("./config/base").required(false))?;

        let app_env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        s.set("env", app_env.as_str())?;
        s.merge(File::with_name(&format!("config/{}", s.get::<String>("env")?)).required(false))?;
        s.merge(File::with_name("config/local").required(false))?;

        s.merge(Environment::default().prefix("XCON").separator("__"))?;

        let mut settings: Self = s.try_into()?;
        settings.apply_contract_env_vars();
        Ok(settings)
    }

    /// Load settings for tests. Does not read from environment variables
    /// except the handful of contract env vars tests explicitly want to
    /// exercise (see [`Settings::apply_contract_env_vars`]).
    pub fn load_for_tests<F: FnOnce(&mut Self)>(changer: F) -> Self {
        let mut s = Config::new();
        s.merge(File::with_name("./config/base").required(false))
            .expect("loading base test config");
        s.merge(File::with_name("config/test").required(false))
            .expect("loading test config");
        s.merge(File::with_name("config/local_test").required(false))
            .expect("loading local test config");

        let mut settings: Self = s.try_into().unwrap_or_else(|_| Self::default_for_tests());
        changer(&mut settings);
        settings
    }

    /// A `Settings` with every field at its hard-coded default, used when no
    /// config files are present (as in most unit tests).
    pub fn default_for_tests() -> Self {
        Self {
            env: "test".to_string(),
            debug: true,
            service: "global".to_string(),
            environment: "all".to_string(),
            logging: LoggingSettings::default(),
            local_cache: LocalCacheSettings::default(),
            shared_cache: SharedCacheSettings::default(),
            content_table: ContentTableSettings::default(),
            only_env_provider: false,
            disable_default_cacher: false,
        }
    }

    /// Apply the small set of flat, un-prefixed environment variables that
    /// are part of xcon's documented external contract rather than ordinary
    /// settings overlay.
    fn apply_contract_env_vars(&mut self) {
        if let Ok(name) = std::env::var("APP_NAME") {
            self.service = name;
        }
        if let Ok(env) = std::env::var("APP_ENV") {
            self.environment = env;
        }
        if let Ok(val) = std::env::var("XCON_ONLY_ENV_PROVIDER") {
            self.only_env_provider = is_truthy(&val);
        }
        if let Ok(val) = std::env::var("XCON_DISABLE_DEFAULT_CACHER") {
            self.disable_default_cacher = is_truthy(&val);
        }
        if let Ok(val) = std::env::var("XCON_INTERNAL_CACHE_EXPIRATION_MINUTES") {
            if let Ok(minutes) = val.parse::<u64>() {
                self.local_cache.expire_after = Duration::from_secs(minutes * 60);
            } else {
                tracing::warn!(
                    r#type = "xcon-settings.bad-env-var",
                    value = %val,
                    "XCON_INTERNAL_CACHE_EXPIRATION_MINUTES is not a valid integer, ignoring"
                );
            }
        }
    }
}

/// Parse common truthy string forms (`"1"`, `"true"`, `"yes"`, case
/// insensitive). Anything else, including unset, is falsy.
fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Serialize/deserialize a [`Duration`] as a whole number of seconds, so that
/// YAML config and `XCON_*__*_SECS` environment variable overlays agree on a
/// single plain-integer representation.
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
