//! The unit of transport between providers and consumers: a single resolved
//! `(name, value, metadata)` record.

use crate::directory::Directory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The value carried by a [`DirectoryItem`]. A closed enum rather than an
/// open JSON value, since Rust gives us explicit types where a dynamic
/// attribute lookup would otherwise be needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemValue {
    /// A plain string value, the common case.
    Str(String),
    /// An ordered list of strings.
    List(Vec<String>),
    /// A string-keyed map of strings.
    Map(BTreeMap<String, String>),
    /// An integer value.
    Int(i64),
    /// No value. Used by the non-existent sentinel, and by rows that
    /// explicitly cache a "confirmed absent" result.
    Null,
}

impl ItemValue {
    /// True if this is [`ItemValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ItemValue::Null)
    }

    /// The value as a plain string, if it is one. Lists and maps are not
    /// stringified here; callers that want a canonical string form for
    /// logging should match directly.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ItemValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for ItemValue {
    fn from(value: String) -> Self {
        ItemValue::Str(value)
    }
}

impl From<&str> for ItemValue {
    fn from(value: &str) -> Self {
        ItemValue::Str(value.to_string())
    }
}

impl From<i64> for ItemValue {
    fn from(value: i64) -> Self {
        ItemValue::Int(value)
    }
}

impl From<Vec<String>> for ItemValue {
    fn from(value: Vec<String>) -> Self {
        ItemValue::List(value)
    }
}

/// One resolved `(name, value, metadata)` record: the unit of transport
/// between [`crate::Provider`]s and consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryItem {
    /// Lower-cased lookup name. Lookups are case-insensitive; this is always
    /// the lower-cased form.
    pub name: String,

    /// The name as originally requested or stored, case preserved.
    pub original_name: String,

    /// The directory this item was found in (or [`Directory::non_existent`]
    /// for the "known missing" sentinel).
    pub directory: Directory,

    /// The resolved value.
    pub value: ItemValue,

    /// Human-readable origin, e.g. `"env"`, `"parameter-store"`, or a cache
    /// source with `" - via cacher"` appended.
    pub source: String,

    /// If set, the time after which this item should no longer be
    /// considered valid.
    pub ttl: Option<DateTime<Utc>>,

    /// False for items sourced from the environment or from configured
    /// defaults; such items are never written to the shared cache.
    pub cacheable: bool,

    /// When this item was constructed.
    pub created_at: DateTime<Utc>,

    /// The shared-cache table's hash key this item was (or would be) written
    /// under, once known.
    pub cache_hash_key: Option<String>,

    /// The shared-cache table's range key this item was (or would be)
    /// written under, once known.
    pub cache_range_key: Option<String>,

    /// The directory-chain fingerprint used to build `cache_range_key`.
    pub cache_concat_directory_paths: Option<String>,

    /// The provider-chain fingerprint used to build `cache_range_key`.
    pub cache_concat_provider_names: Option<String>,

    /// True if this item was read back from the shared cache rather than an
    /// origin provider.
    pub from_cacher: bool,
}

impl DirectoryItem {
    /// Build a plain, non-cacheable item (e.g. from the environment or a
    /// configured default/override).
    #[must_use]
    pub fn new(
        name: &str,
        value: ItemValue,
        directory: Directory,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_lowercase(),
            original_name: name.to_string(),
            directory,
            value,
            source: source.into(),
            ttl: None,
            cacheable: false,
            created_at: Utc::now(),
            cache_hash_key: None,
            cache_range_key: None,
            cache_concat_directory_paths: None,
            cache_concat_provider_names: None,
            from_cacher: false,
        }
    }

    /// The sentinel item for "known to be missing": directory is
    /// [`Directory::non_existent`], value is [`ItemValue::Null`].
    ///
    /// Non-existent items are cacheable, so that a confirmed miss can be
    /// memoized in the shared cache and short-circuit further provider
    /// lookups the next time the same name is requested.
    #[must_use]
    pub fn non_existent(name: &str) -> Self {
        Self {
            cacheable: true,
            ..Self::new(name, ItemValue::Null, Directory::non_existent(), "/_nonExistent")
        }
    }

    /// True if this item represents a confirmed-missing lookup.
    #[must_use]
    pub fn is_non_existent(&self) -> bool {
        self.directory.is_non_existent()
    }

    /// Builder: mark this item as cacheable (remote-provider results are
    /// cacheable by default; environment and override/default results are
    /// not).
    #[must_use]
    pub fn with_cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }

    /// Builder: attach a TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: DateTime<Utc>) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Builder: record the chain fingerprints this item was (or would be)
    /// cached under.
    #[must_use]
    pub fn with_cache_fingerprints(
        mut self,
        hash_key: impl Into<String>,
        range_key: impl Into<String>,
        directory_paths: impl Into<String>,
        provider_names: impl Into<String>,
    ) -> Self {
        self.cache_hash_key = Some(hash_key.into());
        self.cache_range_key = Some(range_key.into());
        self.cache_concat_directory_paths = Some(directory_paths.into());
        self.cache_concat_provider_names = Some(provider_names.into());
        self
    }

    /// Builder: mark as read back from the shared cache, appending the
    /// `" - via cacher"` source suffix.
    #[must_use]
    pub fn with_from_cacher(mut self) -> Self {
        self.from_cacher = true;
        if !self.source.ends_with(" - via cacher") {
            self.source.push_str(" - via cacher");
        }
        self
    }

    /// Convert to the shared-table row shape. `ttl` is stored as unix
    /// seconds; `value` is omitted (`None`) when null.
    ///
    /// # Errors
    /// Returns [`crate::ConfigError::MissingFingerprints`] if this item
    /// hasn't had its chain fingerprints attached yet.
    pub fn to_record(&self) -> Result<TableRecord, crate::ConfigError> {
        let cache_hash_key =
            self.cache_hash_key
                .clone()
                .ok_or_else(|| crate::ConfigError::MissingFingerprints {
                    name: self.name.clone(),
                })?;
        let cache_range_key =
            self.cache_range_key
                .clone()
                .ok_or_else(|| crate::ConfigError::MissingFingerprints {
                    name: self.name.clone(),
                })?;

        Ok(TableRecord {
            app_key: cache_hash_key,
            name_key: cache_range_key,
            real_name: self.name.clone(),
            original_name: Some(self.original_name.clone()),
            real_directory: self.directory.path().to_string(),
            value: if self.value.is_null() {
                None
            } else {
                Some(self.value.clone())
            },
            ttl: self.ttl.map(|t| t.timestamp()),
            source: self.source.clone(),
            created_at: self.created_at,
            cache_concat_provider_names: self.cache_concat_provider_names.clone(),
            cache_concat_directory_paths: self.cache_concat_directory_paths.clone(),
        })
    }

    /// Reconstruct a `DirectoryItem` from a table row, placing it back in
    /// `directory` (the directory the caller queried, which for cache reads
    /// is the cache's own hash-key directory rather than `real_directory`,
    /// per how callers use this - see `xcon-cache`).
    #[must_use]
    pub fn from_record(record: &TableRecord, directory: Directory) -> Self {
        Self {
            name: record.real_name.clone(),
            original_name: record
                .original_name
                .clone()
                .unwrap_or_else(|| record.real_name.clone()),
            directory,
            value: record.value.clone().unwrap_or(ItemValue::Null),
            source: record.source.clone(),
            ttl: record
                .ttl
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            cacheable: true,
            created_at: record.created_at,
            cache_hash_key: Some(record.app_key.clone()),
            cache_range_key: Some(record.name_key.clone()),
            cache_concat_directory_paths: record.cache_concat_directory_paths.clone(),
            cache_concat_provider_names: record.cache_concat_provider_names.clone(),
            from_cacher: false,
        }
    }
}

/// The shared/content table row shape, as persisted to the backing store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRecord {
    /// Partition key: the directory path used as the environ, e.g.
    /// `/acme/prod`.
    pub app_key: String,

    /// Sort key: `"{name}|+|{dir_chain_fingerprint}|+|{provider_chain_fingerprint}"`.
    pub name_key: String,

    /// Canonical lower-case item name.
    pub real_name: String,

    /// Pre-lowercase name, if different.
    pub original_name: Option<String>,

    /// The directory the item was actually found in.
    pub real_directory: String,

    /// The item's value, omitted when null.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<ItemValue>,

    /// Unix-seconds expiry; rows at or past this time are filtered on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Origin string. The cache provider appends `" - via cacher"`; the
    /// content table does not.
    pub source: String,

    /// ISO-8601 creation time.
    pub created_at: DateTime<Utc>,

    /// Fingerprint component: concatenated provider names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_concat_provider_names: Option<String>,

    /// Fingerprint component: concatenated directory paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_concat_directory_paths: Option<String>,
}

impl TableRecord {
    /// True if `ttl` is set and in the past relative to `now`. Rows without
    /// a `ttl` are never considered expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl.is_some_and(|ttl| ttl <= now.timestamp())
    }
}
