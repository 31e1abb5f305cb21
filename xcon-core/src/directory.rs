//! Namespace paths that `DirectoryItem`s live under, and the ordered chains
//! of them that a lookup walks.

use crate::errors::ConfigError;
use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Path of the sentinel directory used to represent "looked for, but not
/// found".
pub const NON_EXISTENT_PATH: &str = "/_nonExistent";

lazy_static! {
    /// Directories are value objects; interning by path lets equal paths
    /// share one `Arc` instead of allocating a fresh one per lookup.
    static ref INTERNED: DashMap<String, Arc<DirectoryInner>> = DashMap::new();
    static ref TEMPLATE_PLACEHOLDER: Regex = Regex::new(r"\{([a-zA-Z_]+)\}").unwrap();
}

#[derive(Debug)]
struct DirectoryInner {
    path: String,
    service: Option<String>,
    env: Option<String>,
    is_export: bool,
    is_path_format: bool,
    is_non_existent: bool,
}

/// An immutable namespace path under which [`crate::DirectoryItem`]s live,
/// such as `/acme/prod` or a still-templated `/{service}/{environment}`.
///
/// Equality and hashing are on `path` only: `Directory` is a value object
/// keyed by path.
#[derive(Debug, Clone)]
pub struct Directory(Arc<DirectoryInner>);

impl Directory {
    /// Parse a raw path into a `Directory`, interning it for sharing.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTemplatePlaceholder`] if the path
    /// contains a `{...}` placeholder other than `{service}` or
    /// `{environment}`.
    pub fn from_path(path: impl Into<String>) -> Result<Self, ConfigError> {
        let path = path.into();
        if let Some(existing) = INTERNED.get(&path) {
            return Ok(Self(existing.clone()));
        }

        for capture in TEMPLATE_PLACEHOLDER.captures_iter(&path) {
            let placeholder = &capture[1];
            if placeholder != "service" && placeholder != "environment" {
                return Err(ConfigError::InvalidTemplatePlaceholder {
                    placeholder: placeholder.to_string(),
                    path,
                });
            }
        }

        let is_path_format = TEMPLATE_PLACEHOLDER.is_match(&path);
        let is_non_existent = path == NON_EXISTENT_PATH;

        let inner = Arc::new(DirectoryInner {
            path: path.clone(),
            service: None,
            env: None,
            is_export: false,
            is_path_format,
            is_non_existent,
        });
        INTERNED.insert(path, inner.clone());
        Ok(Self(inner))
    }

    /// Build a directory from its logical parts: `/service`, `/service/env`,
    /// or (if `is_export`) `/service/env/export`.
    ///
    /// # Errors
    /// Propagates [`Directory::from_path`]'s errors, though a path built
    /// from parts can never contain a stray placeholder unless `service` or
    /// `env` themselves contain one (which is legal: it yields a still
    /// templated directory, e.g. for export directories built before the
    /// owning service's name is known).
    pub fn from_parts(
        service: impl Into<String>,
        env: Option<String>,
        is_export: bool,
    ) -> Result<Self, ConfigError> {
        let service = service.into();
        let mut path = format!("/{service}");
        if let Some(env) = &env {
            path.push('/');
            path.push_str(env);
        }
        if is_export {
            path.push_str("/export");
        }

        let directory = Self::from_path(path)?;
        // Parts-built directories additionally remember their components so
        // that `service()`/`env()`/`is_export()` are available even before
        // template resolution has happened.
        let with_parts = Arc::new(DirectoryInner {
            path: directory.0.path.clone(),
            service: Some(service),
            env,
            is_export,
            is_path_format: directory.0.is_path_format,
            is_non_existent: directory.0.is_non_existent,
        });
        INTERNED.insert(with_parts.path.clone(), with_parts.clone());
        Ok(Self(with_parts))
    }

    /// The sentinel directory for "looked for, but not found".
    #[must_use]
    pub fn non_existent() -> Self {
        Self::from_path(NON_EXISTENT_PATH).expect("sentinel path is always valid")
    }

    /// The directory's path, e.g. `/acme/prod`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.0.path
    }

    /// The `service` component, if this directory was built from parts.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        self.0.service.as_deref()
    }

    /// The `env` component, if this directory was built from parts.
    #[must_use]
    pub fn env(&self) -> Option<&str> {
        self.0.env.as_deref()
    }

    /// True if this is an export directory (`/other_service/env/export`).
    #[must_use]
    pub fn is_export(&self) -> bool {
        self.0.is_export
    }

    /// True if the path contains `{service}` and/or `{environment}`.
    #[must_use]
    pub fn is_path_format(&self) -> bool {
        self.0.is_path_format
    }

    /// True if this is the sentinel "not found" directory.
    #[must_use]
    pub fn is_non_existent(&self) -> bool {
        self.0.is_non_existent
    }

    /// Substitute `{service}`/`{environment}` placeholders, returning a new,
    /// resolved `Directory`. A non-templated directory resolves to a clone
    /// of itself (the same interned `Arc`).
    ///
    /// # Errors
    /// Never currently returns an error (service/environment are always
    /// plain strings), but is fallible because a future placeholder could
    /// require validation post-substitution.
    pub fn resolve(&self, service: &str, environment: &str) -> Result<Self, ConfigError> {
        if !self.0.is_path_format {
            return Ok(self.clone());
        }

        let resolved_path = self
            .0
            .path
            .replace("{service}", service)
            .replace("{environment}", environment);

        Self::from_path(resolved_path)
    }
}

impl PartialEq for Directory {
    fn eq(&self, other: &Self) -> bool {
        self.0.path == other.0.path
    }
}

impl Eq for Directory {}

impl Hash for Directory {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.path.hash(state);
    }
}

impl fmt::Display for Directory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.path)
    }
}

/// Ordered, immutable list of [`Directory`]s walked by a single lookup.
///
/// `concatenated_directory_paths` is precomputed at construction since it is
/// read on every lookup as a cache-key fingerprint component.
#[derive(Debug, Clone)]
pub struct DirectoryChain {
    directories: Vec<Directory>,
    concatenated_directory_paths: String,
}

impl DirectoryChain {
    /// Build a chain from an ordered list of directories.
    #[must_use]
    pub fn new(directories: Vec<Directory>) -> Self {
        let concatenated_directory_paths = directories
            .iter()
            .map(Directory::path)
            .collect::<Vec<_>>()
            .join("|");
        Self {
            directories,
            concatenated_directory_paths,
        }
    }

    /// The directories, in traversal order.
    #[must_use]
    pub fn directories(&self) -> &[Directory] {
        &self.directories
    }

    /// The pipe-joined concatenation of directory paths, used as a cache-key
    /// fingerprint component. Two chains with the same directories in the
    /// same order produce identical fingerprints.
    #[must_use]
    pub fn concatenated_directory_paths(&self) -> &str {
        &self.concatenated_directory_paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_hash_are_path_only() {
        let a = Directory::from_path("/acme/prod").unwrap();
        let b = Directory::from_path("/acme/prod").unwrap();
        assert_eq!(a, b);

        use std::collections::hash_map::DefaultHasher;
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn non_existent_sentinel_is_flagged() {
        let d = Directory::non_existent();
        assert!(d.is_non_existent());
        assert_eq!(d.path(), NON_EXISTENT_PATH);
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let err = Directory::from_path("/{service}/{region}").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidTemplatePlaceholder { placeholder, .. } if placeholder == "region"
        ));
    }

    #[test]
    fn resolves_template_placeholders() {
        let templated = Directory::from_path("/{service}/{environment}").unwrap();
        assert!(templated.is_path_format());
        let resolved = templated.resolve("acme", "prod").unwrap();
        assert_eq!(resolved.path(), "/acme/prod");
        assert!(!resolved.is_path_format());
    }

    #[test]
    fn non_templated_directory_resolves_to_itself() {
        let plain = Directory::from_path("/acme/prod").unwrap();
        let resolved = plain.resolve("ignored", "ignored").unwrap();
        assert_eq!(plain, resolved);
    }

    #[test]
    fn directory_chain_fingerprint_is_stable() {
        let chain_a = DirectoryChain::new(vec![
            Directory::from_path("/acme/prod").unwrap(),
            Directory::from_path("/acme").unwrap(),
        ]);
        let chain_b = DirectoryChain::new(vec![
            Directory::from_path("/acme/prod").unwrap(),
            Directory::from_path("/acme").unwrap(),
        ]);
        assert_eq!(
            chain_a.concatenated_directory_paths(),
            chain_b.concatenated_directory_paths()
        );
        assert_eq!(chain_a.concatenated_directory_paths(), "/acme/prod|/acme");
    }

    #[test]
    fn export_directory_from_parts() {
        let export = Directory::from_parts("other", Some("prod".to_string()), true).unwrap();
        assert_eq!(export.path(), "/other/prod/export");
        assert!(export.is_export());
    }
}
