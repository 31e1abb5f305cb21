//! Error taxonomy for the resolution engine.

use thiserror::Error;

/// A configuration error: something is wrong with how a `Directory`,
/// `Config`, or chain was constructed. These are surfaced synchronously to
/// the caller, never swallowed by the provider chain.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A directory path template referenced a placeholder other than
    /// `{service}` or `{environment}`.
    #[error("unknown template placeholder `{{{placeholder}}}` in directory path `{path}`")]
    InvalidTemplatePlaceholder {
        /// The offending placeholder name.
        placeholder: String,
        /// The path it was found in.
        path: String,
    },

    /// A directory path could not be resolved because it still contains a
    /// template placeholder after substitution was attempted (e.g. `service`
    /// or `environment` was empty).
    #[error("directory path `{path}` could not be fully resolved")]
    UnresolvedTemplate {
        /// The offending path.
        path: String,
    },

    /// An invalid cache type or chain was configured.
    #[error("invalid cache configuration: {0}")]
    InvalidCacheType(String),

    /// A `DirectoryItem` could not be serialized into a cache/content table
    /// row because it was missing its chain fingerprints.
    #[error("item `{name}` is missing cache fingerprints required for serialization")]
    MissingFingerprints {
        /// The item's name.
        name: String,
    },
}

/// An error that occurred while a [`crate::Provider`] attempted to answer a
/// lookup. Recoverable remote errors are logged and treated as "no item
/// found, don't retry this directory"; everything else aborts the lookup.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote service's credentials were not available.
    #[error("missing credentials for provider")]
    MissingCredentials,

    /// No region was configured for the remote client.
    #[error("missing region for provider")]
    MissingRegion,

    /// The remote service denied the request.
    #[error("access denied by remote provider")]
    AccessDenied,

    /// The request's signature or token was invalid.
    #[error("invalid request signature")]
    InvalidSignature,

    /// The request's token had expired.
    #[error("expired token")]
    ExpiredToken,

    /// The requested resource (table, parameter, secret) does not exist.
    #[error("resource not found")]
    MissingResource,

    /// This provider does not support being used as a cache; `cache_items`
    /// was called on a non-cache provider.
    #[error("provider is not a cacher")]
    NotACacher,

    /// An error that doesn't fit the recoverable taxonomy above. Propagates
    /// and aborts the lookup.
    #[error("unexpected error in provider: {0}")]
    Unknown(#[source] anyhow::Error),

    /// An internal invariant was violated.
    #[error("internal provider error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl ProviderError {
    /// True for the "recoverable remote error" class: logged at warning
    /// level, the offending directory is marked errored, and the lookup
    /// continues with the next provider.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProviderError::MissingCredentials
                | ProviderError::MissingRegion
                | ProviderError::AccessDenied
                | ProviderError::InvalidSignature
                | ProviderError::ExpiredToken
                | ProviderError::MissingResource
        )
    }

    /// True for errors that should short-circuit subsequent directories
    /// without contacting the remote service again (the "core" SDK error
    /// class: missing credentials or region).
    #[must_use]
    pub fn is_core_sdk_error(&self) -> bool {
        matches!(
            self,
            ProviderError::MissingCredentials | ProviderError::MissingRegion
        )
    }
}
