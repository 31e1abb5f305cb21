//! Shared plumbing for providers that talk to a remote service: the client
//! traits each remote provider is generic over, and a little state machine
//! for "don't keep asking a directory that already failed" / "this client
//! is fundamentally unusable, stop trying".

use async_trait::async_trait;
use dashmap::DashSet;
use std::sync::Mutex;
use xcon_core::{Directory, ItemValue, ProviderError};

pub use xcon_core::ConnectionPool;

/// A remote service client that can list or fetch config values for a
/// directory. Implementations are supplied by the embedding service; this
/// crate only knows how to pool and call them.
#[async_trait]
pub trait ParameterStoreClient: Send + Sync {
    /// List every parameter directly under `directory`, non-recursively.
    async fn list_parameters(
        &mut self,
        directory: &str,
    ) -> Result<Vec<(String, ItemValue)>, ProviderError>;
}

/// A remote secrets client. Secrets are enumerated by name once (cheap) and
/// fetched by value lazily, one at a time (the underlying service usually
/// has no bulk-get).
#[async_trait]
pub trait SecretsVaultClient: Send + Sync {
    /// List every secret's full path known to the vault.
    async fn list_secret_paths(&mut self) -> Result<Vec<String>, ProviderError>;

    /// Fetch a single secret's value by its full path. `Ok(None)` means the
    /// vault confirms the secret does not exist (distinct from an error).
    async fn get_secret_value(&mut self, full_path: &str) -> Result<Option<String>, ProviderError>;
}

/// A remote structured-content table client (the non-cache "global config"
/// table).
#[async_trait]
pub trait ContentTableClient: Send + Sync {
    /// Fetch every row whose partition is `directory`.
    async fn items_for_directory(
        &mut self,
        directory: &str,
        consistent_read: bool,
    ) -> Result<Vec<(String, ItemValue)>, ProviderError>;
}

/// The two "this client is fundamentally unusable" error kinds. Once seen,
/// a remote provider stops trying its client for the rest of the process
/// and re-raises the same error immediately.
#[derive(Debug, Clone, Copy)]
enum StickyCoreError {
    MissingCredentials,
    MissingRegion,
}

impl StickyCoreError {
    fn from_provider_error(error: &ProviderError) -> Option<Self> {
        match error {
            ProviderError::MissingCredentials => Some(Self::MissingCredentials),
            ProviderError::MissingRegion => Some(Self::MissingRegion),
            _ => None,
        }
    }

    fn to_provider_error(self) -> ProviderError {
        match self {
            Self::MissingCredentials => ProviderError::MissingCredentials,
            Self::MissingRegion => ProviderError::MissingRegion,
        }
    }
}

/// Per-provider-instance bookkeeping for remote lookups: directories that
/// have already failed once (never retried for the life of the instance)
/// and a sticky core-SDK error that short-circuits every future call.
#[derive(Default)]
pub(crate) struct RemoteProviderState {
    errored_directories: DashSet<String>,
    sticky_core_error: Mutex<Option<StickyCoreError>>,
}

impl RemoteProviderState {
    /// If a core SDK error was already seen, return it instead of making
    /// another doomed remote call.
    pub(crate) fn sticky_error(&self) -> Option<ProviderError> {
        self.sticky_core_error
            .lock()
            .unwrap()
            .map(StickyCoreError::to_provider_error)
    }

    /// Record the outcome of a remote call: a core SDK error becomes
    /// sticky, any error marks the directory as errored so it isn't retried.
    pub(crate) fn record_error(&self, directory: &Directory, error: &ProviderError) {
        if let Some(sticky) = StickyCoreError::from_provider_error(error) {
            *self.sticky_core_error.lock().unwrap() = Some(sticky);
        }
        self.errored_directories.insert(directory.path().to_string());
        tracing::warn!(directory = %directory, %error, "remote provider error, directory marked errored");
    }

    /// True if `directory` already failed once and shouldn't be retried.
    pub(crate) fn is_errored(&self, directory: &Directory) -> bool {
        self.errored_directories.contains(directory.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sticky_error_short_circuits_after_missing_credentials() {
        let state = RemoteProviderState::default();
        assert!(state.sticky_error().is_none());
        state.record_error(
            &Directory::from_path("/acme").unwrap(),
            &ProviderError::MissingCredentials,
        );
        assert!(matches!(
            state.sticky_error(),
            Some(ProviderError::MissingCredentials)
        ));
    }

    #[test]
    fn non_core_error_marks_directory_but_not_sticky() {
        let state = RemoteProviderState::default();
        let dir = Directory::from_path("/acme").unwrap();
        state.record_error(&dir, &ProviderError::AccessDenied);
        assert!(state.sticky_error().is_none());
        assert!(state.is_errored(&dir));
    }
}
