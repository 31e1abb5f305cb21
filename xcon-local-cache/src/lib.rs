#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! A process-wide, per-provider expiring cache of directory listings, shared
//! by every provider instance.
//!
//! Every provider's listings share a single expiry deadline rather than each
//! entry carrying its own TTL: when the deadline passes, all listings are
//! discarded in one atomic sweep, so a reader never mixes a listing fetched
//! before a reset with one fetched after it.

use dashmap::DashMap;
use std::{
    any::Any,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// A directory listing as retrieved by a remote provider: a name→value map
/// of whatever shape that provider produces. Stored behind `dyn Any` so
/// `InternalLocalCache` doesn't need to be generic over every provider's
/// item type; providers downcast back to their own concrete listing type.
type Listing = Arc<dyn Any + Send + Sync>;

/// Key identifying one provider's listing for one directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListingKey {
    /// The provider's stable identity (its `Provider::name()`).
    provider: String,
    /// The directory path the listing is for.
    directory: String,
}

/// Process-wide cache of per-`(provider, directory)` listings, with a single
/// shared expiry deadline for every entry.
///
/// When `now - last_reset > expire_delta`, every provider's cached listings
/// are discarded atomically: the next reader after a reset sees a cold
/// cache, never a listing that predates the reset mixed with one that
/// postdates it.
pub struct InternalLocalCache {
    /// The listings themselves, one entry per `(provider, directory)`.
    listings: DashMap<ListingKey, Listing>,
    /// When the cache was last reset. Guarded by a mutex so the
    /// check-and-reset transition is atomic; readers during a reset see
    /// either the pre- or post-reset state, never a partial one.
    last_reset: Mutex<Instant>,
    /// How long a listing is considered valid before the whole cache resets.
    expire_delta: Duration,
}

impl InternalLocalCache {
    /// Create a cache that resets every `expire_delta`.
    #[must_use]
    pub fn new(expire_delta: Duration) -> Self {
        Self {
            listings: DashMap::new(),
            last_reset: Mutex::new(Instant::now()),
            expire_delta,
        }
    }

    /// Check the shared expiry deadline, resetting the entire cache if it
    /// has passed. Called on every read/write so staleness is bounded
    /// without a background task.
    fn maybe_expire(&self) {
        let mut last_reset = self.last_reset.lock().unwrap();
        if last_reset.elapsed() > self.expire_delta {
            self.listings.clear();
            *last_reset = Instant::now();
            tracing::debug!(
                r#type = "xcon-local-cache.expired",
                "local cache expiry reached, discarding all listings"
            );
        }
    }

    /// Fetch the cached listing for `(provider, directory)`, if present and
    /// not yet expired.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self, provider: &str, directory: &str) -> Option<Arc<T>> {
        self.maybe_expire();
        let key = ListingKey {
            provider: provider.to_string(),
            directory: directory.to_string(),
        };
        self.listings
            .get(&key)
            .and_then(|entry| entry.value().clone().downcast::<T>().ok())
    }

    /// Store a listing for `(provider, directory)`, overwriting any
    /// previous entry.
    pub fn insert<T: Send + Sync + 'static>(&self, provider: &str, directory: &str, listing: Arc<T>) {
        self.maybe_expire();
        let key = ListingKey {
            provider: provider.to_string(),
            directory: directory.to_string(),
        };
        self.listings.insert(key, listing);
    }

    /// Get the existing listing for `(provider, directory)` if present,
    /// otherwise populate it by calling `populate` and caching the result.
    ///
    /// `populate` may be called even if another thread populated the same
    /// key concurrently (first writer wins on insert, both computed the same
    /// remote call); callers that need single-flight semantics against a
    /// single remote client should additionally serialize on their own
    /// per-directory mutex, as the remote providers in `xcon-providers` do.
    pub async fn get_or_populate<T, F, Fut>(
        &self,
        provider: &str,
        directory: &str,
        populate: F,
    ) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Arc<T>>,
    {
        if let Some(existing) = self.get::<T>(provider, directory) {
            return existing;
        }
        let fresh = populate().await;
        self.insert(provider, directory, fresh.clone());
        fresh
    }

    /// Explicitly invalidate the entire cache, regardless of the expiry
    /// deadline.
    pub fn reset_cache(&self) {
        self.listings.clear();
        *self.last_reset.lock().unwrap() = Instant::now();
    }
}

impl Default for InternalLocalCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}
