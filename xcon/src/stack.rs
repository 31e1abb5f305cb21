//! The ambient per-task stack of [`Config`]s a lookup's parent-chain walk
//! ascends. Modeled as a `tokio::task_local!` guarded by a push/pop scope,
//! the same guard-returns-on-`Drop` shape `xcon_core`'s connection pool uses
//! for pooled clients, applied here to a stack instead of a pool.

use std::sync::{Arc, Mutex};

use crate::config::Config;

tokio::task_local! {
    static STACK: Arc<Mutex<Vec<Arc<Config>>>>;
}

/// Run `body` with a fresh, empty ambient config stack available to it and
/// anything it spawns as a child of the same task-local scope.
pub async fn with_stack<F, Fut, T>(body: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    STACK
        .scope(Arc::new(Mutex::new(Vec::new())), body())
        .await
}

/// Push `config` onto the ambient stack; popped when the returned guard is
/// dropped.
///
/// # Panics
/// Panics if called outside [`with_stack`] (no ambient stack has been
/// established for the current task).
#[must_use]
pub fn push(config: Arc<Config>) -> ConfigScope {
    STACK.with(|stack| stack.lock().unwrap().push(config));
    ConfigScope { _private: () }
}

/// A snapshot of the ambient stack, nearest (top) first.
///
/// # Panics
/// Panics if called outside [`with_stack`].
#[must_use]
pub fn snapshot() -> Vec<Arc<Config>> {
    STACK.with(|stack| stack.lock().unwrap().iter().rev().cloned().collect())
}

/// Guard returned by [`push`]. Pops the associated `Config` off the ambient
/// stack when dropped.
pub struct ConfigScope {
    _private: (),
}

impl Drop for ConfigScope {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.lock().unwrap().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Arc;
    use xcon_settings::Settings;

    fn bare_config() -> Arc<Config> {
        Arc::new(Config::new_root(
            Arc::new(Settings::default_for_tests()),
            std::sync::Arc::new(xcon_local_cache::InternalLocalCache::default()),
        ))
    }

    #[tokio::test]
    async fn push_then_pop_restores_empty_stack() {
        with_stack(|| async {
            assert!(snapshot().is_empty());
            let config = bare_config();
            {
                let _scope = push(config.clone());
                assert_eq!(snapshot().len(), 1);
            }
            assert!(snapshot().is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn snapshot_orders_nearest_first() {
        with_stack(|| async {
            let a = bare_config();
            let b = bare_config();
            let _a = push(a.clone());
            let _b = push(b.clone());
            let snap = snapshot();
            assert!(Arc::ptr_eq(&snap[0], &b));
            assert!(Arc::ptr_eq(&snap[1], &a));
        })
        .await;
    }
}
