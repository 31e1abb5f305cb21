//! A small pool of reusable, non-`Clone` client handles, shared by every
//! remote-backed provider that needs one client checked out per concurrent
//! task rather than one shared connection.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A pool of client handles, condvar-backed so waiting for one doesn't spin
/// a core.
pub struct ConnectionPool<C> {
    condvar: Condvar,
    clients: Mutex<VecDeque<C>>,
}

/// A checked-out client handle. Returns itself to the pool when dropped.
pub struct Connection<'a, C> {
    client: Option<C>,
    pool: &'a ConnectionPool<C>,
}

impl<C> ConnectionPool<C> {
    /// Build a pool from a fixed set of already-constructed clients.
    pub fn new(clients: impl IntoIterator<Item = C>) -> Self {
        Self {
            condvar: Condvar::new(),
            clients: Mutex::new(VecDeque::from_iter(clients)),
        }
    }

    fn try_acquire(&self) -> Option<Connection<'_, C>> {
        let result = self.condvar.wait_timeout_while(
            self.clients.lock().unwrap(),
            Duration::from_millis(1),
            |clients| clients.is_empty(),
        );
        match result {
            Ok(mut guard) if !guard.1.timed_out() => Some(Connection {
                client: guard.0.pop_front(),
                pool: self,
            }),
            _ => None,
        }
    }

    /// Check out a client, waiting (without blocking the executor) until one
    /// is free.
    pub async fn acquire(&self) -> Connection<'_, C> {
        loop {
            if let Some(connection) = self.try_acquire() {
                break connection;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn insert(&self, client: C) {
        self.clients.lock().unwrap().push_back(client);
        self.condvar.notify_one();
    }
}

impl<C> Drop for Connection<'_, C> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.insert(client);
        }
    }
}

impl<C> std::ops::Deref for Connection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.client.as_ref().unwrap()
    }
}

impl<C> std::ops::DerefMut for Connection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.client.as_mut().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_returns_client_on_guard_drop() {
        let pool = ConnectionPool::new(vec![1_u32]);
        {
            let conn = pool.acquire().await;
            assert_eq!(*conn, 1);
        }
        let conn = pool.acquire().await;
        assert_eq!(*conn, 1);
    }

    #[tokio::test]
    async fn blocks_until_a_client_is_returned() {
        let pool = std::sync::Arc::new(ConnectionPool::new(vec![1_u32]));
        let first = pool.acquire().await;

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            let _conn = pool2.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(first);
        waiter.await.unwrap();
    }
}
