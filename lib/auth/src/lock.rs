//! Named lock manager for single-flight critical sections.
//!
//! Token refresh may be triggered concurrently from multiple API-server
//! processes. Call sites acquire a named lock (keyed by credential ID) with a
//! fixed timeout so concurrent refreshes collapse into one. The abstraction
//! lets a single-process deployment use the in-memory implementation while a
//! multi-process deployment swaps in a shared lock service without changing
//! call sites.

use crate::error::LockError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// An exclusive lease on a named lock; released on drop.
pub struct LockGuard {
    _inner: Box<dyn std::any::Any + Send>,
}

impl LockGuard {
    /// Wraps an implementation-specific guard object.
    #[must_use]
    pub fn new(inner: impl std::any::Any + Send) -> Self {
        Self {
            _inner: Box::new(inner),
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LockGuard")
    }
}

/// Trait for named, time-boxed mutual exclusion.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires the lock for `key`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Timeout`] if the lock is not acquired in time.
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError>;
}

/// In-process lock manager backed by a map of async mutexes.
///
/// Suitable for single-process deployments, tests, and local development.
#[derive(Default)]
pub struct MemoryLockManager {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl MemoryLockManager {
    /// Creates an empty lock manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().expect("lock map mutex");
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn acquire(&self, key: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let mutex = self.entry(key);
        let guard: OwnedMutexGuard<()> = tokio::time::timeout(timeout, mutex.lock_owned())
            .await
            .map_err(|_| LockError::Timeout {
                key: key.to_string(),
                timeout,
            })?;
        Ok(LockGuard::new(guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let manager = MemoryLockManager::new();
        let guard = manager
            .acquire("credential:abc", Duration::from_secs(1))
            .await
            .expect("acquire");
        drop(guard);

        // Re-acquire after release succeeds.
        let _guard = manager
            .acquire("credential:abc", Duration::from_secs(1))
            .await
            .expect("re-acquire");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let manager = MemoryLockManager::new();
        let _a = manager
            .acquire("credential:a", Duration::from_secs(1))
            .await
            .expect("acquire a");
        let _b = manager
            .acquire("credential:b", Duration::from_secs(1))
            .await
            .expect("acquire b");
    }

    #[tokio::test]
    async fn held_lock_times_out_second_acquirer() {
        let manager = MemoryLockManager::new();
        let _held = manager
            .acquire("credential:x", Duration::from_secs(1))
            .await
            .expect("first acquire");

        let result = manager
            .acquire("credential:x", Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(LockError::Timeout { .. })));
    }

    #[tokio::test]
    async fn waiter_proceeds_once_holder_releases() {
        let manager = Arc::new(MemoryLockManager::new());
        let guard = manager
            .acquire("credential:y", Duration::from_secs(1))
            .await
            .expect("first acquire");

        let waiter = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .acquire("credential:y", Duration::from_secs(2))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);

        let result = waiter.await.expect("join");
        assert!(result.is_ok());
    }
}
