//! In-process global store
//!
//! For single-instance deployments: the lock is an atomic flag and the
//! global vars live in memory for the life of the process.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::error::{StoreError, StoreResult};
use super::GlobalStore;
use crate::event::Fields;

/// Global store local to this process
#[derive(Debug, Default)]
pub struct MemoryStore {
    locked: AtomicBool,
    vars: Mutex<Fields>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with existing global vars
    pub fn with_vars(vars: Fields) -> Self {
        Self {
            locked: AtomicBool::new(false),
            vars: Mutex::new(vars),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }
}

#[async_trait]
impl GlobalStore for MemoryStore {
    async fn lock_global_vars(&self) -> StoreResult<bool> {
        Ok(self
            .locked
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok())
    }

    async fn unlock_global_vars(&self) -> StoreResult<()> {
        if self
            .locked
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StoreError::Lock("global vars are not locked".to_string()));
        }
        Ok(())
    }

    async fn read_global_vars(&self) -> StoreResult<Fields> {
        Ok(self.vars.lock().await.clone())
    }

    async fn write_global_vars(&self, vars: &Fields) -> StoreResult<()> {
        *self.vars.lock().await = vars.clone();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = MemoryStore::new();

        assert!(store.lock_global_vars().await.unwrap());
        assert!(!store.lock_global_vars().await.unwrap());
        assert!(store.is_locked());

        store.unlock_global_vars().await.unwrap();
        assert!(store.lock_global_vars().await.unwrap());
    }

    #[tokio::test]
    async fn test_unlock_without_lock_fails() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.unlock_global_vars().await,
            Err(StoreError::Lock(_))
        ));
    }

    #[tokio::test]
    async fn test_vars_round_trip() {
        let store = MemoryStore::new();
        assert!(store.read_global_vars().await.unwrap().is_empty());

        let vars = json!({"counter": 3}).as_object().unwrap().clone();
        store.write_global_vars(&vars).await.unwrap();

        assert_eq!(store.read_global_vars().await.unwrap(), vars);
    }
}
