//! Global Store
//!
//! The lock capability behind housekeeping and the single persisted
//! GlobalVars bag it guards.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-process lock for single-instance deployments
//! - [`SqliteStore`]: row lock in a shared database file, self-healing via
//!   a staleness timeout so a crashed holder cannot wedge the deployment
//!
//! The backend is chosen at construction time from [`LockConfig`].

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;

use crate::config::{LockBackend, LockConfig};
use crate::event::Fields;

/// Timestamp layout used for `_lastTick`, `tick` and row bookkeeping
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Exclusive, non-blocking lock plus the GlobalVars it protects
#[async_trait]
pub trait GlobalStore: Send + Sync {
    /// Try to take the lock. `Ok(false)` means another holder has it.
    async fn lock_global_vars(&self) -> StoreResult<bool>;

    /// Release a lock taken by this store
    async fn unlock_global_vars(&self) -> StoreResult<()>;

    /// Current GlobalVars, empty when never written
    async fn read_global_vars(&self) -> StoreResult<Fields>;

    /// Replace GlobalVars
    async fn write_global_vars(&self, vars: &Fields) -> StoreResult<()>;

    /// Short backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// Build the configured backend
pub fn open_store(config: &LockConfig) -> StoreResult<Arc<dyn GlobalStore>> {
    match config.backend {
        LockBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        LockBackend::Sqlite => Ok(Arc::new(SqliteStore::open(
            &config.database_path,
            &config.table_prefix,
            config.stale_after_secs,
        )?)),
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a UTC timestamp written by [`format_timestamp`]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}
