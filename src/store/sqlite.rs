//! SQLite global store
//!
//! Row-based lock and global vars in a database file shared by every hub
//! process of a deployment. One table holds both records:
//!
//! | socksessid | meaning                                  |
//! |------------|------------------------------------------|
//! | `global`   | `vars` is the GlobalVars JSON object     |
//! | `lock`     | present while some process holds the lock |
//!
//! The lock row is taken by INSERT against the unique `socksessid` column.
//! A holder that crashes leaves its row behind; the next failed attempt
//! deletes it once `touched` is older than the staleness timeout.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::error::{StoreError, StoreResult};
use super::{format_timestamp, GlobalStore};
use crate::event::Fields;
use crate::session::generate_instance_id;

const GLOBAL_KEY: &str = "global";
const LOCK_KEY: &str = "lock";

/// Global store backed by a shared SQLite file
pub struct SqliteStore {
    conn: Mutex<Connection>,
    table: String,
    stale_after_secs: u64,
    /// `vars` of the lock row this store inserted, while held
    held: Mutex<Option<String>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Create or open the store at `path`
    pub fn open(path: &Path, table_prefix: &str, stale_after_secs: u64) -> StoreResult<Self> {
        if !table_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::Config(format!(
                "invalid table prefix '{table_prefix}'"
            )));
        }
        stale_threshold(stale_after_secs)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        let table = format!("{table_prefix}sockets_sessions");
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    socksessid TEXT NOT NULL UNIQUE,
                    connected TEXT NOT NULL,
                    touched TEXT NOT NULL,
                    vars TEXT NOT NULL
                )"
            ),
            [],
        )?;

        let now = format_timestamp(Utc::now());
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {table} (socksessid, connected, touched, vars)
                 VALUES (?1, ?2, ?2, '{{}}')"
            ),
            params![GLOBAL_KEY, now],
        )?;

        tracing::debug!(path = ?path, table = %table, "Opened SQLite global store");

        Ok(Self {
            conn: Mutex::new(conn),
            table,
            stale_after_secs,
            held: Mutex::new(None),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Delete the `socksessid` row when it was last touched more than
    /// `secs` seconds ago. Returns the number of rows removed.
    pub fn delete_expired(&self, socksessid: &str, secs: u64) -> StoreResult<usize> {
        let conn = self.conn()?;
        Self::purge(&conn, &self.table, socksessid, secs)
    }

    fn purge(conn: &Connection, table: &str, socksessid: &str, secs: u64) -> StoreResult<usize> {
        let threshold = format_timestamp(stale_threshold(secs)?);
        let removed = conn.execute(
            &format!("DELETE FROM {table} WHERE socksessid = ?1 AND touched < ?2"),
            params![socksessid, threshold],
        )?;
        Ok(removed)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Lock("connection mutex poisoned".to_string()))
    }

    fn held(&self) -> StoreResult<MutexGuard<'_, Option<String>>> {
        self.held
            .lock()
            .map_err(|_| StoreError::Lock("lock state mutex poisoned".to_string()))
    }
}

/// Rows touched before this instant are stale
fn stale_threshold(secs: u64) -> StoreResult<DateTime<Utc>> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|age| Utc::now().checked_sub_signed(age))
        .ok_or_else(|| StoreError::Config(format!("stale_after_secs {secs} is out of range")))
}

#[async_trait]
impl GlobalStore for SqliteStore {
    async fn lock_global_vars(&self) -> StoreResult<bool> {
        let marker = json!({ "id": generate_instance_id() }).to_string();
        let now = format_timestamp(Utc::now());

        let conn = self.conn()?;
        let inserted = conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (socksessid, connected, touched, vars)
                 VALUES (?1, ?2, ?2, ?3)",
                self.table
            ),
            params![LOCK_KEY, now, marker],
        )?;

        if inserted == 0 {
            let removed = Self::purge(&conn, &self.table, LOCK_KEY, self.stale_after_secs)?;
            if removed > 0 {
                tracing::warn!(
                    table = %self.table,
                    stale_after_secs = self.stale_after_secs,
                    "Removed stale global lock"
                );
            }
            return Ok(false);
        }

        *self.held()? = Some(marker);
        Ok(true)
    }

    async fn unlock_global_vars(&self) -> StoreResult<()> {
        let marker = self
            .held()?
            .take()
            .ok_or_else(|| StoreError::Lock("global vars are not locked".to_string()))?;

        let conn = self.conn()?;
        let removed = conn.execute(
            &format!(
                "DELETE FROM {} WHERE socksessid = ?1 AND vars = ?2",
                self.table
            ),
            params![LOCK_KEY, marker],
        )?;
        if removed == 0 {
            tracing::warn!(table = %self.table, "Global lock was taken over before unlock");
        }
        Ok(())
    }

    async fn read_global_vars(&self) -> StoreResult<Fields> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                &format!("SELECT vars FROM {} WHERE socksessid = ?1", self.table),
                params![GLOBAL_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            None => Ok(Fields::new()),
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(vars) => Ok(vars),
                other => Err(StoreError::Serialization(format!(
                    "global vars must be an object, found {other}"
                ))),
            },
        }
    }

    async fn write_global_vars(&self, vars: &Fields) -> StoreResult<()> {
        let raw = serde_json::to_string(vars)?;
        let now = format_timestamp(Utc::now());

        let conn = self.conn()?;
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET touched = ?1, vars = ?2 WHERE socksessid = ?3",
                self.table
            ),
            params![now, raw, GLOBAL_KEY],
        )?;
        if updated == 0 {
            conn.execute(
                &format!(
                    "INSERT INTO {} (socksessid, connected, touched, vars)
                     VALUES (?1, ?2, ?2, ?3)",
                    self.table
                ),
                params![GLOBAL_KEY, now, raw],
            )?;
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
