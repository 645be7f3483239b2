use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

/// String key-value store backed by SQLite.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
            tracing::debug!(from = version, to = 1, "migrated database schema");
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read '{key}'"))?;
        Ok(value)
    }

    pub fn set_value(&self, key: &str, value: &str) -> Result<()> {
        Self::write_value(&self.conn, key, value)
    }

    /// Read, transform, and write one key inside a single transaction.
    ///
    /// `f` receives the current value (if any) and returns the value to store
    /// together with a result handed back to the caller. If `f` fails nothing
    /// is written.
    pub fn update_value<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: FnOnce(Option<String>) -> Result<(String, T)>,
    {
        self.update_values([key], |[current]| {
            let (next, out) = f(current)?;
            Ok(([next], out))
        })
    }

    /// Like [`Self::update_value`], but for several keys committed together.
    pub fn update_values<const N: usize, T, F>(&self, keys: [&str; N], f: F) -> Result<T>
    where
        F: FnOnce([Option<String>; N]) -> Result<([String; N], T)>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let mut current: [Option<String>; N] = std::array::from_fn(|_| None);
        for (slot, key) in current.iter_mut().zip(keys) {
            *slot = tx
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("Failed to read '{key}'"))?;
        }
        let (next, out) = f(current)?;
        for (key, value) in keys.iter().zip(next) {
            Self::write_value(&tx, key, &value)?;
        }
        tx.commit()?;
        Ok(out)
    }

    fn write_value(conn: &Connection, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )
        .with_context(|| format!("Failed to write '{key}'"))?;
        Ok(())
    }
}
