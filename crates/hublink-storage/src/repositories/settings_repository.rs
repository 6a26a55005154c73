//! SQLite implementation of SettingsRepository.
//!
//! Key-value store with dot-notation keys, e.g.
//! `jupyter.allowUnauthorizedRemoteConnection`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hublink_core::SettingsRepository;
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;

use crate::Database;

pub struct SqliteSettingsRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteSettingsRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    /// All settings sorted by key
    pub async fn list(&self) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().await;
        let mut stmt = db
            .connection()
            .prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl SettingsRepository for SqliteSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let value = db
            .connection()
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO settings (key, value, updated_at)
             VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM settings WHERE key = ?", params![key])?;
        Ok(())
    }
}
