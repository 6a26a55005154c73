//! SQLite connection plus schema migrations.
//!
//! Secrets are encrypted by the repositories before they reach SQLite, so a
//! plain (non-SQLCipher) database is enough.
//!
//! Each `migrations/NNN_name.sql` file runs once, in its own transaction,
//! and is recorded in `schema_migrations`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info, warn};

/// (version, name, sql), in ascending version order
const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "initial", include_str!("migrations/001_initial.sql"))];

const MIGRATION_TABLE: &str = "CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)";

/// One SQLite connection holding hub servers, credentials and settings.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database file, creating parent directories,
    /// and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create data directory {}", dir.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Cannot open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        debug!("[Storage] Opened {}", path.display());
        Self::prepare(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        // Credential rows cascade with their server
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute(MIGRATION_TABLE, [])?;
        let applied = self.schema_version()?;

        for &(version, name, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > applied) {
            info!("[Storage] Applying migration {:03}_{}", version, name);
            self.transaction(|conn| {
                conn.execute_batch(sql).map_err(|e| {
                    warn!("[Storage] Migration {:03}_{} failed: {}", version, name, e);
                    anyhow::anyhow!("Migration {:03}_{} failed: {}", version, name, e)
                })?;
                conn.execute(
                    "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, datetime('now'))",
                    params![version, name],
                )?;
                Ok(())
            })?;
        }
        Ok(())
    }

    /// Highest applied migration, 0 for a fresh database
    pub fn schema_version(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT IFNULL(MAX(version), 0) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .context("Cannot read schema version")
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction; an error rolls everything back.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
