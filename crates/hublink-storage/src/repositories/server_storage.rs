//! SQLite implementation of `ServerStorage`.
//!
//! Server records are plaintext; the companion credentials row has every
//! secret column sealed by a [`FieldEncryptor`] and bound to its server id.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use hublink_core::{AuthProviderKind, Credentials, ServerRecord, ServerStorage};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::crypto::{FieldEncryptor, SecretColumn};
use crate::Database;

/// Credentials as stored, before decryption
struct SealedCredentials {
    username: String,
    password: String,
    token: Option<String>,
    token_id: Option<String>,
}

pub struct SqliteServerStorage {
    db: Arc<Mutex<Database>>,
    encryptor: Arc<FieldEncryptor>,
}

impl SqliteServerStorage {
    pub fn new(db: Arc<Mutex<Database>>, encryptor: Arc<FieldEncryptor>) -> Self {
        Self { db, encryptor }
    }

    const SELECT_COLUMNS: &'static str = "id, base_url, display_name, auth_provider, server_name";

    fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<ServerRecord> {
        let auth_provider: Option<String> = row.get(3)?;
        let auth_provider_kind = auth_provider.as_deref().and_then(|kind| {
            let parsed = AuthProviderKind::parse(kind);
            if parsed.is_none() {
                warn!("[Storage] Unknown auth provider '{}', treating as unset", kind);
            }
            parsed
        });
        Ok(ServerRecord {
            id: row.get(0)?,
            base_url: row.get(1)?,
            display_name: row.get(2)?,
            auth_provider_kind,
            server_name: row.get(4)?,
        })
    }

    fn open(&self, server_id: &str, sealed: SealedCredentials) -> Result<Credentials> {
        let fields = &self.encryptor;
        Ok(Credentials {
            username: fields.open(SecretColumn::Username, server_id, &sealed.username)?,
            password: fields.open(SecretColumn::Password, server_id, &sealed.password)?,
            token: fields.open_optional(SecretColumn::Token, server_id, sealed.token.as_deref())?,
            token_id: fields.open_optional(
                SecretColumn::TokenId,
                server_id,
                sealed.token_id.as_deref(),
            )?,
        })
    }

    fn seal(&self, server_id: &str, credentials: &Credentials) -> Result<SealedCredentials> {
        let fields = &self.encryptor;
        Ok(SealedCredentials {
            username: fields.seal(SecretColumn::Username, server_id, &credentials.username)?,
            password: fields.seal(SecretColumn::Password, server_id, &credentials.password)?,
            token: fields.seal_optional(SecretColumn::Token, server_id, credentials.token.as_deref())?,
            token_id: fields.seal_optional(
                SecretColumn::TokenId,
                server_id,
                credentials.token_id.as_deref(),
            )?,
        })
    }
}

#[async_trait]
impl ServerStorage for SqliteServerStorage {
    async fn all(&self) -> Result<Vec<ServerRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT {} FROM servers ORDER BY rowid",
            Self::SELECT_COLUMNS
        ))?;
        let servers = stmt
            .query_map([], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(servers)
    }

    async fn get(&self, server_id: &str) -> Result<Option<ServerRecord>> {
        let db = self.db.lock().await;
        let server = db
            .connection()
            .query_row(
                &format!("SELECT {} FROM servers WHERE id = ?1", Self::SELECT_COLUMNS),
                params![server_id],
                Self::record_from_row,
            )
            .optional()?;
        Ok(server)
    }

    async fn get_credentials(&self, server_id: &str) -> Result<Option<Credentials>> {
        let db = self.db.lock().await;
        let sealed = db
            .connection()
            .query_row(
                "SELECT username, password, token, token_id FROM server_credentials WHERE server_id = ?1",
                params![server_id],
                |row| {
                    Ok(SealedCredentials {
                        username: row.get(0)?,
                        password: row.get(1)?,
                        token: row.get(2)?,
                        token_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        drop(db);

        sealed.map(|s| self.open(server_id, s)).transpose()
    }

    async fn add_server_or_update(
        &self,
        server: &ServerRecord,
        credentials: &Credentials,
    ) -> Result<()> {
        let sealed = self.seal(&server.id, credentials)?;
        let now = Utc::now().to_rfc3339();

        let db = self.db.lock().await;
        db.transaction(|conn| {
            conn.execute(
                "INSERT INTO servers (id, base_url, display_name, auth_provider, server_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    base_url = excluded.base_url,
                    display_name = excluded.display_name,
                    auth_provider = excluded.auth_provider,
                    server_name = excluded.server_name,
                    updated_at = excluded.updated_at",
                params![
                    server.id,
                    server.base_url,
                    server.display_name,
                    server.auth_provider_kind.map(|k| k.as_str()),
                    server.server_name,
                    now,
                ],
            )?;
            conn.execute(
                "INSERT INTO server_credentials (server_id, username, password, token, token_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(server_id) DO UPDATE SET
                    username = excluded.username,
                    password = excluded.password,
                    token = excluded.token,
                    token_id = excluded.token_id,
                    updated_at = excluded.updated_at",
                params![
                    server.id,
                    sealed.username,
                    sealed.password,
                    sealed.token,
                    sealed.token_id,
                    now,
                ],
            )?;
            Ok(())
        })?;

        debug!(server_id = %server.id, "[Storage] Saved server");
        Ok(())
    }

    async fn remove_server(&self, server_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        // Credentials go with the record (ON DELETE CASCADE)
        let removed = db
            .connection()
            .execute("DELETE FROM servers WHERE id = ?1", params![server_id])?;
        debug!(server_id = %server_id, removed, "[Storage] Removed server");
        Ok(())
    }
}
