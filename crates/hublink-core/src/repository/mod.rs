//! Repository traits for data access
//!
//! These traits define how servers, their secrets and settings are stored
//! without tying callers to a backend (SQLite, in-memory, etc.)

use async_trait::async_trait;

use crate::domain::{Credentials, ServerRecord};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Persisted hub servers plus their companion secret records.
///
/// Secrets are keyed by the server id and live and die with the record.
#[async_trait]
pub trait ServerStorage: Send + Sync {
    /// All known servers, in insertion order
    async fn all(&self) -> RepoResult<Vec<ServerRecord>>;

    /// Credentials for a server, `None` when the server or its secrets are gone
    async fn get_credentials(&self, server_id: &str) -> RepoResult<Option<Credentials>>;

    /// Insert the server or overwrite the record and credentials with the same id
    async fn add_server_or_update(
        &self,
        server: &ServerRecord,
        credentials: &Credentials,
    ) -> RepoResult<()>;

    /// Remove a server and its credentials. Removing an unknown id is not an error.
    async fn remove_server(&self, server_id: &str) -> RepoResult<()>;

    /// Look up a single server
    async fn get(&self, server_id: &str) -> RepoResult<Option<ServerRecord>> {
        Ok(self.all().await?.into_iter().find(|s| s.id == server_id))
    }
}

/// Key/value store for settings
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Get a setting value by key
    async fn get(&self, key: &str) -> RepoResult<Option<String>>;

    /// Set a setting value (insert or update)
    async fn set(&self, key: &str, value: &str) -> RepoResult<()>;

    /// Delete a setting by key
    async fn delete(&self, key: &str) -> RepoResult<()>;
}
