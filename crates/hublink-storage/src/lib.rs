//! Hublink Storage Layer
//!
//! SQLite database holding hub servers, their credentials and settings.
//! Credential columns are sealed with AES-256-GCM under a master key kept in
//! the OS keychain.
//!
//! ```rust,ignore
//! use anyhow::Context;
//! use hublink_storage::{
//!     default_database_path, open_encrypted, KeychainKeyProvider, SqliteServerStorage,
//!     SqliteSettingsRepository,
//! };
//!
//! let keys = KeychainKeyProvider::new()?;
//! let (db, encryptor) = open_encrypted(&default_database_path().context("no data directory")?, &keys)?;
//! let servers = SqliteServerStorage::new(db.clone(), encryptor);
//! let settings = SqliteSettingsRepository::new(db);
//! ```

pub mod crypto;
mod database;
pub mod keychain;
mod repositories;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

pub use crypto::{generate_master_key, FieldEncryptor, SecretColumn, KEY_SIZE};
pub use database::Database;
pub use keychain::{
    KeychainKeyProvider, MasterKey, MasterKeyProvider, MemoryKeyProvider, KEYCHAIN_SERVICE,
};
pub use repositories::*;

/// Default database file name.
pub const DATABASE_FILE: &str = "hublink.db";

/// `<data_local_dir>/hublink/hublink.db` for the current platform.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("hublink").join(DATABASE_FILE))
}

/// Open the database at `path` and build an encryptor from the provider's key.
pub fn open_encrypted(
    path: &Path,
    keys: &dyn MasterKeyProvider,
) -> anyhow::Result<(Arc<Mutex<Database>>, Arc<FieldEncryptor>)> {
    let key = keys.master_key()?;
    let encryptor = Arc::new(FieldEncryptor::new(&key)?);
    let db = Arc::new(Mutex::new(Database::open(path)?));
    Ok((db, encryptor))
}
