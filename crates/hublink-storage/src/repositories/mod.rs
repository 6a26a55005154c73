//! SQLite implementations of the hublink-core repository traits

mod server_storage;
mod settings_repository;

pub use server_storage::SqliteServerStorage;
pub use settings_repository::SqliteSettingsRepository;
