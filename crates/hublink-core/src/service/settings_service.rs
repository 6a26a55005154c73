//! Hub Settings Service
//!
//! Typed access to the handful of persisted settings the connection layer
//! reads, backed by a [`SettingsRepository`].

use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::SettingsRepository;

/// Setting key constants.
pub mod keys {
    /// Remote connection settings namespace
    pub mod connection {
        /// Accept self-signed or expired certificates on remote hubs (bool)
        pub const ALLOW_UNAUTHORIZED: &str = "jupyter.allowUnauthorizedRemoteConnection";
    }
}

pub struct HubSettingsService {
    repository: Arc<dyn SettingsRepository>,
}

impl HubSettingsService {
    pub fn new(repository: Arc<dyn SettingsRepository>) -> Self {
        Self { repository }
    }

    /// Get a setting value parsed as JSON.
    ///
    /// Returns `None` if the key doesn't exist, the read fails or parsing fails.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.repository.get(key).await {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    warn!("[Settings] Failed to parse '{}' value: {}", key, value);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("[Settings] Failed to get '{}': {}", key, e);
                None
            }
        }
    }

    pub async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(value)?;
        self.repository.set(key, &serialized).await
    }

    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.repository.delete(key).await
    }

    /// Whether certificate errors on remote hubs are ignored (default: false)
    pub async fn allow_unauthorized_remote_connection(&self) -> bool {
        self.get_typed(keys::connection::ALLOW_UNAUTHORIZED)
            .await
            .unwrap_or(false)
    }

    pub async fn set_allow_unauthorized_remote_connection(
        &self,
        allow: bool,
    ) -> anyhow::Result<()> {
        info!("[Settings] Setting allow unauthorized remote connection to {}", allow);
        self.set_typed(keys::connection::ALLOW_UNAUTHORIZED, &allow)
            .await
    }
}
