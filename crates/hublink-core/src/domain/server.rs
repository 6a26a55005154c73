//! Server record - a hub the user has connected to

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which authenticator strategy produced a working connection for a server.
///
/// Persisted with the record so that resolution later picks the same
/// strategy without probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthProviderKind {
    /// Session login followed by token generation (pre-2020 hubs)
    #[serde(alias = "old")]
    Legacy,
    /// API-token first, cookie login as fallback
    #[default]
    #[serde(alias = "new")]
    Modern,
}

impl AuthProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProviderKind::Legacy => "legacy",
            AuthProviderKind::Modern => "modern",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "legacy" | "old" => Some(AuthProviderKind::Legacy),
            "modern" | "new" => Some(AuthProviderKind::Modern),
            _ => None,
        }
    }
}

/// A persisted hub server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    /// Opaque identifier, also the key of the companion credentials
    pub id: String,
    /// Root address of the hub (not the user's notebook server)
    pub base_url: String,
    pub display_name: String,
    /// Missing on records written before strategies were tracked
    #[serde(default)]
    pub auth_provider_kind: Option<AuthProviderKind>,
    /// Named server to start and use; `None` is the default server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

impl ServerRecord {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        display_name: impl Into<String>,
        kind: AuthProviderKind,
    ) -> Self {
        Self {
            id: id.into(),
            base_url: base_url.into(),
            display_name: display_name.into(),
            auth_provider_kind: Some(kind),
            server_name: None,
        }
    }

    /// Generate a fresh server id
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn auth_kind(&self) -> AuthProviderKind {
        self.auth_provider_kind.unwrap_or_default()
    }

    pub fn descriptor(&self) -> ServerDescriptor {
        ServerDescriptor {
            id: self.id.clone(),
            label: self.display_name.clone(),
        }
    }
}

/// What the host's server picker sees: an id and a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    pub id: String,
    pub label: String,
}
