//! Hub REST payloads

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use hublink_core::ApiToken;

#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// A user model as returned by `hub/api/users/{name}` and `hub/api/user`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    /// URL path of the running default server, if any
    #[serde(default)]
    pub server: Option<String>,
    /// "spawn" or "stop" while a transition is in progress
    #[serde(default)]
    pub pending: Option<String>,
    /// Named servers keyed by name; the default server is under ""
    #[serde(default)]
    pub servers: HashMap<String, ServerInfo>,
}

impl UserInfo {
    pub fn has_running_server(&self) -> bool {
        self.server.as_deref().map(|s| !s.is_empty()).unwrap_or(false)
    }

    /// URL path of the named server, or the default server when `name` is `None`
    pub fn server_url(&self, name: Option<&str>) -> Option<&str> {
        self.servers
            .get(name.unwrap_or(""))
            .map(|s| s.url.as_str())
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pending: Option<String>,
}

/// Body of `POST hub/api/users/{name}/tokens`
#[derive(Debug, Clone, Deserialize)]
pub struct NewTokenResponse {
    pub token: String,
    #[serde(default)]
    pub id: String,
}

impl From<NewTokenResponse> for ApiToken {
    fn from(response: NewTokenResponse) -> Self {
        ApiToken::new(response.token, response.id)
    }
}

/// Body of the deprecated `POST hub/api/authorizations/token`
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationTokenResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserInfo>,
}
