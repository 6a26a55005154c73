//! Credentials for a hub server
//!
//! Stored separately from the server record, keyed by the record id.

use serde::{Deserialize, Serialize};

/// A hub-issued API token.
///
/// `id` is the deletable-resource id of the token. It is empty for tokens
/// minted through the deprecated authorizations route and for tokens the
/// user typed in; those cannot be revoked independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiToken {
    pub token: String,
    #[serde(default)]
    pub id: String,
}

impl ApiToken {
    pub fn new(token: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            id: id.into(),
        }
    }

    /// A token without an id (typed by the user or minted the old way)
    pub fn unrevocable(token: impl Into<String>) -> Self {
        Self::new(token, "")
    }

    pub fn is_revocable(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Username/password plus the last token minted for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            token: None,
            token_id: None,
        }
    }

    pub fn with_token(mut self, token: &ApiToken) -> Self {
        self.token = Some(token.token.clone());
        self.token_id = if token.id.is_empty() {
            None
        } else {
            Some(token.id.clone())
        };
        self
    }

    /// The stored token, if it is non-empty
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Stored token plus id when both exist, i.e. something we can revoke
    pub fn revocable_token(&self) -> Option<ApiToken> {
        match (self.token(), self.token_id.as_deref()) {
            (Some(token), Some(id)) if !id.is_empty() => Some(ApiToken::new(token, id)),
            _ => None,
        }
    }

    /// Whether a freshly minted token must be persisted over what we hold.
    ///
    /// Only revocable tokens are stored; the token typed by the user is
    /// already the password.
    pub fn needs_token_update(&self, minted: &ApiToken) -> bool {
        minted.is_revocable() && self.token() != Some(minted.token.as_str())
    }
}
