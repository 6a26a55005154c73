//! Tokens minted during this process, keyed by (hub, user)

use parking_lot::Mutex;
use std::collections::HashMap;

use hublink_core::ApiToken;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    base_url: String,
    username: String,
}

impl CacheKey {
    fn new(base_url: &str, username: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
        }
    }
}

/// Minted tokens are reused across authentications and revoked on shutdown.
#[derive(Debug, Default)]
pub struct TokenCache {
    tokens: Mutex<HashMap<CacheKey, ApiToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, base_url: &str, username: &str) -> Option<ApiToken> {
        self.tokens
            .lock()
            .get(&CacheKey::new(base_url, username))
            .cloned()
    }

    pub fn insert(&self, base_url: &str, username: &str, token: ApiToken) {
        self.tokens
            .lock()
            .insert(CacheKey::new(base_url, username), token);
    }

    /// Drop the entry, but only if it still holds `token`
    pub fn remove_if(&self, base_url: &str, username: &str, token: &ApiToken) -> bool {
        let mut tokens = self.tokens.lock();
        let key = CacheKey::new(base_url, username);
        if tokens.get(&key) == Some(token) {
            tokens.remove(&key);
            return true;
        }
        false
    }

    /// Take every entry as (base_url, username, token)
    pub fn drain(&self) -> Vec<(String, String, ApiToken)> {
        self.tokens
            .lock()
            .drain()
            .map(|(key, token)| (key.base_url, key.username, token))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
