//! Connection settings handed to the notebook protocol layer

use serde::{Deserialize, Serialize};

use super::urls::get_jupyter_url;
use crate::http::Headers;
use hublink_core::HubResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerConnectSettings {
    /// Root of the user's notebook server, ending in `/`
    pub base_url: String,
    /// Same as `base_url` with an `ws`/`wss` scheme
    pub ws_url: String,
    pub token: String,
    /// Whether the token is appended to requests and socket URLs
    pub append_token: bool,
    /// Extra headers (session cookies or token headers) for every request
    pub headers: Headers,
    /// Skip certificate validation for `https` servers
    pub allow_unauthorized: bool,
}

impl ServerConnectSettings {
    /// `Authorization` for requests issued with these settings, when the
    /// explicit headers do not already carry one.
    pub fn authorization(&self) -> Option<String> {
        let has_auth_header = self
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("authorization"));
        if has_auth_header || !self.append_token || self.token.is_empty() {
            return None;
        }
        Some(format!("token {}", self.token))
    }
}

/// Build settings for the server of `username` under the hub at `base_url`.
pub fn create_server_connect_settings(
    base_url: &str,
    username: &str,
    token: Option<&str>,
    headers: &Headers,
    allow_unauthorized: bool,
) -> HubResult<ServerConnectSettings> {
    let base_url = get_jupyter_url(base_url, username)?;
    let ws_url = base_url.replacen("http", "ws", 1);
    let token = token.unwrap_or_default();
    let token_is_empty = token.is_empty() || token == "null";

    let (token, append_token) = if !token_is_empty || !headers.is_empty() {
        (token.to_string(), true)
    } else {
        (String::new(), false)
    };

    Ok(ServerConnectSettings {
        allow_unauthorized: allow_unauthorized && base_url.starts_with("https"),
        base_url,
        ws_url,
        token,
        append_token,
        headers: headers.clone(),
    })
}
