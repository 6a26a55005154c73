//! Hub REST client
//!
//! Thin wrappers over the JupyterHub REST surface. The client owns the
//! base-URL cache so that tests and hosts can build isolated instances.

mod settings;
pub mod types;
pub mod urls;

pub use settings::{create_server_connect_settings, ServerConnectSettings};
pub use types::{ServerInfo, UserInfo};
pub use urls::*;

use dashmap::DashMap;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::http::{Headers, HubRequest, HubResponse, SharedFetch};
use hublink_core::{ApiToken, HubError, HubResult};
use types::{AuthorizationTokenResponse, NewTokenResponse, VersionInfo};

/// Note attached to tokens minted by this client
const TOKEN_NOTE: &str = "Requested by hublink";

/// How a hub API call authenticates.
#[derive(Debug, Clone, Copy)]
pub enum HubAuth<'a> {
    /// `Authorization: token <value>`
    Token(&'a str),
    /// Pre-built headers (session cookies or token headers)
    Headers(&'a Headers),
    None,
}

impl HubAuth<'_> {
    fn apply(self, request: HubRequest) -> HubRequest {
        match self {
            HubAuth::Token(token) => request.token(token),
            HubAuth::Headers(headers) => request.headers(headers),
            HubAuth::None => request,
        }
    }
}

pub struct HubApiClient {
    fetch: SharedFetch,
    /// Raw input URL -> hub base URL; never expires within a process
    base_urls: DashMap<String, String>,
}

impl HubApiClient {
    pub fn new(fetch: SharedFetch) -> Self {
        Self {
            fetch,
            base_urls: DashMap::new(),
        }
    }

    pub fn fetch(&self) -> &SharedFetch {
        &self.fetch
    }

    async fn send(&self, request: HubRequest, cancel: &CancellationToken) -> HubResult<HubResponse> {
        self.fetch.send(request, cancel).await
    }

    /// Hub version from `{url}/hub/api`; anything but a 200 means `url` is not a hub root.
    pub async fn get_version(&self, url: &str, cancel: &CancellationToken) -> HubResult<String> {
        let request = HubRequest::get(append_url_path(url, "hub/api")?).manual_redirect();
        let response = self.send(request, cancel).await?;
        if response.status == 200 {
            let info: VersionInfo = response.json()?;
            return Ok(info.version);
        }
        Err(HubError::InvalidHubUrl(url.to_string()))
    }

    /// Find the hub root for a URL the user typed, which may point into a
    /// notebook server (`https://host/user/joe/lab`).
    ///
    /// Tries the URL as-is, then the URL cut before `/user/`, then its origin.
    pub async fn get_jupyter_hub_base_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> HubResult<String> {
        if let Some(cached) = self.base_urls.get(url) {
            return Ok(cached.value().clone());
        }

        let mut candidates = vec![url.to_string()];
        // ASCII lowercasing keeps byte offsets valid for slicing `url`
        if let Some(index) = url.to_ascii_lowercase().find("/user/") {
            candidates.push(url[..index].to_string());
        }
        if let Ok(origin) = origin(url) {
            candidates.push(origin);
        }
        candidates.dedup();

        for candidate in candidates {
            match self.get_version(&candidate, cancel).await {
                Ok(version) => {
                    info!(url = %url, base_url = %candidate, version = %version, "[HubApi] Found hub base URL");
                    self.base_urls.insert(url.to_string(), candidate.clone());
                    return Ok(candidate);
                }
                Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                Err(e) => debug!(candidate = %candidate, "[HubApi] Not a hub root: {}", e),
            }
        }

        Err(HubError::BaseUrlNotDeterminable(url.to_string()))
    }

    /// `GET hub/api/users/{username}`
    pub async fn get_user_info(
        &self,
        base_url: &str,
        username: &str,
        auth: HubAuth<'_>,
        include_stopped_servers: bool,
        cancel: &CancellationToken,
    ) -> HubResult<UserInfo> {
        let path = if include_stopped_servers {
            format!("hub/api/users/{}?include_stopped_servers", username)
        } else {
            format!("hub/api/users/{}", username)
        };
        let request = auth.apply(HubRequest::get(append_url_path(base_url, &path)?));
        let response = self.send(request, cancel).await?;
        if response.status == 200 {
            return response.json();
        }
        Err(HubError::UserInfoFetchFailed {
            status: response.status,
            message: response.body,
        })
    }

    /// `GET hub/api/user`: the user owning `token`
    pub async fn get_current_user(
        &self,
        base_url: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> HubResult<UserInfo> {
        let request = HubRequest::get(append_url_path(base_url, "hub/api/user")?).token(token);
        let response = self.send(request, cancel).await?;
        if response.status == 200 {
            return response.json();
        }
        Err(HubError::UserInfoFetchFailed {
            status: response.status,
            message: response.body,
        })
    }

    /// Mint an API token with username/password, falling back to the
    /// deprecated authorizations route (whose tokens have no id).
    pub async fn generate_new_api_token(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<ApiToken> {
        let first_error = match self
            .generate_new_api_token_with_credentials(base_url, username, password, cancel)
            .await
        {
            Ok(token) => return Ok(token),
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => e,
        };

        debug!(
            base_url = %base_url,
            "[HubApi] Token route failed ({}), trying authorizations route",
            first_error
        );
        match self
            .generate_new_api_token_old_way(base_url, username, password, cancel)
            .await
        {
            Ok(token) => Ok(token),
            Err(HubError::Cancelled) => Err(HubError::Cancelled),
            Err(e) => {
                debug!(base_url = %base_url, "[HubApi] Authorizations route failed: {}", e);
                Err(HubError::TokenGenerationFailed(first_error.to_string()))
            }
        }
    }

    async fn generate_new_api_token_with_credentials(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<ApiToken> {
        let url = append_url_path(base_url, &format!("hub/api/users/{}/tokens", username))?;
        let body = json!({
            "auth": { "username": username, "password": password },
            "note": TOKEN_NOTE,
        });
        let response = self.send(HubRequest::post(url).json(&body), cancel).await?;
        if !response.is_success() {
            return Err(HubError::TokenGenerationFailed(format!(
                "({}) {}",
                response.status, response.body
            )));
        }
        let token: NewTokenResponse = response.json()?;
        if token.token.is_empty() {
            return Err(HubError::InvalidResponse("token missing from response".into()));
        }
        Ok(token.into())
    }

    /// `POST hub/api/authorizations/token`. The token cannot be revoked by id.
    pub async fn generate_new_api_token_old_way(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<ApiToken> {
        let url = append_url_path(base_url, "hub/api/authorizations/token")?;
        let body = json!({ "username": username, "password": password });
        let request = HubRequest::post(url).json(&body).manual_redirect();
        let response = self.send(request, cancel).await?;
        if response.status != 200 {
            return Err(HubError::TokenGenerationFailed(format!(
                "({}) {}",
                response.status, response.body
            )));
        }
        let body: AuthorizationTokenResponse = response.json()?;
        match body.token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(ApiToken::unrevocable(token)),
            None => Err(HubError::InvalidResponse("token missing from response".into())),
        }
    }

    /// Whether `token` can read the user's model. Never fails: any error,
    /// including an opaque browser failure, means "invalid".
    pub async fn verify_api_token(
        &self,
        base_url: &str,
        username: &str,
        token: &str,
        cancel: &CancellationToken,
    ) -> bool {
        match self
            .get_user_info(base_url, username, HubAuth::Token(token), false, cancel)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(base_url = %base_url, "[HubApi] API token rejected: {}", e);
                false
            }
        }
    }

    /// `DELETE hub/api/users/{username}/tokens/{token_id}`
    pub async fn delete_api_token(
        &self,
        base_url: &str,
        username: &str,
        token_id: &str,
        auth: HubAuth<'_>,
        cancel: &CancellationToken,
    ) -> HubResult<()> {
        let url = append_url_path(
            base_url,
            &format!("hub/api/users/{}/tokens/{}", username, token_id),
        )?;
        let response = self.send(auth.apply(HubRequest::delete(url)), cancel).await?;
        if response.is_success() {
            debug!(base_url = %base_url, "[HubApi] Deleted API token");
            Ok(())
        } else {
            Err(HubError::Http(format!(
                "Failed to delete token, ({}) with message {}",
                response.status, response.body
            )))
        }
    }

    /// Ask the hub to spawn the user's (optionally named) server.
    pub async fn start_server(
        &self,
        base_url: &str,
        username: &str,
        server_name: Option<&str>,
        auth: HubAuth<'_>,
        cancel: &CancellationToken,
    ) -> HubResult<()> {
        let path = match server_name.filter(|n| !n.is_empty()) {
            Some(name) => format!("hub/api/users/{}/servers/{}", username, name),
            None => format!("hub/api/users/{}/server", username),
        };
        let url = append_url_path(base_url, &path)?;
        let response = self.send(auth.apply(HubRequest::post(url)), cancel).await?;
        if response.status == 201 || response.status == 202 {
            info!(base_url = %base_url, status = response.status, "[HubApi] Server start accepted");
            return Ok(());
        }
        Err(HubError::ServerStartFailed {
            status: response.status,
            message: response.body,
        })
    }

    /// Absolute URL of the user's notebook server as the hub reports it.
    ///
    /// Prefers the named server, then the default server, then the
    /// conventional `user/{username}/` path.
    pub async fn get_user_jupyter_url(
        &self,
        base_url: &str,
        username: &str,
        server_name: Option<&str>,
        auth: HubAuth<'_>,
        cancel: &CancellationToken,
    ) -> HubResult<String> {
        match self
            .get_user_info(base_url, username, auth, false, cancel)
            .await
        {
            Ok(info) => {
                if let Some(name) = server_name.filter(|n| !n.is_empty()) {
                    if let Some(url) = info.server_url(Some(name)) {
                        return append_url_path(base_url, url);
                    }
                    warn!(server_name = %name, "[HubApi] Named server not found, using default server");
                }
                if let Some(url) = info.server_url(None) {
                    return append_url_path(base_url, url);
                }
                warn!("[HubApi] User info has no server URL, using the default path");
            }
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => warn!("[HubApi] Failed to get user info for server URL: {}", e),
        }
        get_jupyter_url(base_url, username)
    }
}
