//! Token-first authenticator with cookie-login fallback

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::{check_cancelled, AuthResult, Authenticator, TokenCache};
use crate::config::{ConnectConfig, TransportContext};
use crate::cookies::CookieStore;
use crate::http::{Headers, HubRequest, HubResponse};
use crate::hub::{
    append_url_path, get_hub_api_url, get_hub_logout_url, get_jupyter_logout_url, get_jupyter_url,
    HubApiClient, HubAuth,
};
use hublink_core::{ApiToken, AuthProviderKind, Credentials, HubError, HubResult};

/// Cookies whose name ends with this are never replayed; the hub answers 403.
pub const OAUTH_STATE_COOKIE_SUFFIX: &str = "-oauth-state";

const MAX_REDIRECTS: usize = 10;

/// Which part of the hub the returned headers are for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    JupyterServer,
    HubApi,
}

struct LogoutTarget {
    url: String,
    headers: Headers,
}

/// Authenticates with API tokens:
///
/// 1. the password may already be an API token;
/// 2. a stored token is reused while the hub still accepts it;
/// 3. otherwise a token is minted (and cached per hub and user).
///
/// With token auth disabled, step 3 becomes a form login whose session
/// cookies are replayed.
pub struct ModernAuthenticator {
    api: Arc<HubApiClient>,
    prefer_token_auth: bool,
    transport: TransportContext,
    tokens: TokenCache,
    sessions: DashMap<(String, String), CookieStore>,
    logouts: Mutex<Vec<LogoutTarget>>,
}

impl ModernAuthenticator {
    pub fn new(api: Arc<HubApiClient>, config: &ConnectConfig) -> Self {
        Self {
            api,
            prefer_token_auth: config.prefer_token_auth,
            transport: config.transport,
            tokens: TokenCache::new(),
            sessions: DashMap::new(),
            logouts: Mutex::new(Vec::new()),
        }
    }

    /// Tokens minted so far and not yet revoked
    pub fn token_cache(&self) -> &TokenCache {
        &self.tokens
    }

    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
        scope: Scope,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        let username = credentials.username.as_str();
        let password = credentials.password.as_str();

        if credentials.token().is_none() && !password.is_empty() {
            match self.api.get_current_user(base_url, password, cancel).await {
                Ok(_) => {
                    debug!(base_url = %base_url, "[ModernAuth] Password is an API token");
                    return Ok(self.token_result(ApiToken::unrevocable(password)));
                }
                Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                Err(_) => {}
            }
        }

        if let Some(token) = credentials.token() {
            if self
                .api
                .verify_api_token(base_url, username, token, cancel)
                .await
            {
                let id = credentials.token_id.clone().unwrap_or_default();
                return Ok(self.token_result(ApiToken::new(token, id)));
            }
            check_cancelled(cancel)?;
            debug!(base_url = %base_url, "[ModernAuth] Stored token rejected");
        }

        if self.prefer_token_auth {
            return self.token_auth(base_url, username, password, cancel).await;
        }
        self.cookie_auth(base_url, username, password, scope, cancel)
            .await
    }

    fn token_result(&self, token: ApiToken) -> AuthResult {
        AuthResult::from_token(token, self.transport)
    }

    async fn token_auth(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        if let Some(cached) = self.tokens.get(base_url, username) {
            if self
                .api
                .verify_api_token(base_url, username, &cached.token, cancel)
                .await
            {
                return Ok(self.token_result(cached));
            }
            check_cancelled(cancel)?;
            self.tokens.remove_if(base_url, username, &cached);
            debug!(base_url = %base_url, "[ModernAuth] Cached token no longer valid");
        }

        let token = self
            .api
            .generate_new_api_token(base_url, username, password, cancel)
            .await?;
        info!(
            base_url = %base_url,
            revocable = token.is_revocable(),
            "[ModernAuth] Generated API token"
        );
        self.tokens.insert(base_url, username, token.clone());
        Ok(self.token_result(token))
    }

    async fn cookie_auth(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        scope: Scope,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        let key = (base_url.trim_end_matches('/').to_string(), username.to_string());
        let existing = self.sessions.get(&key).map(|s| s.value().clone());
        let cookies = match existing {
            Some(cookies) => cookies,
            None => {
                let cookies = self.login(base_url, username, password, cancel).await?;
                self.sessions.insert(key, cookies.clone());
                self.track_logouts(base_url, username, &cookies)?;
                cookies
            }
        };

        let scope_url = match scope {
            Scope::JupyterServer => get_jupyter_url(base_url, username)?,
            Scope::HubApi => get_hub_api_url(base_url)?,
        };
        Ok(session_headers(&cookies, &scope_url))
    }

    /// Form login, then a visit to the user's server so its OAuth handshake
    /// leaves the server cookies in the jar.
    async fn login(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<CookieStore> {
        let fetch = self.api.fetch();
        let mut cookies = CookieStore::new(fetch.cookie_capability());
        let login_page = append_url_path(base_url, "hub/login")?;

        let response = fetch
            .send(HubRequest::get(login_page.clone()).manual_redirect(), cancel)
            .await?;
        cookies.track_cookies(&response);
        let xsrf = cookies.xsrf_token(&login_page);

        let login_url = append_url_path(base_url, "hub/login?next=")?;
        let mut fields = vec![("username", username), ("password", password)];
        if !xsrf.is_empty() {
            fields.push(("_xsrf", xsrf.as_str()));
        }
        let request = HubRequest::post(login_url.clone())
            .header("Referer", login_page.clone())
            .header("Cookie", cookies.cookie_header(&login_url))
            .form(&fields)
            .manual_redirect();
        let response = fetch.send(request, cancel).await?;
        if !response.is_redirect() {
            return Err(HubError::Authentication(format!(
                "Failed to log in to {}, ({}) with message {}",
                login_page, response.status, response.body
            )));
        }
        cookies.track_cookies(&response);
        follow_redirects(self, &mut cookies, login_url, response, cancel).await?;

        let server_url = get_jupyter_url(base_url, username)?;
        let request = HubRequest::get(server_url.clone())
            .header("Cookie", cookies.cookie_header(&server_url))
            .manual_redirect();
        match fetch.send(request, cancel).await {
            Ok(response) => {
                cookies.track_cookies(&response);
                follow_redirects(self, &mut cookies, server_url, response, cancel).await?;
            }
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => debug!("[ModernAuth] Could not visit user server after login: {}", e),
        }

        info!(base_url = %base_url, "[ModernAuth] Logged in with session cookies");
        Ok(cookies)
    }

    fn track_logouts(&self, base_url: &str, username: &str, cookies: &CookieStore) -> HubResult<()> {
        let jupyter_logout = get_jupyter_logout_url(base_url, username)?;
        let hub_logout = get_hub_logout_url(base_url)?;
        let mut logouts = self.logouts.lock();
        logouts.push(LogoutTarget {
            headers: session_headers(cookies, &jupyter_logout).headers,
            url: jupyter_logout,
        });
        logouts.push(LogoutTarget {
            headers: session_headers(cookies, &hub_logout).headers,
            url: hub_logout,
        });
        Ok(())
    }
}

fn session_headers(cookies: &CookieStore, url: &str) -> AuthResult {
    let cookie = cookies.cookie_header_filtered(url, |name| !name.ends_with(OAUTH_STATE_COOKIE_SUFFIX));
    AuthResult::from_cookies(cookie, cookies.xsrf_token(url))
}

async fn follow_redirects(
    auth: &ModernAuthenticator,
    cookies: &mut CookieStore,
    mut current_url: String,
    mut response: HubResponse,
    cancel: &CancellationToken,
) -> HubResult<()> {
    let fetch = auth.api.fetch();
    for _ in 0..MAX_REDIRECTS {
        if !response.is_redirect() {
            break;
        }
        let Some(location) = response.header("location") else {
            break;
        };
        let Ok(next_url) = Url::parse(&current_url).and_then(|u| u.join(location)) else {
            break;
        };
        let next_url = next_url.to_string();
        let request = HubRequest::get(next_url.clone())
            .header("Cookie", cookies.cookie_header(&next_url))
            .manual_redirect();
        response = match fetch.send(request, cancel).await {
            Ok(response) => response,
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => {
                debug!("[ModernAuth] Redirect hop failed: {}", e);
                break;
            }
        };
        cookies.track_cookies(&response);
        current_url = next_url;
    }
    Ok(())
}

#[async_trait]
impl Authenticator for ModernAuthenticator {
    fn kind(&self) -> AuthProviderKind {
        AuthProviderKind::Modern
    }

    async fn get_jupyter_auth_info(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        self.authenticate(base_url, credentials, Scope::JupyterServer, cancel)
            .await
    }

    async fn get_hub_api_auth_info(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        self.authenticate(base_url, credentials, Scope::HubApi, cancel)
            .await
    }

    async fn shutdown(&self) {
        let cancel = CancellationToken::new();
        let fetch = self.api.fetch();

        let logouts: Vec<LogoutTarget> = std::mem::take(&mut *self.logouts.lock());
        self.sessions.clear();
        let logout_requests = logouts.iter().map(|target| {
            let request = HubRequest::get(target.url.clone()).headers(&target.headers);
            let cancel = &cancel;
            async move {
                if let Err(e) = fetch.send(request, cancel).await {
                    debug!(url = %target.url, "[ModernAuth] Logout failed: {}", e);
                }
            }
        });

        let minted = self.tokens.drain();
        let deletions = minted
            .iter()
            .filter(|(_, _, token)| token.is_revocable())
            .map(|(base_url, username, token)| {
                let cancel = &cancel;
                async move {
                    if let Err(e) = self
                        .api
                        .delete_api_token(
                            base_url,
                            username,
                            &token.id,
                            HubAuth::Token(&token.token),
                            cancel,
                        )
                        .await
                    {
                        debug!(base_url = %base_url, "[ModernAuth] Failed to delete token: {}", e);
                    }
                }
            });

        futures::join!(join_all(logout_requests), join_all(deletions));
    }
}
