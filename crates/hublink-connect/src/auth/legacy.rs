//! Session-login authenticator for hubs that predate the token API changes

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{check_cancelled, AuthResult, Authenticator};
use crate::config::TransportContext;
use crate::cookies::CookieStore;
use crate::http::{Headers, HubRequest, HubResponse};
use crate::hub::types::NewTokenResponse;
use crate::hub::{append_url_path, HubApiClient, HubAuth};
use hublink_core::{ApiToken, AuthProviderKind, Credentials, HubError, HubResult};

/// Upper bound on redirect hops followed after the login POST
const MAX_LOGIN_REDIRECTS: usize = 10;

/// (hub base URL without trailing slash, username)
type SessionKey = (String, String);

fn session_key(base_url: &str, username: &str) -> SessionKey {
    (base_url.trim_end_matches('/').to_string(), username.to_string())
}

/// Token obtained for one (hub, user), reused until it stops verifying
#[derive(Clone)]
struct LoginSession {
    token: ApiToken,
    /// Session headers that can delete the token; `None` for tokens from the
    /// authorizations route, which have no id
    revoke_with: Option<Headers>,
}

/// Logs in with the hub's form login, follows the redirect chain collecting
/// cookies, then mints a token with the session. Falls back to the
/// deprecated authorizations route.
///
/// Any failure other than cancellation surfaces as
/// [`HubError::AuthenticationNotSupported`].
pub struct LegacyAuthenticator {
    api: Arc<HubApiClient>,
    transport: TransportContext,
    sessions: Mutex<HashMap<SessionKey, LoginSession>>,
}

impl LegacyAuthenticator {
    pub fn new(api: Arc<HubApiClient>) -> Self {
        Self::with_transport(api, TransportContext::Native)
    }

    pub fn with_transport(api: Arc<HubApiClient>, transport: TransportContext) -> Self {
        Self {
            api,
            transport,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    async fn authenticate(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<Option<ApiToken>> {
        let key = session_key(base_url, &credentials.username);
        let cached = self.sessions.lock().get(&key).cloned();
        if let Some(session) = cached {
            if self
                .api
                .verify_api_token(base_url, &credentials.username, &session.token.token, cancel)
                .await
            {
                debug!(base_url = %base_url, "[LegacyAuth] Reusing session token");
                return Ok(Some(session.token));
            }
            check_cancelled(cancel)?;
            debug!(base_url = %base_url, "[LegacyAuth] Session token no longer valid");
            self.sessions.lock().remove(&key);
        }

        if let Some(session) = self
            .token_from_login(base_url, &credentials.username, &credentials.password, cancel)
            .await?
        {
            let token = session.token.clone();
            self.sessions.lock().insert(key, session);
            return Ok(Some(token));
        }

        if credentials.username.is_empty() && credentials.password.is_empty() {
            return Ok(None);
        }

        match self
            .api
            .generate_new_api_token_old_way(
                base_url,
                &credentials.username,
                &credentials.password,
                cancel,
            )
            .await
        {
            Ok(token) => {
                self.sessions.lock().insert(
                    key,
                    LoginSession {
                        token: token.clone(),
                        revoke_with: None,
                    },
                );
                Ok(Some(token))
            }
            Err(HubError::Cancelled) => Err(HubError::Cancelled),
            Err(e) => {
                debug!(base_url = %base_url, "[LegacyAuth] Authorizations route failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn token_from_login(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
        cancel: &CancellationToken,
    ) -> HubResult<Option<LoginSession>> {
        let fetch = self.api.fetch();
        let mut cookies = CookieStore::new(fetch.cookie_capability());
        let login_url = append_url_path(base_url, "hub/login?next=")?;
        let referer = append_url_path(base_url, "hub/login")?;

        let request = HubRequest::post(login_url.clone())
            .header("Referer", referer.clone())
            .form(&[("username", username), ("password", password)])
            .manual_redirect();
        let response = fetch.send(request, cancel).await?;
        if !response.is_redirect() {
            debug!(status = response.status, "[LegacyAuth] Login did not redirect");
            return Ok(None);
        }
        cookies.track_cookies(&response);
        self.follow_redirects(&mut cookies, login_url, response, cancel)
            .await?;

        let tokens_url = append_url_path(base_url, &format!("hub/api/users/{}/tokens", username))?;
        let mut session_headers = Headers::new();
        session_headers.insert("Cookie".into(), cookies.cookie_header(&tokens_url));
        session_headers.insert("Referer".into(), referer);
        let xsrf = cookies.xsrf_token(&tokens_url);
        if !xsrf.is_empty() {
            session_headers.insert("X-Xsrftoken".into(), xsrf);
        }

        let response = fetch
            .send(HubRequest::post(tokens_url).headers(&session_headers), cancel)
            .await?;
        if !response.is_success() {
            debug!(status = response.status, "[LegacyAuth] Token creation rejected");
            return Ok(None);
        }
        let token = match response.json::<NewTokenResponse>() {
            Ok(body) if !body.token.is_empty() && !body.id.is_empty() => ApiToken::from(body),
            _ => return Ok(None),
        };

        // The hub answers with an error if the server is already running
        match self
            .api
            .start_server(base_url, username, None, HubAuth::Headers(&session_headers), cancel)
            .await
        {
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => debug!("[LegacyAuth] Server start not accepted: {}", e),
            Ok(()) => {}
        }

        info!(base_url = %base_url, "[LegacyAuth] Minted token from login session");
        Ok(Some(LoginSession {
            token,
            revoke_with: Some(session_headers),
        }))
    }

    /// Walk the redirect chain one hop at a time, sending the cookies
    /// collected so far with each hop.
    async fn follow_redirects(
        &self,
        cookies: &mut CookieStore,
        mut current_url: String,
        mut response: HubResponse,
        cancel: &CancellationToken,
    ) -> HubResult<()> {
        let fetch = self.api.fetch();
        for _ in 0..MAX_LOGIN_REDIRECTS {
            if !response.is_redirect() {
                return Ok(());
            }
            let Some(location) = response.header("location") else {
                return Ok(());
            };
            let next_url = match Url::parse(&current_url).and_then(|u| u.join(location)) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    debug!("[LegacyAuth] Unusable redirect location: {}", e);
                    return Ok(());
                }
            };

            let request = HubRequest::get(next_url.clone())
                .header("Cookie", cookies.cookie_header(&next_url))
                .manual_redirect();
            response = match fetch.send(request, cancel).await {
                Ok(response) => response,
                Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                Err(e) => {
                    debug!("[LegacyAuth] Redirect hop failed: {}", e);
                    return Ok(());
                }
            };
            cookies.track_cookies(&response);
            current_url = next_url;
        }
        warn!("[LegacyAuth] Too many redirects after login");
        Ok(())
    }
}

#[async_trait]
impl Authenticator for LegacyAuthenticator {
    fn kind(&self) -> AuthProviderKind {
        AuthProviderKind::Legacy
    }

    async fn get_jupyter_auth_info(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        match self.authenticate(base_url, credentials, cancel).await {
            // Revoked with its login session on shutdown, so the id stays private
            Ok(Some(token)) => Ok(AuthResult::from_token(
                ApiToken::unrevocable(token.token),
                self.transport,
            )),
            Ok(None) => Err(HubError::AuthenticationNotSupported),
            Err(HubError::Cancelled) => Err(HubError::Cancelled),
            Err(HubError::AuthenticationNotSupported) => Err(HubError::AuthenticationNotSupported),
            Err(e) => {
                error!(base_url = %base_url, "[LegacyAuth] Failed to get auth info: {}", e);
                Err(HubError::AuthenticationNotSupported)
            }
        }
    }

    async fn shutdown(&self) {
        let sessions: Vec<(SessionKey, LoginSession)> = self.sessions.lock().drain().collect();
        let cancel = CancellationToken::new();
        let deletions = sessions
            .iter()
            .filter_map(|((base_url, username), session)| {
                let headers = session.revoke_with.as_ref()?;
                session
                    .token
                    .is_revocable()
                    .then_some((base_url, username, &session.token.id, headers))
            })
            .map(|(base_url, username, token_id, headers)| {
                let cancel = &cancel;
                async move {
                    if let Err(e) = self
                        .api
                        .delete_api_token(base_url, username, token_id, HubAuth::Headers(headers), cancel)
                        .await
                    {
                        debug!(base_url = %base_url, "[LegacyAuth] Failed to delete token: {}", e);
                    }
                }
            });
        join_all(deletions).await;
    }
}
