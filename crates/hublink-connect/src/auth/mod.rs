//! Authenticators
//!
//! Two strategies turn a hub base URL plus credentials into request headers:
//!
//! - [`LegacyAuthenticator`]: session login, then a token minted with the
//!   session cookies (hubs from before 2020).
//! - [`ModernAuthenticator`]: API tokens first (the password may itself be a
//!   token), with cookie login as a configurable fallback.
//!
//! The strategy for a stored server is chosen from its
//! [`AuthProviderKind`]; see [`Authenticators::for_kind`].

mod legacy;
mod modern;
mod token_cache;

pub use legacy::LegacyAuthenticator;
pub use modern::{ModernAuthenticator, OAUTH_STATE_COOKIE_SUFFIX};
pub use token_cache::TokenCache;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::{ConnectConfig, TransportContext};
use crate::hub::HubApiClient;
use crate::http::Headers;
use hublink_core::{ApiToken, AuthProviderKind, Credentials, HubError, HubResult};

/// Outcome of one authentication attempt. Never persisted as-is; callers
/// pick what to store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthResult {
    /// Headers to send with every request
    pub headers: Headers,
    /// The API token behind `headers`, when token auth was used
    pub token: Option<ApiToken>,
}

impl AuthResult {
    /// Token headers: `Authorization: token <value>`, plus connection
    /// headers outside browser runtimes.
    pub fn from_token(token: ApiToken, transport: TransportContext) -> Self {
        let mut headers = Headers::new();
        headers.insert("Authorization".into(), format!("token {}", token.token));
        if !transport.is_web() {
            headers.insert("Connection".into(), "keep-alive".into());
            headers.insert("Cache-Control".into(), "no-cache".into());
        }
        Self {
            headers,
            token: Some(token),
        }
    }

    /// Session headers: the cookie jar plus the anti-forgery token both as a
    /// pseudo-header and as `X-Xsrftoken`.
    pub fn from_cookies(cookie: String, xsrf: String) -> Self {
        let mut headers = Headers::new();
        headers.insert("Cookie".into(), cookie);
        headers.insert("_xsrf".into(), xsrf.clone());
        headers.insert("X-Xsrftoken".into(), xsrf);
        Self {
            headers,
            token: None,
        }
    }

    pub fn token_str(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.token.as_str())
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Which persisted kind this strategy corresponds to
    fn kind(&self) -> AuthProviderKind;

    /// Credentials for the user's notebook server
    async fn get_jupyter_auth_info(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult>;

    /// Credentials for the hub REST API. Same as the notebook server's
    /// unless the strategy scopes sessions by path.
    async fn get_hub_api_auth_info(
        &self,
        base_url: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> HubResult<AuthResult> {
        self.get_jupyter_auth_info(base_url, credentials, cancel)
            .await
    }

    /// Best-effort cleanup of anything minted or opened (tokens, sessions).
    /// Errors are logged and swallowed.
    async fn shutdown(&self);
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// The strategies available to a process, in fallback order.
#[derive(Clone)]
pub struct Authenticators {
    modern: SharedAuthenticator,
    legacy: SharedAuthenticator,
}

impl Authenticators {
    pub fn new(modern: SharedAuthenticator, legacy: SharedAuthenticator) -> Self {
        Self { modern, legacy }
    }

    /// The production strategies sharing one REST client
    pub fn standard(api: Arc<HubApiClient>, config: &ConnectConfig) -> Self {
        Self::new(
            Arc::new(ModernAuthenticator::new(api.clone(), config)),
            Arc::new(LegacyAuthenticator::with_transport(api, config.transport)),
        )
    }

    pub fn for_kind(&self, kind: AuthProviderKind) -> SharedAuthenticator {
        match kind {
            AuthProviderKind::Modern => self.modern.clone(),
            AuthProviderKind::Legacy => self.legacy.clone(),
        }
    }

    pub fn modern(&self) -> SharedAuthenticator {
        self.modern.clone()
    }

    /// Strategies in the order the capture workflow tries them
    pub fn fallback_order(&self) -> Vec<SharedAuthenticator> {
        vec![self.modern.clone(), self.legacy.clone()]
    }

    pub async fn shutdown(&self) {
        join_all([self.modern.shutdown(), self.legacy.shutdown()]).await;
    }
}

/// `Err(Cancelled)` once `cancel` has fired. Used after calls that swallow errors.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> HubResult<()> {
    if cancel.is_cancelled() {
        Err(HubError::Cancelled)
    } else {
        Ok(())
    }
}
