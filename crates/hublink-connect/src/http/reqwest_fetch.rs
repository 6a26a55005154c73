//! reqwest-backed [`SimpleFetch`]

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{HubRequest, HubResponse, Redirect, SimpleFetch};
use crate::config::{ConnectConfig, TransportContext};
use crate::cookies::CookieCapability;
use hublink_core::{HubError, HubResult, HubSettingsService};

/// One client per redirect policy
struct ClientPair {
    follow: Client,
    manual: Client,
}

impl ClientPair {
    fn build(config: &ConnectConfig, accept_invalid_certs: bool) -> HubResult<Self> {
        let builder = || {
            Client::builder()
                .timeout(config.request_timeout)
                .user_agent(config.user_agent.clone())
                .danger_accept_invalid_certs(accept_invalid_certs)
        };
        let follow = builder()
            .build()
            .map_err(|e| HubError::Http(format!("Failed to build HTTP client: {}", e)))?;
        let manual = builder()
            .redirect(Policy::none())
            .build()
            .map_err(|e| HubError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { follow, manual })
    }

    fn get(&self, redirect: Redirect) -> &Client {
        match redirect {
            Redirect::Follow => &self.follow,
            Redirect::Manual => &self.manual,
        }
    }
}

/// Sends hub requests with reqwest.
///
/// `https` requests switch to a client that skips certificate validation
/// while the allow-unauthorized setting is on; the setting is read per
/// request so a change made by the validator applies immediately.
pub struct ReqwestFetch {
    strict: ClientPair,
    insecure: ClientPair,
    settings: Option<Arc<HubSettingsService>>,
    transport: TransportContext,
}

impl ReqwestFetch {
    pub fn new(config: &ConnectConfig, settings: Arc<HubSettingsService>) -> HubResult<Self> {
        Ok(Self {
            strict: ClientPair::build(config, false)?,
            insecure: ClientPair::build(config, true)?,
            settings: Some(settings),
            transport: config.transport,
        })
    }

    /// A fetch that always validates certificates
    pub fn without_settings(config: &ConnectConfig) -> HubResult<Self> {
        Ok(Self {
            strict: ClientPair::build(config, false)?,
            insecure: ClientPair::build(config, true)?,
            settings: None,
            transport: config.transport,
        })
    }

    async fn allow_unauthorized(&self, url: &str) -> bool {
        if !url.starts_with("https") {
            return false;
        }
        match &self.settings {
            Some(settings) => settings.allow_unauthorized_remote_connection().await,
            None => false,
        }
    }

    async fn execute(&self, request: HubRequest, client: &Client) -> HubResult<HubResponse> {
        let url = request.url.clone();
        let mut builder = client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| classify_error(&url, &e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(|e| classify_error(&url, &e))?;

        Ok(HubResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl SimpleFetch for ReqwestFetch {
    async fn send(&self, request: HubRequest, cancel: &CancellationToken) -> HubResult<HubResponse> {
        if cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }
        let pair = if self.allow_unauthorized(&request.url).await {
            &self.insecure
        } else {
            &self.strict
        };
        let client = pair.get(request.redirect);
        let method = request.method.clone();
        let url = request.url.clone();

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            result = self.execute(request, client) => result,
        };

        match &result {
            Ok(response) => debug!(
                method = %method,
                url = %url,
                status = response.status,
                "[Fetch] Request completed"
            ),
            Err(HubError::Cancelled) => debug!(url = %url, "[Fetch] Request cancelled"),
            Err(e) => warn!(url = %url, "[Fetch] Request failed: {}", e),
        }
        result
    }

    fn cookie_capability(&self) -> CookieCapability {
        match self.transport {
            TransportContext::Native => CookieCapability::SetCookieHeaders,
            TransportContext::Web => CookieCapability::Opaque,
        }
    }
}

/// Map a transport failure onto the hub error taxonomy.
///
/// Certificate problems are recognised from the error chain text because
/// the TLS stack does not expose them as typed errors through reqwest.
fn classify_error(url: &str, err: &reqwest::Error) -> HubError {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        chain.push_str(": ");
        chain.push_str(&inner.to_string());
        source = inner.source();
    }
    classify_message(url, &chain)
}

pub(crate) fn classify_message(url: &str, message: &str) -> HubError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("expired") && lower.contains("certificate") {
        HubError::ExpiredCertificate(url.to_string())
    } else if lower.contains("self signed")
        || lower.contains("self-signed")
        || lower.contains("unknownissuer")
        || lower.contains("unknown issuer")
    {
        HubError::SelfSignedCertificate(url.to_string())
    } else {
        HubError::Http(format!("request to {} failed, reason: {}", url, message))
    }
}
