//! What a resolved server hands to the notebook client

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cookies::CookieCapability;
use crate::http::{Headers, HubRequest, HubResponse, SharedFetch, SimpleFetch};
use hublink_core::{HubResult, ServerDescriptor};

/// Maps URLs built from the normalised server URL back to the form the
/// hub reported.
///
/// Parsing a server URL can re-encode its path (user names with `@` or
/// spaces), and the hub then routes the request elsewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlRewrite {
    rules: Vec<(String, String)>,
}

impl UrlRewrite {
    pub fn for_server_url(raw_url: &str) -> Self {
        let normalized = normalize_url(raw_url);
        if normalized == raw_url {
            return Self::default();
        }
        Self {
            rules: vec![
                (to_ws(&normalized), to_ws(raw_url)),
                (normalized, raw_url.to_string()),
            ],
        }
    }

    pub fn is_identity(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, url: &str) -> String {
        for (from, to) in &self.rules {
            if url.starts_with(from.as_str()) {
                return format!("{}{}", to, &url[from.len()..]);
            }
        }
        url.to_string()
    }
}

fn normalize_url(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| url.to_string())
}

fn to_ws(url: &str) -> String {
    url.replacen("http", "ws", 1)
}

/// Transport that applies a [`UrlRewrite`] before sending
struct RewritingFetch {
    inner: SharedFetch,
    rewrite: UrlRewrite,
}

#[async_trait]
impl SimpleFetch for RewritingFetch {
    async fn send(&self, mut request: HubRequest, cancel: &CancellationToken) -> HubResult<HubResponse> {
        request.url = self.rewrite.apply(&request.url);
        self.inner.send(request, cancel).await
    }

    fn cookie_capability(&self) -> CookieCapability {
        self.inner.cookie_capability()
    }
}

#[derive(Clone)]
pub struct ConnectionInformation {
    /// User server URL, normalised, ending in `/`
    pub base_url: String,
    pub ws_url: String,
    pub token: Option<String>,
    pub headers: Headers,
    /// Transport to use for this server; rewrites URLs when needed
    pub fetch: SharedFetch,
    pub url_rewrite: UrlRewrite,
}

impl ConnectionInformation {
    pub fn new(raw_server_url: &str, token: Option<String>, headers: Headers, fetch: SharedFetch) -> Self {
        let base_url = normalize_url(raw_server_url);
        let url_rewrite = UrlRewrite::for_server_url(raw_server_url);
        let fetch: SharedFetch = if url_rewrite.is_identity() {
            fetch
        } else {
            Arc::new(RewritingFetch {
                inner: fetch,
                rewrite: url_rewrite.clone(),
            })
        };
        Self {
            ws_url: to_ws(&base_url),
            base_url,
            token,
            headers,
            fetch,
            url_rewrite,
        }
    }
}

impl fmt::Debug for ConnectionInformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInformation")
            .field("base_url", &self.base_url)
            .field("ws_url", &self.ws_url)
            .field("has_token", &self.token.is_some())
            .field("header_names", &self.headers.keys().collect::<Vec<_>>())
            .field("url_rewrite", &self.url_rewrite)
            .finish()
    }
}

/// A server plus how to reach it
#[derive(Debug, Clone)]
pub struct ResolvedServer {
    pub server: ServerDescriptor,
    pub connection: ConnectionInformation,
}
