//! Connection configuration
//!
//! Timeouts, auth preferences and the transport context the connection layer
//! runs in. Values can be overlaid from `HUBLINK_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Where requests are issued from.
///
/// `Web` is a browser-hosted runtime: raw `Set-Cookie` headers are invisible,
/// hubs reject password logins because of CORS and per-request connection
/// headers are forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportContext {
    #[default]
    Native,
    Web,
}

impl TransportContext {
    pub fn is_web(&self) -> bool {
        matches!(self, TransportContext::Web)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" | "node" | "desktop" => Some(TransportContext::Native),
            "web" | "browser" => Some(TransportContext::Web),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectConfig {
    /// Budget for a freshly started server to appear and list kernel specs
    pub server_start_timeout: Duration,
    /// Delay between readiness polls
    pub poll_interval: Duration,
    /// Per-request timeout applied by the HTTP client
    pub request_timeout: Duration,
    /// Mint API tokens instead of replaying login cookies
    pub prefer_token_auth: bool,
    pub transport: TransportContext,
    pub user_agent: String,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            server_start_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
            prefer_token_auth: true,
            transport: TransportContext::Native,
            user_agent: format!("hublink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConnectConfig {
    /// Defaults overlaid with `HUBLINK_*` variables (a `.env` file is loaded first).
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns for each known key.
    /// Unparseable values are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_var::<u64>(&lookup, "HUBLINK_SERVER_START_TIMEOUT_SECS") {
            config.server_start_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HUBLINK_POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HUBLINK_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(prefer) = parse_var::<bool>(&lookup, "HUBLINK_PREFER_TOKEN_AUTH") {
            config.prefer_token_auth = prefer;
        }
        if let Some(raw) = lookup("HUBLINK_TRANSPORT") {
            match TransportContext::parse(&raw) {
                Some(transport) => config.transport = transport,
                None => warn!("[Config] Ignoring unknown HUBLINK_TRANSPORT '{}'", raw),
            }
        }
        if let Some(agent) = lookup("HUBLINK_USER_AGENT").filter(|a| !a.trim().is_empty()) {
            config.user_agent = agent;
        }

        config
    }

    pub fn with_transport(mut self, transport: TransportContext) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_prefer_token_auth(mut self, prefer: bool) -> Self {
        self.prefer_token_auth = prefer;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_server_start_timeout(mut self, timeout: Duration) -> Self {
        self.server_start_timeout = timeout;
        self
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("[Config] Ignoring invalid value for {}: '{}'", key, raw);
            None
        }
    }
}
