//! Request/response abstraction over the HTTP stack
//!
//! Everything that talks to a hub goes through [`SimpleFetch`], so the REST
//! client, authenticators and validator can run against reqwest, a browser
//! bridge or a test double without change.

mod reqwest_fetch;

pub use reqwest_fetch::ReqwestFetch;

use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::cookies::CookieCapability;
use hublink_core::{HubError, HubResult};

/// Request headers keyed by header name
pub type Headers = HashMap<String, String>;

/// What to do when the hub answers with a 3xx
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Redirect {
    #[default]
    Follow,
    /// Hand the redirect response back so the caller can read its cookies
    Manual,
}

#[derive(Debug, Clone)]
pub struct HubRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub redirect: Redirect,
}

impl HubRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            redirect: Redirect::Follow,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<'a>(mut self, headers: impl IntoIterator<Item = (&'a String, &'a String)>) -> Self {
        for (name, value) in headers {
            self.headers.push((name.clone(), value.clone()));
        }
        self
    }

    /// `Authorization: token <value>`
    pub fn token(self, token: &str) -> Self {
        self.header("Authorization", format!("token {}", token))
    }

    pub fn json(mut self, body: &serde_json::Value) -> Self {
        self.body = Some(body.to_string());
        self.header("Content-Type", "application/json;charset=UTF-8")
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.body = Some(encoded);
        self.header(
            "Content-Type",
            "application/x-www-form-urlencoded;charset=UTF-8",
        )
    }

    pub fn manual_redirect(mut self) -> Self {
        self.redirect = Redirect::Manual;
        self
    }
}

#[derive(Debug, Clone)]
pub struct HubResponse {
    pub status: u16,
    /// All response headers in arrival order; repeated names are kept
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HubResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a header, case-insensitive
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn json<T: DeserializeOwned>(&self) -> HubResult<T> {
        serde_json::from_str(&self.body).map_err(HubError::from)
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Performs one HTTP request.
#[async_trait]
pub trait SimpleFetch: Send + Sync {
    /// Send `request`, failing with [`HubError::Cancelled`] if `cancel` fires
    /// first. Non-2xx statuses are returned, not raised.
    async fn send(&self, request: HubRequest, cancel: &CancellationToken) -> HubResult<HubResponse>;

    /// Whether raw `Set-Cookie` headers are visible on responses
    fn cookie_capability(&self) -> CookieCapability {
        CookieCapability::SetCookieHeaders
    }
}

pub type SharedFetch = Arc<dyn SimpleFetch>;
