//! Path-scoped cookie jar for hub login flows
//!
//! Headers are parsed with the `cookie` crate. The jar keeps no expiry and
//! does no domain matching: a cookie is sent when its recorded path occurs
//! in the target URL.

use cookie::Cookie;
use tracing::debug;

use crate::http::HubResponse;

/// Whether the runtime can read raw `Set-Cookie` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CookieCapability {
    SetCookieHeaders,
    /// Browser runtimes hide `Set-Cookie`; the jar stays empty
    Opaque,
}

const XSRF_PREFIX: &str = "_xsrf=";

#[derive(Debug, Clone)]
pub struct CookieStore {
    capability: CookieCapability,
    /// (path, cookies) in first-seen order; each cookie is `name=value`
    cookies_by_path: Vec<(String, Vec<String>)>,
}

impl CookieStore {
    pub fn new(capability: CookieCapability) -> Self {
        Self {
            capability,
            cookies_by_path: Vec::new(),
        }
    }

    pub fn capability(&self) -> CookieCapability {
        self.capability
    }

    pub fn is_empty(&self) -> bool {
        self.cookies_by_path.iter().all(|(_, c)| c.is_empty())
    }

    /// Merge the response's `Set-Cookie` entries into the jar.
    pub fn track_cookies(&mut self, response: &HubResponse) {
        for (cookie, path) in self.parse_cookies(response) {
            self.add(&path, cookie);
        }
    }

    /// `(name=value, path)` for every `Set-Cookie` header; path defaults to `/`.
    pub fn parse_cookies(&self, response: &HubResponse) -> Vec<(String, String)> {
        match self.capability {
            CookieCapability::Opaque => Vec::new(),
            CookieCapability::SetCookieHeaders => response
                .header_all("set-cookie")
                .into_iter()
                .filter_map(parse_set_cookie)
                .collect(),
        }
    }

    fn add(&mut self, path: &str, cookie: String) {
        let path = if path.is_empty() { "/" } else { path };
        match self.cookies_by_path.iter_mut().find(|(p, _)| p == path) {
            Some((_, cookies)) => {
                if !cookies.contains(&cookie) {
                    cookies.push(cookie);
                }
            }
            None => self.cookies_by_path.push((path.to_string(), vec![cookie])),
        }
    }

    /// All cookies whose path occurs in `url`.
    pub fn cookies_to_send(&self, url: &str) -> Vec<&str> {
        self.cookies_by_path
            .iter()
            .filter(|(path, _)| url.contains(path.as_str()) || url.contains(&format!("{}/", path)))
            .flat_map(|(_, cookies)| cookies.iter().map(String::as_str))
            .collect()
    }

    /// `Cookie` header value for `url`, skipping cookies rejected by `keep`.
    pub fn cookie_header_filtered<F>(&self, url: &str, keep: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        self.cookies_to_send(url)
            .into_iter()
            .filter(|c| keep(cookie_name(c)))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn cookie_header(&self, url: &str) -> String {
        self.cookie_header_filtered(url, |_| true)
    }

    /// Value of the first `_xsrf` cookie applicable to `url`, or empty.
    pub fn xsrf_token(&self, url: &str) -> String {
        self.cookies_to_send(url)
            .into_iter()
            .find(|c| c.starts_with(XSRF_PREFIX))
            .map(|c| c.trim()[XSRF_PREFIX.len()..].to_string())
            .unwrap_or_default()
    }
}

/// Name part of a `name=value` cookie
pub fn cookie_name(cookie: &str) -> &str {
    cookie.split_once('=').map(|(n, _)| n).unwrap_or(cookie).trim()
}

fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let cookie = match Cookie::parse(header) {
        Ok(cookie) => cookie,
        Err(e) => {
            debug!("[Cookies] Ignoring malformed Set-Cookie: {}", e);
            return None;
        }
    };
    let path = cookie
        .path()
        .filter(|p| !p.is_empty())
        .unwrap_or("/")
        .to_string();
    Some((format!("{}={}", cookie.name(), cookie.value_trimmed()), path))
}
