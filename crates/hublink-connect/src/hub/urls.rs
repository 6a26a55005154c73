//! URL helpers for hub routes

use url::Url;

use hublink_core::{HubError, HubResult};

/// Resolve `path` against `base` treated as a directory.
///
/// `append_url_path("https://h/prefix", "hub/api")` is
/// `https://h/prefix/hub/api`; an absolute `path` replaces the base path.
pub fn append_url_path(base: &str, path: &str) -> HubResult<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let base = Url::parse(&base).map_err(|e| HubError::InvalidUrl(format!("{}: {}", base, e)))?;
    base.join(path)
        .map(|u| u.to_string())
        .map_err(|e| HubError::InvalidUrl(format!("{}: {}", path, e)))
}

/// The user's notebook server root, `user/{username}/`
pub fn get_jupyter_url(base: &str, username: &str) -> HubResult<String> {
    append_url_path(base, &format!("user/{}/", username))
}

pub fn get_hub_api_url(base: &str) -> HubResult<String> {
    append_url_path(base, "hub/api")
}

pub fn get_jupyter_logout_url(base: &str, username: &str) -> HubResult<String> {
    append_url_path(base, &format!("user/{}/logout", username))
}

pub fn get_hub_logout_url(base: &str) -> HubResult<String> {
    append_url_path(base, "hub/logout")
}

pub fn is_valid_url(value: &str) -> bool {
    Url::parse(value.trim()).is_ok()
}

/// Parses and has an `http`/`https` scheme
pub fn is_http_url(value: &str) -> bool {
    Url::parse(value.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// `scheme://host[:port]` of `url`
pub fn origin(url: &str) -> HubResult<String> {
    let parsed = Url::parse(url).map_err(|e| HubError::InvalidUrl(format!("{}: {}", url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}

/// The segment following `/user/` in a notebook server URL.
pub fn extract_user_name_from_url(url: &str) -> Option<String> {
    if !url.to_lowercase().contains("/user/") {
        return None;
    }
    let parts: Vec<&str> = url.split('/').collect();
    let index = parts.iter().position(|p| p.eq_ignore_ascii_case("user"))?;
    parts
        .get(index + 1)
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// The `token` query parameter, as pasted from a notebook server URL.
pub fn extract_token_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}
