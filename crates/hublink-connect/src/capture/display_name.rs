use std::collections::HashSet;
use url::{Host, Url};

/// Label used when the host name makes a poor one
pub const DEFAULT_DISPLAY_NAME: &str = "JupyterHub";

/// Suggest a label for a new server: its host name, or `"<name> N"` when
/// that is taken. IP hosts are labelled [`DEFAULT_DISPLAY_NAME`].
pub fn get_suggested_display_name(url: &str, used_names: &[String]) -> String {
    let mut used: HashSet<String> = used_names.iter().map(|n| n.to_lowercase()).collect();
    used.insert("localhost".to_string());
    used.insert(String::new());

    let host_name = match Url::parse(url.trim()).ok().as_ref().and_then(Url::host) {
        Some(Host::Domain(domain)) => domain.to_string(),
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    };
    if !used.contains(&host_name.to_lowercase()) {
        return host_name;
    }
    (1..10)
        .map(|i| format!("{} {}", host_name, i))
        .find(|name| !used.contains(&name.to_lowercase()))
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}
