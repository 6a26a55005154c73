//! Error taxonomy for hub authentication and connection resolution.
//!
//! Every variant carries owned strings only, so a `HubError` can be cloned
//! and handed to every task waiting on the same in-flight resolution.

use serde::{Deserialize, Serialize};

/// Result alias used across the hub client crates
pub type HubResult<T> = Result<T, HubError>;

/// Kind of TLS certificate problem detected while talking to a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateProblem {
    SelfSigned,
    Expired,
}

impl CertificateProblem {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateProblem::SelfSigned => "self-signed",
            CertificateProblem::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HubError {
    #[error("Invalid Jupyter Hub Url {0} (failed to get version).")]
    InvalidHubUrl(String),

    #[error("Unable to determine base url of Jupyter Hub Server {0}")]
    BaseUrlNotDeterminable(String),

    #[error("Authentication not supported")]
    AuthenticationNotSupported,

    /// A strategy failed for a reason other than "unsupported"; the
    /// capture workflow retries with the next strategy.
    #[error("{0}")]
    Authentication(String),

    #[error("Failed to fetch user info, ({status}) with message {message}")]
    UserInfoFetchFailed { status: u16, message: String },

    #[error("Failed to start server, ({status}) with message {message}")]
    ServerStartFailed { status: u16, message: String },

    #[error("Failed to generate a new API token: {0}")]
    TokenGenerationFailed(String),

    #[error("Failed to enumerate kernel specs")]
    KernelSpecEnumerationFailed,

    #[error("request to {0} failed, reason: self signed certificate")]
    SelfSignedCertificate(String),

    #[error("request to {0} failed, reason: certificate has expired")]
    ExpiredCertificate(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Server {0} not found")]
    ServerNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl HubError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HubError::Cancelled)
    }

    pub fn certificate_problem(&self) -> Option<CertificateProblem> {
        match self {
            HubError::SelfSignedCertificate(_) => Some(CertificateProblem::SelfSigned),
            HubError::ExpiredCertificate(_) => Some(CertificateProblem::Expired),
            _ => None,
        }
    }

    pub fn is_certificate_error(&self) -> bool {
        self.certificate_problem().is_some()
    }

    /// Wrap an infrastructure error coming out of a storage backend
    pub fn storage(err: impl std::fmt::Display) -> Self {
        HubError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for HubError {
    fn from(err: serde_json::Error) -> Self {
        HubError::InvalidResponse(err.to_string())
    }
}
