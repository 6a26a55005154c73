//! Hublink Connect
//!
//! Connects a notebook client to a JupyterHub:
//! - Hub REST client with base-URL discovery
//! - Legacy (session) and modern (API token) authenticators
//! - Connection validation with server start and certificate prompts
//! - Interactive URL capture workflow with back navigation
//! - Server integration: list, resolve and remove stored servers

pub mod async_util;
pub mod auth;
pub mod capture;
pub mod config;
pub mod cookies;
pub mod http;
pub mod hub;
pub mod integration;
pub mod messages;
pub mod validator;

pub use auth::{
    AuthResult, Authenticator, Authenticators, LegacyAuthenticator, ModernAuthenticator,
    SharedAuthenticator, TokenCache,
};
pub use capture::{
    get_suggested_display_name, CaptureReason, CaptureRequest, CaptureState, InputProvider,
    InputRequest, Step, UrlCaptureWorkflow,
};
pub use config::{ConnectConfig, TransportContext};
pub use cookies::{CookieCapability, CookieStore};
pub use http::{Headers, HubRequest, HubResponse, Redirect, ReqwestFetch, SharedFetch, SimpleFetch};
pub use hub::{create_server_connect_settings, HubApiClient, HubAuth, ServerConnectSettings, UserInfo};
pub use integration::{
    ConnectionInformation, IntegrationDependencies, ResolvedServer, ServerCommand,
    ServerIntegration, UrlRewrite,
};
pub use validator::{
    CertificatePrompt, ConnectionValidator, DenyInsecure, KernelSpecClient, KernelSpecs,
    RestKernelSpecClient,
};
