//! Connection validation
//!
//! [`ConnectionValidator`] makes sure a user's notebook server is running
//! and answers kernel-spec requests before a server is stored or handed to
//! the notebook client:
//!
//! 1. start the server if the hub lists none (best effort), then poll until
//!    it shows up or the start budget runs out;
//! 2. fetch fresh auth info, since tokens may rotate on server start;
//! 3. enumerate kernel specs, retrying while a just-started server warms up.
//!
//! Certificate failures are turned into a prompt. If the user accepts, the
//! allow-unauthorized setting is persisted and the whole validation runs
//! once more.

mod kernel_specs;

pub use kernel_specs::{KernelSpecClient, KernelSpecs, RestKernelSpecClient, KERNEL_SPECS_TIMEOUT};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::async_util::{sleep, StopWatch};
use crate::auth::Authenticator;
use crate::config::ConnectConfig;
use crate::hub::{create_server_connect_settings, HubApiClient, HubAuth};
use crate::messages;
use hublink_core::{
    CertificateProblem, Credentials, EventSender, HubError, HubEvent, HubResult,
    HubSettingsService,
};

/// Asks the user whether to connect despite a certificate problem.
#[async_trait]
pub trait CertificatePrompt: Send + Sync {
    async fn allow_insecure(&self, problem: CertificateProblem, message: &str) -> bool;
}

/// Prompt for hosts without UI: never trusts a bad certificate.
pub struct DenyInsecure;

#[async_trait]
impl CertificatePrompt for DenyInsecure {
    async fn allow_insecure(&self, _problem: CertificateProblem, _message: &str) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerStart {
    AlreadyRunning,
    Started,
    /// Could not tell (no permission to read user info, start timed out, ...)
    Unknown,
}

pub struct ConnectionValidator {
    api: Arc<HubApiClient>,
    kernel_specs: Arc<dyn KernelSpecClient>,
    settings: Arc<HubSettingsService>,
    prompt: Arc<dyn CertificatePrompt>,
    events: Option<EventSender>,
    server_start_timeout: Duration,
    poll_interval: Duration,
}

impl ConnectionValidator {
    pub fn new(
        api: Arc<HubApiClient>,
        kernel_specs: Arc<dyn KernelSpecClient>,
        settings: Arc<HubSettingsService>,
        config: &ConnectConfig,
    ) -> Self {
        Self {
            api,
            kernel_specs,
            settings,
            prompt: Arc::new(DenyInsecure),
            events: None,
            server_start_timeout: config.server_start_timeout,
            poll_interval: config.poll_interval,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CertificatePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn validate_jupyter_uri(
        &self,
        base_url: &str,
        credentials: &Credentials,
        authenticator: &dyn Authenticator,
        cancel: &CancellationToken,
    ) -> HubResult<()> {
        let err = match self
            .validate_once(base_url, credentials, authenticator, cancel)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if err.is_cancellation() || cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }
        let Some(problem) = err.certificate_problem() else {
            return Err(err);
        };
        if !self.solve_certificate_problem(problem, &err).await {
            return Err(err);
        }

        info!(base_url = %base_url, problem = problem.as_str(), "[Validator] Retrying with unauthorized connections allowed");
        self.validate_once(base_url, credentials, authenticator, cancel)
            .await
    }

    async fn solve_certificate_problem(&self, problem: CertificateProblem, err: &HubError) -> bool {
        let detail = err.to_string();
        let message = match problem {
            CertificateProblem::SelfSigned => messages::self_cert_prompt(&detail),
            CertificateProblem::Expired => messages::expired_cert_prompt(&detail),
        };
        let allowed = self.prompt.allow_insecure(problem, &message).await;
        if let Some(events) = &self.events {
            events.emit(HubEvent::CertificateProblemSolved { problem, allowed });
        }
        if !allowed {
            return false;
        }
        if let Err(e) = self
            .settings
            .set_allow_unauthorized_remote_connection(true)
            .await
        {
            warn!("[Validator] Failed to persist allow-unauthorized setting: {}", e);
        }
        true
    }

    async fn validate_once(
        &self,
        base_url: &str,
        credentials: &Credentials,
        authenticator: &dyn Authenticator,
        cancel: &CancellationToken,
    ) -> HubResult<()> {
        let start = match self
            .start_if_not_started(base_url, credentials, authenticator, cancel)
            .await
        {
            Ok(start) => start,
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => {
                error!(base_url = %base_url, "[Validator] Failed to start server: {}", e);
                ServerStart::Unknown
            }
        };
        let started = StopWatch::new();

        let auth = authenticator
            .get_jupyter_auth_info(base_url, credentials, cancel)
            .await?;
        let allow_unauthorized = self.settings.allow_unauthorized_remote_connection().await;

        let mut retries = 0;
        loop {
            let settings = create_server_connect_settings(
                base_url,
                &credentials.username,
                auth.token_str(),
                &auth.headers,
                allow_unauthorized,
            )?;
            if self
                .kernel_specs
                .get_kernel_specs(&settings, cancel)
                .await?
                .is_some()
            {
                debug!(base_url = %base_url, "[Validator] Kernel specs available");
                return Ok(());
            }

            if start != ServerStart::Started {
                return Err(HubError::KernelSpecEnumerationFailed);
            }
            sleep(self.poll_interval, cancel).await?;
            if retries > 0 && started.elapsed() > self.server_start_timeout {
                return Err(HubError::KernelSpecEnumerationFailed);
            }
            retries += 1;
            debug!(base_url = %base_url, "[Validator] Waiting for server to start");
        }
    }

    /// Start the user's server unless the hub already lists one.
    async fn start_if_not_started(
        &self,
        base_url: &str,
        credentials: &Credentials,
        authenticator: &dyn Authenticator,
        cancel: &CancellationToken,
    ) -> HubResult<ServerStart> {
        let hub_auth = authenticator
            .get_hub_api_auth_info(base_url, credentials, cancel)
            .await?;
        let auth = HubAuth::Headers(&hub_auth.headers);
        let username = credentials.username.as_str();

        let info = self
            .api
            .get_user_info(base_url, username, auth, false, cancel)
            .await?;
        if info.has_running_server() {
            return Ok(ServerStart::AlreadyRunning);
        }

        info!(base_url = %base_url, "[Validator] {}", messages::STARTING_SERVER);
        match self
            .api
            .start_server(base_url, username, None, auth, cancel)
            .await
        {
            Ok(()) => {}
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => error!(base_url = %base_url, "[Validator] Failed to start the server: {}", e),
        }

        let stopwatch = StopWatch::new();
        loop {
            let info = self
                .api
                .get_user_info(base_url, username, auth, false, cancel)
                .await?;
            if info.has_running_server() {
                return Ok(ServerStart::Started);
            }
            if stopwatch.elapsed() > self.server_start_timeout {
                error!(
                    base_url = %base_url,
                    pending = ?info.pending,
                    "[Validator] Timeout waiting for server to start"
                );
                return Ok(ServerStart::Unknown);
            }
            sleep(self.poll_interval, cancel).await?;
        }
    }
}
