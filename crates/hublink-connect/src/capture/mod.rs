//! URL capture workflow
//!
//! Walks the user from a hub URL to a stored, validated server:
//!
//! ```text
//! GetUrl -> GetUsername -> GetPassword -> GetHeadersAndCookies
//!        -> VerifyConnection -> GetDisplayName -> After (commit)
//! ```
//!
//! Each step returns the next step, `None` when the user went back, or one
//! of the terminal steps (`Before` aborts, `After` commits). Steps the user
//! can return to are pushed on a back stack held in [`CaptureState`].
//!
//! Authentication strategies are tried in turn with the same credentials.
//! Only when all of them failed is the user sent back to the username step
//! with the first error.

mod display_name;
mod input;

pub use display_name::{get_suggested_display_name, DEFAULT_DISPLAY_NAME};
pub use input::{InputProvider, InputRequest};

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::async_util::race_cancellation;
use crate::auth::{Authenticators, SharedAuthenticator};
use crate::config::TransportContext;
use crate::http::Headers;
use crate::hub::{extract_user_name_from_url, is_valid_url, HubApiClient};
use crate::messages;
use crate::validator::ConnectionValidator;
use hublink_core::{
    Credentials, EventSender, HubError, HubEvent, HubResult, ServerDescriptor, ServerRecord,
    ServerStorage,
};

lazy_static! {
    static ref URL_REGEX: Regex = Regex::new(r"(https?://[^\s]+)").unwrap();
}

/// Render URLs in an error message as markdown links
pub fn linkify(message: &str) -> String {
    URL_REGEX.replace_all(message, "[$1]($1)").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Abort the whole flow
    Before,
    GetUrl,
    GetUsername,
    GetPassword,
    GetHeadersAndCookies,
    VerifyConnection,
    GetDisplayName,
    /// Commit the server
    After,
}

impl Step {
    /// Whether pressing back on a later step can land here
    pub fn can_navigate_back_to_this(self) -> bool {
        matches!(self, Step::GetUrl | Step::GetUsername | Step::GetPassword)
    }
}

/// Why the workflow was opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureReason {
    #[default]
    CaptureNewUrl,
    /// The user pressed back right after a successful capture; re-open at the URL
    CameHereFromBackButton,
}

/// How to open the workflow
#[derive(Debug, Clone, Default)]
pub struct CaptureRequest {
    pub initial_url: String,
    pub display_name: String,
    pub validation_message: String,
    /// Reuse an existing id (updates that server on commit)
    pub server_id: Option<String>,
    pub reason: CaptureReason,
}

impl CaptureRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            initial_url: url.into(),
            ..Default::default()
        }
    }
}

/// Everything entered so far; lives for one capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureState {
    pub url: String,
    pub base_url: String,
    pub display_name: String,
    pub server_id: String,
    /// Shown on the next input box, then cleared
    pub error_message: String,
    pub credentials: Credentials,
    pub headers: Headers,
    pub url_was_prepopulated: bool,
    steps_executed: Vec<Step>,
}

impl CaptureState {
    pub fn steps_executed(&self) -> &[Step] {
        &self.steps_executed
    }

    fn take_error_message(&mut self) -> String {
        std::mem::take(&mut self.error_message)
    }
}

pub struct UrlCaptureWorkflow {
    api: Arc<HubApiClient>,
    authenticators: Authenticators,
    validator: Arc<ConnectionValidator>,
    storage: Arc<dyn ServerStorage>,
    input: Arc<dyn InputProvider>,
    transport: TransportContext,
    events: Option<EventSender>,
}

impl UrlCaptureWorkflow {
    pub fn new(
        api: Arc<HubApiClient>,
        authenticators: Authenticators,
        validator: Arc<ConnectionValidator>,
        storage: Arc<dyn ServerStorage>,
        input: Arc<dyn InputProvider>,
        transport: TransportContext,
    ) -> Self {
        Self {
            api,
            authenticators,
            validator,
            storage,
            input,
            transport,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Run the workflow. `Ok(None)` when the user backed out.
    pub async fn capture(
        &self,
        request: CaptureRequest,
        cancel: &CancellationToken,
    ) -> HubResult<Option<ServerDescriptor>> {
        let result = self.capture_with_fallback(request, cancel).await;
        if let Err(e) = &result {
            if !e.is_cancellation() {
                error!("[UrlCapture] Failed to capture remote server: {}", e);
            }
        }
        result
    }

    async fn capture_with_fallback(
        &self,
        request: CaptureRequest,
        cancel: &CancellationToken,
    ) -> HubResult<Option<ServerDescriptor>> {
        let (mut state, mut step) = self.initial_state(request, cancel).await?;

        let modern = self.authenticators.modern();
        let mut remaining: VecDeque<SharedAuthenticator> =
            self.authenticators.fallback_order().into_iter().skip(1).collect();
        let mut authenticator = modern.clone();
        let mut fallback = true;
        let mut first_error: Option<String> = None;

        loop {
            let err = match self
                .run_steps(&mut state, step, &authenticator, cancel)
                .await
            {
                Ok(outcome) => return Ok(outcome),
                Err(e) => e,
            };
            match err {
                HubError::Cancelled => return Err(HubError::Cancelled),
                HubError::AuthenticationNotSupported => {
                    // Every strategy rejected these credentials
                    fallback = false;
                    authenticator = modern.clone();
                    state.error_message = match first_error.take() {
                        Some(message) => messages::connection_failed_with_error(&linkify(&message)),
                        None => messages::USERNAME_PASSWORD_AUTH_FAILURE.to_string(),
                    };
                    step = Step::GetUsername;
                }
                HubError::Authentication(message) => {
                    let first = first_error.get_or_insert(message);
                    let next = if fallback { remaining.pop_front() } else { None };
                    match next {
                        Some(next) => {
                            debug!(kind = next.kind().as_str(), "[UrlCapture] Trying next authenticator");
                            state.error_message.clear();
                            authenticator = next;
                            step = Step::GetHeadersAndCookies;
                        }
                        None => {
                            state.error_message =
                                messages::connection_failed_with_error(&linkify(first));
                            first_error = None;
                            if fallback {
                                remaining = self
                                    .authenticators
                                    .fallback_order()
                                    .into_iter()
                                    .skip(1)
                                    .collect();
                            }
                            authenticator = modern.clone();
                            step = Step::GetUsername;
                        }
                    }
                }
                other => return Err(other),
            }
        }
    }

    async fn initial_state(
        &self,
        request: CaptureRequest,
        cancel: &CancellationToken,
    ) -> HubResult<(CaptureState, Step)> {
        let mut state = CaptureState {
            url: request.initial_url.clone(),
            display_name: request.display_name,
            error_message: request.validation_message,
            server_id: request.server_id.unwrap_or_else(ServerRecord::new_id),
            ..Default::default()
        };
        let url = request.initial_url.trim();
        if url.is_empty() {
            return Ok((state, Step::GetUrl));
        }
        if !is_valid_url(url) {
            state.error_message = messages::INVALID_URL.to_string();
            return Ok((state, Step::GetUrl));
        }
        match self.api.get_jupyter_hub_base_url(url, cancel).await {
            Ok(base_url) => {
                state.base_url = base_url;
                state.url_was_prepopulated = true;
                let step = match request.reason {
                    CaptureReason::CaptureNewUrl => Step::GetUsername,
                    CaptureReason::CameHereFromBackButton => Step::GetUrl,
                };
                Ok((state, step))
            }
            Err(HubError::Cancelled) => Err(HubError::Cancelled),
            Err(e) => {
                debug!(url = %url, "[UrlCapture] Pre-filled URL is not a hub: {}", e);
                state.error_message = messages::INVALID_JUPYTER_HUB_URL.to_string();
                Ok((state, Step::GetUrl))
            }
        }
    }

    /// Drive the step machine from `step` until it commits, aborts or fails.
    pub async fn run_steps(
        &self,
        state: &mut CaptureState,
        mut step: Step,
        authenticator: &SharedAuthenticator,
        cancel: &CancellationToken,
    ) -> HubResult<Option<ServerDescriptor>> {
        if let Some(index) = state.steps_executed.iter().position(|s| *s == step) {
            state.steps_executed.truncate(index);
        }

        loop {
            let next = match step {
                Step::Before => return Ok(None),
                Step::After => {
                    return self
                        .commit(state, authenticator)
                        .await
                        .map(Some)
                }
                Step::GetUrl => self.get_url(state, cancel).await?,
                Step::GetUsername => self.get_username(state, cancel).await?,
                Step::GetPassword => self.get_password(state, cancel).await?,
                Step::GetHeadersAndCookies => {
                    self.get_headers_and_cookies(state, authenticator, cancel)
                        .await?
                }
                Step::VerifyConnection => {
                    self.verify_connection(state, authenticator, cancel)
                        .await?
                }
                Step::GetDisplayName => self.get_display_name(state, cancel).await?,
            };

            match next {
                Some(Step::Before) => return Ok(None),
                Some(next) => {
                    // Going to a step we already ran means going back to it
                    if let Some(index) = state.steps_executed.iter().position(|s| *s == next) {
                        state.steps_executed.truncate(index);
                    } else if step.can_navigate_back_to_this() {
                        state.steps_executed.push(step);
                    }
                    step = next;
                }
                None => match state.steps_executed.pop() {
                    Some(previous) => step = previous,
                    None => return Ok(None),
                },
            }
        }
    }

    /// Show an input box; cancellation wins even if the host ignores `cancel`.
    async fn ask(
        &self,
        request: InputRequest,
        cancel: &CancellationToken,
    ) -> HubResult<Option<String>> {
        race_cancellation(cancel, self.input.get_value(request, cancel)).await
    }

    async fn get_url(
        &self,
        state: &mut CaptureState,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        let mut request = InputRequest::new(messages::TITLE_OF_INPUT_BOX_TO_ENTER_URL)
            .placeholder(messages::PLACEHOLDER_OF_INPUT_BOX_TO_ENTER_URL)
            .value(state.url.clone())
            .validation_message(state.take_error_message());

        loop {
            let Some(value) = self.ask(request.clone(), cancel).await? else {
                return Ok(None);
            };
            let value = value.trim().to_string();
            let problem = if !is_valid_url(&value) {
                messages::INVALID_URL
            } else {
                match self.api.get_jupyter_hub_base_url(&value, cancel).await {
                    Ok(base_url) => {
                        state.url = value;
                        state.base_url = base_url;
                        break;
                    }
                    Err(HubError::Cancelled) => return Err(HubError::Cancelled),
                    Err(e) => {
                        error!(url = %value, "[UrlCapture] Failed to determine base url: {}", e);
                        messages::INVALID_JUPYTER_HUB_URL
                    }
                }
            };
            request = request.value(value).validation_message(problem);
        }

        if state.credentials.username.is_empty() {
            state.credentials.username = extract_user_name_from_url(&state.url).unwrap_or_default();
        }
        Ok(Some(Step::GetUsername))
    }

    async fn get_username(
        &self,
        state: &mut CaptureState,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        let value = if state.credentials.username.is_empty() {
            extract_user_name_from_url(&state.url).unwrap_or_default()
        } else {
            state.credentials.username.clone()
        };
        let request = InputRequest::new(messages::CAPTURE_USERNAME_TITLE)
            .placeholder(messages::CAPTURE_USERNAME_PROMPT)
            .value(value)
            .validation_message(state.take_error_message());

        let Some(username) = self
            .prompt_non_empty(request, messages::EMPTY_USERNAME, cancel)
            .await?
        else {
            return Ok(None);
        };
        state.credentials.username = username;
        Ok(Some(Step::GetPassword))
    }

    /// Browser-hosted clients cannot log in with a password (the hub sends
    /// no CORS headers), so they are asked for an API token instead.
    async fn get_password(
        &self,
        state: &mut CaptureState,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        let (title, placeholder, empty_message) = if self.transport.is_web() {
            (
                messages::CAPTURE_API_TOKEN_TITLE,
                messages::CAPTURE_API_TOKEN_PROMPT,
                messages::EMPTY_API_TOKEN,
            )
        } else {
            (
                messages::CAPTURE_PASSWORD_TITLE,
                messages::CAPTURE_PASSWORD_PROMPT,
                messages::EMPTY_PASSWORD,
            )
        };
        let request = InputRequest::new(title)
            .placeholder(placeholder)
            .password()
            .validation_message(state.take_error_message());

        let Some(password) = self
            .prompt_non_empty(request, empty_message, cancel)
            .await?
        else {
            return Ok(None);
        };
        state.credentials.password = password;
        Ok(Some(Step::GetHeadersAndCookies))
    }

    async fn get_headers_and_cookies(
        &self,
        state: &mut CaptureState,
        authenticator: &SharedAuthenticator,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        match authenticator
            .get_jupyter_auth_info(&state.base_url, &state.credentials, cancel)
            .await
        {
            Ok(result) => state.headers = result.headers,
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(HubError::AuthenticationNotSupported) => {
                return Err(HubError::AuthenticationNotSupported)
            }
            // Verified again (and prompted for) in the next step
            Err(e) if e.is_certificate_error() => {
                debug!(base_url = %state.base_url, "[UrlCapture] Deferring certificate error: {}", e);
            }
            Err(e) => {
                error!(
                    base_url = %state.base_url,
                    kind = authenticator.kind().as_str(),
                    "[UrlCapture] Failed to validate username and password: {}",
                    e
                );
                return Err(HubError::Authentication(e.to_string()));
            }
        }
        Ok(Some(Step::VerifyConnection))
    }

    async fn verify_connection(
        &self,
        state: &mut CaptureState,
        authenticator: &SharedAuthenticator,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        match self
            .validator
            .validate_jupyter_uri(
                &state.base_url,
                &state.credentials,
                authenticator.as_ref(),
                cancel,
            )
            .await
        {
            Ok(()) => Ok(Some(Step::GetDisplayName)),
            Err(HubError::Cancelled) => Err(HubError::Cancelled),
            Err(HubError::SelfSignedCertificate(_)) => {
                state.error_message = messages::SELF_CERT_FAIL_ERROR_MESSAGE_ONLY.to_string();
                Ok(Some(Step::GetUrl))
            }
            Err(HubError::ExpiredCertificate(_)) => {
                state.error_message = messages::SELF_CERT_EXPIRED_ERROR_MESSAGE_ONLY.to_string();
                Ok(Some(Step::GetUrl))
            }
            Err(e) => {
                error!(base_url = %state.base_url, "[UrlCapture] Uri verification error: {}", e);
                state.error_message = messages::USERNAME_PASSWORD_AUTH_FAILURE.to_string();
                Ok(Some(Step::GetUsername))
            }
        }
    }

    async fn get_display_name(
        &self,
        state: &mut CaptureState,
        cancel: &CancellationToken,
    ) -> HubResult<Option<Step>> {
        let used: Vec<String> = self
            .storage
            .all()
            .await
            .map_err(HubError::storage)?
            .into_iter()
            .map(|s| s.display_name)
            .collect();
        let value = if state.display_name.is_empty() {
            get_suggested_display_name(&state.url, &used)
        } else {
            state.display_name.clone()
        };

        let request = InputRequest::new(messages::RENAME_SERVER).value(value);
        match self.ask(request, cancel).await? {
            Some(name) if !name.trim().is_empty() => {
                state.display_name = name.trim().to_string();
                Ok(Some(Step::After))
            }
            _ => Ok(None),
        }
    }

    async fn commit(
        &self,
        state: &CaptureState,
        authenticator: &SharedAuthenticator,
    ) -> HubResult<ServerDescriptor> {
        let kind = authenticator.kind();
        let record = ServerRecord::new(
            state.server_id.clone(),
            state.base_url.clone(),
            state.display_name.clone(),
            kind,
        );
        let credentials = Credentials::new(
            state.credentials.username.clone(),
            state.credentials.password.clone(),
        );
        self.storage
            .add_server_or_update(&record, &credentials)
            .await
            .map_err(HubError::storage)?;

        info!(
            server_id = %record.id,
            kind = kind.as_str(),
            "[UrlCapture] Added server"
        );
        if let Some(events) = &self.events {
            events.emit(HubEvent::ServerAdded {
                server_id: record.id.clone(),
                display_name: record.display_name.clone(),
                auth_kind: kind,
            });
        }
        Ok(record.descriptor())
    }

    /// Prompt until the value is non-empty; `None` on back.
    async fn prompt_non_empty(
        &self,
        mut request: InputRequest,
        empty_message: &str,
        cancel: &CancellationToken,
    ) -> HubResult<Option<String>> {
        loop {
            match self.ask(request.clone(), cancel).await? {
                None => return Ok(None),
                Some(value) if !value.is_empty() => return Ok(Some(value)),
                Some(_) => request = request.validation_message(empty_message),
            }
        }
    }
}
