//! Server integration
//!
//! Binds storage, the capture workflow and the validator to the host's
//! server-provider contract: list servers, offer "connect" commands, run
//! the capture workflow, resolve a server into connection information and
//! remove servers.
//!
//! Resolution is memoised per server id. Concurrent calls share one
//! in-flight attempt; a failed attempt is evicted so the next call retries.

mod connection;
mod dependencies;

pub use connection::{ConnectionInformation, ResolvedServer, UrlRewrite};
pub use dependencies::IntegrationDependencies;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::Authenticators;
use crate::capture::{CaptureReason, CaptureRequest, UrlCaptureWorkflow};
use crate::config::ConnectConfig;
use crate::http::SharedFetch;
use crate::hub::{is_http_url, HubApiClient, HubAuth};
use crate::messages;
use crate::validator::{ConnectionValidator, RestKernelSpecClient};
use hublink_core::{
    EventSender, HubError, HubEvent, HubResult, ServerDescriptor, ServerStorage,
};

type ResolveFuture = Shared<BoxFuture<'static, HubResult<ResolvedServer>>>;

/// Entry offered in the host's server picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub label: String,
    /// URL typed by the user, when the command connects to it directly
    pub url: Option<String>,
    pub can_be_auto_selected: bool,
}

/// URL typed into the picker and what capturing it produced
#[derive(Debug, Default)]
struct PreviousEntry {
    url: Option<String>,
    server: Option<ServerDescriptor>,
}

struct Inner {
    api: Arc<HubApiClient>,
    fetch: SharedFetch,
    storage: Arc<dyn ServerStorage>,
    authenticators: Authenticators,
    validator: Arc<ConnectionValidator>,
    capture: Arc<UrlCaptureWorkflow>,
    events: EventSender,
    resolutions: Mutex<HashMap<String, (u64, ResolveFuture)>>,
    next_generation: AtomicU64,
    previous: Mutex<PreviousEntry>,
}

#[derive(Clone)]
pub struct ServerIntegration {
    inner: Arc<Inner>,
}

impl ServerIntegration {
    /// Wire the production collaborators: one REST client, the standard
    /// authenticators and a REST kernel-spec probe.
    pub fn new(config: &ConnectConfig, deps: IntegrationDependencies) -> Self {
        let api = Arc::new(HubApiClient::new(deps.fetch.clone()));
        let authenticators = Authenticators::standard(api.clone(), config);
        let kernel_specs = Arc::new(RestKernelSpecClient::new(deps.fetch.clone()));
        let validator = Arc::new(
            ConnectionValidator::new(api.clone(), kernel_specs, deps.settings.clone(), config)
                .with_prompt(deps.prompt.clone())
                .with_events(deps.events.clone()),
        );
        let capture = Arc::new(
            UrlCaptureWorkflow::new(
                api.clone(),
                authenticators.clone(),
                validator.clone(),
                deps.storage.clone(),
                deps.input.clone(),
                config.transport,
            )
            .with_events(deps.events.clone()),
        );
        Self::from_parts(api, deps, authenticators, validator, capture)
    }

    /// Assemble from pre-built parts (custom authenticators or validator)
    pub fn from_parts(
        api: Arc<HubApiClient>,
        deps: IntegrationDependencies,
        authenticators: Authenticators,
        validator: Arc<ConnectionValidator>,
        capture: Arc<UrlCaptureWorkflow>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                fetch: deps.fetch,
                storage: deps.storage,
                authenticators,
                validator,
                capture,
                events: deps.events,
                resolutions: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                previous: Mutex::new(PreviousEntry::default()),
            }),
        }
    }

    pub fn api(&self) -> &Arc<HubApiClient> {
        &self.inner.api
    }

    pub fn capture_workflow(&self) -> &Arc<UrlCaptureWorkflow> {
        &self.inner.capture
    }

    pub async fn provide_jupyter_servers(&self) -> HubResult<Vec<ServerDescriptor>> {
        let servers = self.inner.storage.all().await.map_err(HubError::storage)?;
        Ok(servers.iter().map(|s| s.descriptor()).collect())
    }

    /// Commands for what the user typed into the picker
    pub fn provide_commands(&self, value: &str) -> Vec<ServerCommand> {
        let mut previous = self.inner.previous.lock();
        *previous = PreviousEntry::default();

        let value = value.trim();
        if is_http_url(value) {
            previous.url = Some(value.to_string());
            return vec![ServerCommand {
                label: messages::connect_to_server(value),
                url: Some(value.to_string()),
                can_be_auto_selected: false,
            }];
        }
        vec![ServerCommand {
            label: messages::LABEL_OF_COMMAND_TO_ENTER_URL.to_string(),
            url: None,
            can_be_auto_selected: true,
        }]
    }

    /// Run the capture workflow for a picker command.
    ///
    /// Handling the same URL again right after a capture means the user came
    /// back with the back button: the workflow re-opens at the URL step and
    /// updates the server it just added.
    pub async fn handle_command(
        &self,
        command: &ServerCommand,
        cancel: &CancellationToken,
    ) -> HubResult<Option<ServerDescriptor>> {
        let mut request = CaptureRequest::with_url(command.url.clone().unwrap_or_default());
        {
            let previous = self.inner.previous.lock();
            if let (Some(url), Some(prev_url), Some(server)) =
                (&command.url, &previous.url, &previous.server)
            {
                if url == prev_url {
                    request.reason = CaptureReason::CameHereFromBackButton;
                    request.server_id = Some(server.id.clone());
                    request.display_name = server.label.clone();
                }
            }
        }

        match self.inner.capture.capture(request, cancel).await {
            Ok(Some(server)) => {
                self.inner.resolutions.lock().remove(&server.id);
                self.inner.previous.lock().server = Some(server.clone());
                self.inner.events.emit(HubEvent::ServersChanged);
                Ok(Some(server))
            }
            Ok(None) => {
                *self.inner.previous.lock() = PreviousEntry::default();
                Ok(None)
            }
            Err(e) => {
                if !e.is_cancellation() {
                    error!("[Integration] Failed to select a server: {}", e);
                }
                *self.inner.previous.lock() = PreviousEntry::default();
                Err(e)
            }
        }
    }

    /// Connection information for a stored server.
    ///
    /// Concurrent calls for the same id share one attempt, which runs under
    /// the first caller's cancellation token.
    pub async fn resolve_jupyter_server(
        &self,
        server_id: &str,
        cancel: &CancellationToken,
    ) -> HubResult<ResolvedServer> {
        let (generation, resolution) = {
            let mut resolutions = self.inner.resolutions.lock();
            match resolutions.get(server_id) {
                Some((generation, resolution)) => (*generation, resolution.clone()),
                None => {
                    let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
                    let inner = self.inner.clone();
                    let id = server_id.to_string();
                    let cancel = cancel.clone();
                    let resolution = async move { inner.resolve(&id, &cancel).await }
                        .boxed()
                        .shared();
                    resolutions.insert(server_id.to_string(), (generation, resolution.clone()));
                    (generation, resolution)
                }
            }
        };

        let result = resolution.await;
        if let Err(e) = &result {
            let mut resolutions = self.inner.resolutions.lock();
            if resolutions.get(server_id).map(|(g, _)| *g) == Some(generation) {
                resolutions.remove(server_id);
                error!(server_id = %server_id, "[Integration] Failed to resolve server: {}", e);
            }
        }
        result
    }

    /// Revoke the server's stored token (best effort), remove it, and
    /// announce the change whatever happened.
    pub async fn remove_jupyter_server(&self, server_id: &str) {
        self.inner.resolutions.lock().remove(server_id);
        match self.inner.remove(server_id).await {
            Ok(()) => {
                info!(server_id = %server_id, "[Integration] Removed server");
                self.inner.events.emit(HubEvent::ServerRemoved {
                    server_id: server_id.to_string(),
                });
            }
            Err(e) => debug!(server_id = %server_id, "[Integration] Failed to remove server: {}", e),
        }
        self.inner.events.emit(HubEvent::ServersChanged);
    }

    /// Log out and revoke whatever the authenticators opened or minted
    pub async fn shutdown(&self) {
        self.inner.resolutions.lock().clear();
        self.inner.authenticators.shutdown().await;
        info!("[Integration] Shut down");
    }
}

impl Inner {
    async fn resolve(&self, server_id: &str, cancel: &CancellationToken) -> HubResult<ResolvedServer> {
        let server = self
            .storage
            .get(server_id)
            .await
            .map_err(HubError::storage)?
            .ok_or_else(|| HubError::ServerNotFound(server_id.to_string()))?;
        let mut credentials = self
            .storage
            .get_credentials(server_id)
            .await
            .map_err(HubError::storage)?
            .ok_or_else(|| HubError::ServerNotFound(server_id.to_string()))?;

        let authenticator = self.authenticators.for_kind(server.auth_kind());
        let auth = authenticator
            .get_jupyter_auth_info(&server.base_url, &credentials, cancel)
            .await?;

        if let Some(token) = &auth.token {
            if credentials.needs_token_update(token) {
                let updated = credentials.clone().with_token(token);
                match self.storage.add_server_or_update(&server, &updated).await {
                    Ok(()) => {
                        info!(server_id = %server_id, "[Integration] Stored rotated API token");
                        credentials = updated;
                    }
                    Err(e) => error!(
                        server_id = %server_id,
                        "[Integration] Failed to update server with the latest token: {}",
                        e
                    ),
                }
            }
        }

        // The token just obtained lets validation skip another mint
        let session = match &auth.token {
            Some(token) => credentials.clone().with_token(token),
            None => credentials.clone(),
        };
        match self
            .validator
            .validate_jupyter_uri(&server.base_url, &session, authenticator.as_ref(), cancel)
            .await
        {
            Ok(()) => {}
            Err(HubError::Cancelled) => return Err(HubError::Cancelled),
            Err(e) => warn!(server_id = %server_id, "[Integration] Server validation failed: {}", e),
        }

        let raw_url = self
            .api
            .get_user_jupyter_url(
                &server.base_url,
                &credentials.username,
                server.server_name.as_deref(),
                HubAuth::Headers(&auth.headers),
                cancel,
            )
            .await?;

        debug!(server_id = %server_id, "[Integration] Resolved server");
        Ok(ResolvedServer {
            server: server.descriptor(),
            connection: ConnectionInformation::new(
                &raw_url,
                auth.token.map(|t| t.token),
                auth.headers,
                self.fetch.clone(),
            ),
        })
    }

    async fn remove(&self, server_id: &str) -> HubResult<()> {
        let server = self.storage.get(server_id).await.map_err(HubError::storage)?;
        let credentials = match self.storage.get_credentials(server_id).await {
            Ok(credentials) => credentials,
            Err(e) => {
                debug!(server_id = %server_id, "[Integration] No credentials to revoke: {}", e);
                None
            }
        };

        if let (Some(server), Some(credentials)) = (&server, &credentials) {
            if let Some(token) = credentials.revocable_token() {
                let cancel = CancellationToken::new();
                if let Err(e) = self
                    .api
                    .delete_api_token(
                        &server.base_url,
                        &credentials.username,
                        &token.id,
                        HubAuth::Token(&token.token),
                        &cancel,
                    )
                    .await
                {
                    debug!(server_id = %server_id, "[Integration] Failed to delete token: {}", e);
                }
            }
        }

        self.storage
            .remove_server(server_id)
            .await
            .map_err(HubError::storage)
    }
}
