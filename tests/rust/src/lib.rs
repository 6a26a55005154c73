//! Shared test utilities and fixtures for Hublink integration tests.

use std::sync::Arc;
use std::time::Duration;

use hublink_connect::{
    Authenticators, ConnectConfig, ConnectionValidator, HubApiClient, IntegrationDependencies,
    KernelSpecClient, ReqwestFetch, ServerIntegration, SharedFetch, UrlCaptureWorkflow,
};
use hublink_core::{EventBus, EventReceiver, HubSettingsService, ServerStorage};

/// Mock collaborator implementations
pub mod mocks;
pub use mocks::{
    Answer, FakeKernelSpecs, MockServerStorage, MockSettingsRepository,
    python_kernel_specs, RecordingCertificatePrompt, ScriptedInput, SpecsOutcome,
};

/// Install a fmt subscriber honouring `RUST_LOG`; safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with short polling so start/readiness loops finish quickly
pub fn fast_config() -> ConnectConfig {
    ConnectConfig::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_server_start_timeout(Duration::from_millis(300))
}

/// Mock JupyterHub routes (wiremock)
pub mod hub {
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub const HUB_VERSION: &str = "4.1.5";

    /// User model as the hub returns it
    pub fn user_model(name: &str, running: bool) -> Value {
        if running {
            json!({
                "name": name,
                "admin": false,
                "server": format!("/user/{}/", name),
                "pending": null,
                "servers": { "": { "name": "", "ready": true, "url": format!("/user/{}/", name) } }
            })
        } else {
            json!({ "name": name, "admin": false, "server": null, "pending": null, "servers": {} })
        }
    }

    /// `GET /hub/api` answering with a version, so the server counts as a hub root
    pub async fn mount_root(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/hub/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": HUB_VERSION })))
            .mount(server)
            .await;
    }

    /// `GET /hub/api/users/{name}` for any credentials
    pub async fn mount_user(server: &MockServer, name: &str, running: bool) {
        Mock::given(method("GET"))
            .and(path(format!("/hub/api/users/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_model(name, running)))
            .mount(server)
            .await;
    }

    /// `GET /hub/api/user` rejecting the password as a token
    pub async fn reject_password_as_token(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/hub/api/user"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
            .mount(server)
            .await;
    }

    /// `POST /hub/api/users/{name}/tokens` minting `token`
    pub fn token_mint(name: &str, token: &str, id: &str) -> Mock {
        Mock::given(method("POST"))
            .and(path(format!("/hub/api/users/{}/tokens", name)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": token,
                "id": id,
                "note": "Requested by hublink"
            })))
    }

    /// A hub with a running server for `name` that mints `token` for passwords
    pub async fn running_hub(name: &str, token: &str, id: &str) -> MockServer {
        let server = MockServer::start().await;
        mount_root(&server).await;
        reject_password_as_token(&server).await;
        mount_user(&server, name, true).await;
        token_mint(name, token, id).mount(&server).await;
        server
    }
}

/// A `ServerIntegration` wired to a mock hub, in-memory storage and a
/// scripted user.
pub struct Harness {
    pub config: ConnectConfig,
    pub storage: Arc<MockServerStorage>,
    pub settings_repo: Arc<MockSettingsRepository>,
    pub settings: Arc<HubSettingsService>,
    pub input: Arc<ScriptedInput>,
    pub prompt: Arc<RecordingCertificatePrompt>,
    pub kernel_specs: Arc<FakeKernelSpecs>,
    pub bus: EventBus,
    pub integration: ServerIntegration,
}

impl Harness {
    pub fn new(input: ScriptedInput, kernel_specs: FakeKernelSpecs) -> Self {
        Self::build(
            fast_config(),
            Arc::new(MockServerStorage::new()),
            input,
            RecordingCertificatePrompt::denying(),
            kernel_specs,
        )
    }

    pub fn build(
        config: ConnectConfig,
        storage: Arc<MockServerStorage>,
        input: ScriptedInput,
        prompt: RecordingCertificatePrompt,
        kernel_specs: FakeKernelSpecs,
    ) -> Self {
        init_tracing();
        let settings_repo = Arc::new(MockSettingsRepository::new());
        let settings = Arc::new(HubSettingsService::new(settings_repo.clone()));
        let input = Arc::new(input);
        let prompt = Arc::new(prompt);
        let kernel_specs = Arc::new(kernel_specs);
        let bus = EventBus::new();

        let fetch: SharedFetch = Arc::new(
            ReqwestFetch::new(&config, settings.clone()).expect("Failed to build HTTP client"),
        );
        let deps = IntegrationDependencies::new(
            fetch.clone(),
            storage.clone(),
            settings.clone(),
            input.clone(),
            bus.sender(),
        )
        .with_prompt(prompt.clone());

        let api = Arc::new(HubApiClient::new(fetch));
        let authenticators = Authenticators::standard(api.clone(), &config);
        let specs: Arc<dyn KernelSpecClient> = kernel_specs.clone();
        let validator = Arc::new(
            ConnectionValidator::new(api.clone(), specs, settings.clone(), &config)
                .with_prompt(prompt.clone())
                .with_events(bus.sender()),
        );
        let server_storage: Arc<dyn ServerStorage> = storage.clone();
        let capture = Arc::new(
            UrlCaptureWorkflow::new(
                api.clone(),
                authenticators.clone(),
                validator.clone(),
                server_storage,
                input.clone(),
                config.transport,
            )
            .with_events(bus.sender()),
        );
        let integration =
            ServerIntegration::from_parts(api, deps, authenticators, validator, capture);

        Self {
            config,
            storage,
            settings_repo,
            settings,
            input,
            prompt,
            kernel_specs,
            bus,
            integration,
        }
    }

    pub fn events(&self) -> EventReceiver {
        self.bus.subscribe()
    }
}

/// Async test helpers
pub mod async_helpers {
    use std::time::Duration;
    use tokio::time::timeout;

    /// Run an async operation with a timeout
    pub async fn with_timeout<F, T>(duration: Duration, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        timeout(duration, f).await.expect("Operation timed out")
    }

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
}
