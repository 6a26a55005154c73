//! Connection validator tests: server start, kernel-spec polling and
//! certificate prompts, driven by a mock hub and a scripted kernel-spec
//! client.

use std::sync::Arc;

use hublink_connect::{
    ConnectConfig, ConnectionValidator, HubApiClient, KernelSpecClient, ModernAuthenticator,
    ReqwestFetch, SharedFetch,
};
use hublink_core::{
    keys, CertificateProblem, Credentials, EventBus, HubError, HubEvent, HubSettingsService,
};
use pretty_assertions::assert_eq;
use tests::{
    fast_config, hub, init_tracing, FakeKernelSpecs, MockSettingsRepository,
    RecordingCertificatePrompt, SpecsOutcome,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    validator: ConnectionValidator,
    auth: ModernAuthenticator,
    specs: Arc<FakeKernelSpecs>,
    prompt: Arc<RecordingCertificatePrompt>,
    settings_repo: Arc<MockSettingsRepository>,
    bus: EventBus,
}

fn fixture(config: ConnectConfig, specs: FakeKernelSpecs, prompt: RecordingCertificatePrompt) -> Fixture {
    init_tracing();
    let settings_repo = Arc::new(MockSettingsRepository::new());
    let settings = Arc::new(HubSettingsService::new(settings_repo.clone()));
    let fetch: SharedFetch = Arc::new(ReqwestFetch::new(&config, settings.clone()).unwrap());
    let api = Arc::new(HubApiClient::new(fetch));
    let specs = Arc::new(specs);
    let prompt = Arc::new(prompt);
    let bus = EventBus::new();

    let kernel_specs: Arc<dyn KernelSpecClient> = specs.clone();
    let validator = ConnectionValidator::new(api.clone(), kernel_specs, settings, &config)
        .with_prompt(prompt.clone())
        .with_events(bus.sender());
    let auth = ModernAuthenticator::new(api, &config);

    Fixture {
        validator,
        auth,
        specs,
        prompt,
        settings_repo,
        bus,
    }
}

#[tokio::test]
async fn test_running_server_validates_without_start() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    Mock::given(method("POST"))
        .and(path("/hub/api/users/joe/server"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let f = fixture(fast_config(), FakeKernelSpecs::available(), RecordingCertificatePrompt::denying());
    f.validator
        .validate_jupyter_uri(
            &server.uri(),
            &Credentials::new("joe", "pwd"),
            &f.auth,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let seen = f.specs.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].base_url, format!("{}/user/joe/", server.uri()));
    assert_eq!(seen[0].token, "minted");
    assert!(seen[0].append_token);
    assert!(!seen[0].allow_unauthorized);
}

#[tokio::test]
async fn test_stopped_server_is_started_and_polled() {
    let server = MockServer::start().await;
    hub::reject_password_as_token(&server).await;
    hub::token_mint("joe", "minted", "t1").mount(&server).await;
    // First lookup sees no server, every later one a running server
    Mock::given(method("GET"))
        .and(path("/hub/api/users/joe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hub::user_model("joe", false)))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    hub::mount_user(&server, "joe", true).await;
    Mock::given(method("POST"))
        .and(path("/hub/api/users/joe/server"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    // The fresh server needs one more poll before listing kernels
    let specs = FakeKernelSpecs::new([SpecsOutcome::Unavailable, SpecsOutcome::Available]);
    let f = fixture(fast_config(), specs, RecordingCertificatePrompt::denying());
    f.validator
        .validate_jupyter_uri(
            &server.uri(),
            &Credentials::new("joe", "pwd"),
            &f.auth,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(f.specs.calls(), 2);
}

#[tokio::test]
async fn test_running_server_without_kernels_fails() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let f = fixture(
        fast_config(),
        FakeKernelSpecs::new([SpecsOutcome::Unavailable]),
        RecordingCertificatePrompt::denying(),
    );

    let err = f
        .validator
        .validate_jupyter_uri(
            &server.uri(),
            &Credentials::new("joe", "pwd"),
            &f.auth,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, HubError::KernelSpecEnumerationFailed);
    // Already running: no warm-up retries
    assert_eq!(f.specs.calls(), 1);
}

#[tokio::test]
async fn test_accepted_certificate_is_persisted_and_announced() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let specs = FakeKernelSpecs::new([
        SpecsOutcome::Fail(HubError::SelfSignedCertificate(
            "self signed certificate in certificate chain".into(),
        )),
        SpecsOutcome::Available,
    ]);
    let f = fixture(fast_config(), specs, RecordingCertificatePrompt::allowing());
    let mut events = f.bus.subscribe();

    f.validator
        .validate_jupyter_uri(
            &server.uri(),
            &Credentials::new("joe", "pwd"),
            &f.auth,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let calls = f.prompt.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, CertificateProblem::SelfSigned);
    assert_eq!(
        f.settings_repo.value(keys::connection::ALLOW_UNAUTHORIZED),
        Some("true".to_string())
    );
    assert_eq!(
        events.drain(),
        vec![HubEvent::CertificateProblemSolved {
            problem: CertificateProblem::SelfSigned,
            allowed: true,
        }]
    );
    assert_eq!(f.specs.calls(), 2);
}

#[tokio::test]
async fn test_declined_certificate_propagates_error() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let expired = HubError::ExpiredCertificate("certificate has expired".into());
    let f = fixture(
        fast_config(),
        FakeKernelSpecs::new([SpecsOutcome::Fail(expired.clone())]),
        RecordingCertificatePrompt::denying(),
    );
    let mut events = f.bus.subscribe();

    let err = f
        .validator
        .validate_jupyter_uri(
            &server.uri(),
            &Credentials::new("joe", "pwd"),
            &f.auth,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, expired);
    assert_eq!(f.prompt.calls().len(), 1);
    assert_eq!(f.settings_repo.value(keys::connection::ALLOW_UNAUTHORIZED), None);
    assert_eq!(
        events.drain(),
        vec![HubEvent::CertificateProblemSolved {
            problem: CertificateProblem::Expired,
            allowed: false,
        }]
    );
}

#[tokio::test]
async fn test_cancellation_skips_certificate_prompt() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let cancel = CancellationToken::new();
    let f = fixture(
        fast_config(),
        FakeKernelSpecs::new([SpecsOutcome::CancelDuringRequest(cancel.clone())]),
        RecordingCertificatePrompt::allowing(),
    );

    let err = f
        .validator
        .validate_jupyter_uri(&server.uri(), &Credentials::new("joe", "pwd"), &f.auth, &cancel)
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    assert!(f.prompt.calls().is_empty());
}
