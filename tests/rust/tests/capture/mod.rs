//! URL capture workflow tests
//!
//! A scripted user walks the workflow against a mock hub; assertions look
//! at the input boxes shown, what got stored and the events emitted.

use hublink_connect::messages;
use hublink_connect::{get_suggested_display_name, CaptureRequest};
use hublink_core::{AuthProviderKind, Credentials, HubError, HubEvent, ServerStorage};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tests::async_helpers::{with_timeout, DEFAULT_TIMEOUT};
use tests::{hub, Answer, FakeKernelSpecs, Harness, ScriptedInput};
use tokio_util::sync::CancellationToken;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_display_name_suggestions() {
    assert_eq!(
        get_suggested_display_name("https://hub.example.com/user/joe/lab", &[]),
        "hub.example.com"
    );
    assert_eq!(
        get_suggested_display_name("https://hub.example.com", &names(&["hub.example.com"])),
        "hub.example.com 1"
    );
    assert_eq!(get_suggested_display_name("http://10.0.0.5:8000", &[]), "JupyterHub");
    assert_eq!(get_suggested_display_name("not a url", &[]), "JupyterHub");
}

#[tokio::test]
async fn test_full_capture_stores_server() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(
        ScriptedInput::typing(&["joe", "pwd", "My Hub"]),
        FakeKernelSpecs::available(),
    );
    let mut events = h.events();

    let descriptor = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(descriptor.label, "My Hub");
    assert_eq!(
        h.input.titles(),
        vec![
            messages::CAPTURE_USERNAME_TITLE,
            messages::CAPTURE_PASSWORD_TITLE,
            messages::RENAME_SERVER,
        ]
    );
    let requests = h.input.requests();
    assert!(requests[1].password);
    // IP hosts get the generic label
    assert_eq!(requests[2].value, "JupyterHub");

    let stored = h.storage.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, descriptor.id);
    assert_eq!(stored[0].base_url, server.uri());
    assert_eq!(stored[0].auth_provider_kind, Some(AuthProviderKind::Modern));
    // Only what the user typed is persisted at capture time
    assert_eq!(
        h.storage.credentials_for(&descriptor.id),
        Some(Credentials::new("joe", "pwd"))
    );

    assert_eq!(
        events.drain(),
        vec![HubEvent::ServerAdded {
            server_id: descriptor.id.clone(),
            display_name: "My Hub".into(),
            auth_kind: AuthProviderKind::Modern,
        }]
    );
}

/// A hub that only mints tokens for a form-login session
async fn session_only_hub() -> MockServer {
    let server = MockServer::start().await;
    hub::mount_root(&server).await;
    hub::reject_password_as_token(&server).await;
    hub::mount_user(&server, "joe", true).await;
    Mock::given(method("POST"))
        .and(path("/hub/login"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", "/hub/home")
                .insert_header("Set-Cookie", "jupyterhub-hub-login=h1; Path=/hub/"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hub/home"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hub/api/users/joe/tokens"))
        .and(header("Cookie", "jupyterhub-hub-login=h1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token": "legacy", "id": "l1" })),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    // Minting with the password in the body is refused
    Mock::given(method("POST"))
        .and(path("/hub/api/users/joe/tokens"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hub/api/users/joe/server"))
        .respond_with(ResponseTemplate::new(400).set_body_string("already running"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_legacy_strategy_takes_over_with_same_credentials() {
    let server = session_only_hub().await;
    let h = Harness::new(
        ScriptedInput::typing(&["joe", "pwd", "Legacy Hub"]),
        FakeKernelSpecs::available(),
    );
    let mut events = h.events();

    let descriptor = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();

    // No second round of prompts when the first strategy fails
    assert_eq!(
        h.input.titles(),
        vec![
            messages::CAPTURE_USERNAME_TITLE,
            messages::CAPTURE_PASSWORD_TITLE,
            messages::RENAME_SERVER,
        ]
    );
    assert!(h.input.requests().iter().all(|r| r.validation_message.is_empty()));

    let stored = h.storage.all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].auth_provider_kind, Some(AuthProviderKind::Legacy));
    assert_eq!(
        events.drain(),
        vec![HubEvent::ServerAdded {
            server_id: descriptor.id.clone(),
            display_name: "Legacy Hub".into(),
            auth_kind: AuthProviderKind::Legacy,
        }]
    );
}

#[tokio::test]
async fn test_username_is_taken_from_url() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(ScriptedInput::new([Answer::Dismiss]), FakeKernelSpecs::available());

    let err = h
        .integration
        .capture_workflow()
        .capture(
            CaptureRequest::with_url(format!("{}/user/joe/lab", server.uri())),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(requests[0].title, messages::CAPTURE_USERNAME_TITLE);
    assert_eq!(requests[0].value, "joe");
}

#[tokio::test]
async fn test_cancel_closes_input_box_that_ignores_token() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    for script in [
        vec![Answer::Hang],
        vec![Answer::Type("joe".into()), Answer::Hang],
        vec![
            Answer::Type("joe".into()),
            Answer::Type("pwd".into()),
            Answer::Hang,
        ],
    ] {
        let steps = script.len();
        let h = Harness::new(ScriptedInput::new(script), FakeKernelSpecs::available());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let input = h.input.clone();
        // Cancel once the hanging box is showing
        tokio::spawn(async move {
            while input.requests().len() < steps {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            trigger.cancel();
        });

        let err = with_timeout(
            DEFAULT_TIMEOUT,
            h.integration
                .capture_workflow()
                .capture(CaptureRequest::with_url(server.uri()), &cancel),
        )
        .await
        .unwrap_err();

        assert_eq!(err, HubError::Cancelled);
        assert_eq!(h.input.requests().len(), steps);
        assert!(h.storage.all().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_back_from_first_step_ends_capture() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(ScriptedInput::new([Answer::Back]), FakeKernelSpecs::available());

    let outcome = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome, None);
    assert!(h.storage.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_back_from_password_returns_to_username() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(
        ScriptedInput::new([Answer::Type("joe".into()), Answer::Back, Answer::Dismiss]),
        FakeKernelSpecs::available(),
    );

    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(
        h.input.titles(),
        vec![
            messages::CAPTURE_USERNAME_TITLE,
            messages::CAPTURE_PASSWORD_TITLE,
            messages::CAPTURE_USERNAME_TITLE,
        ]
    );
    assert_eq!(requests[2].value, "joe");
}

#[tokio::test]
async fn test_empty_username_is_rejected() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(
        ScriptedInput::new([
            Answer::Type(String::new()),
            Answer::Type("joe".into()),
            Answer::Dismiss,
        ]),
        FakeKernelSpecs::available(),
    );

    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(requests[0].validation_message, "");
    assert_eq!(requests[1].title, messages::CAPTURE_USERNAME_TITLE);
    assert_eq!(requests[1].validation_message, messages::EMPTY_USERNAME);
    assert_eq!(requests[2].title, messages::CAPTURE_PASSWORD_TITLE);
}

#[tokio::test]
async fn test_invalid_url_is_rejected_in_place() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(
        ScriptedInput::new([
            Answer::Type("not a url".into()),
            Answer::Type(server.uri()),
            Answer::Dismiss,
        ]),
        FakeKernelSpecs::available(),
    );

    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::new(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(requests[0].title, messages::TITLE_OF_INPUT_BOX_TO_ENTER_URL);
    assert_eq!(requests[1].title, messages::TITLE_OF_INPUT_BOX_TO_ENTER_URL);
    assert_eq!(requests[1].value, "not a url");
    assert_eq!(requests[1].validation_message, messages::INVALID_URL);
    assert_eq!(requests[2].title, messages::CAPTURE_USERNAME_TITLE);
}

#[tokio::test]
async fn test_prefilled_url_that_is_not_a_hub() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let h = Harness::new(ScriptedInput::new([Answer::Dismiss]), FakeKernelSpecs::available());

    let url = format!("{}/some/page", server.uri());
    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(url.clone()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(requests[0].title, messages::TITLE_OF_INPUT_BOX_TO_ENTER_URL);
    assert_eq!(requests[0].value, url);
    assert_eq!(requests[0].validation_message, messages::INVALID_JUPYTER_HUB_URL);
}

#[tokio::test]
async fn test_rejected_credentials_send_user_back_to_username() {
    let server = MockServer::start().await;
    hub::mount_root(&server).await;
    hub::reject_password_as_token(&server).await;
    // Token routes and the login form all refuse
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let h = Harness::new(
        ScriptedInput::new([
            Answer::Type("joe".into()),
            Answer::Type("wrong".into()),
            Answer::Dismiss,
        ]),
        FakeKernelSpecs::available(),
    );

    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    let requests = h.input.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].title, messages::CAPTURE_USERNAME_TITLE);
    assert_eq!(requests[2].value, "joe");
    assert!(requests[2]
        .validation_message
        .starts_with("Connection failure. Verify the server is running and reachable."));
    assert!(requests[2].validation_message.contains("403"));
    assert!(h.storage.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_display_name_goes_back() {
    let server = hub::running_hub("joe", "minted", "t1").await;
    let h = Harness::new(
        ScriptedInput::new([
            Answer::Type("joe".into()),
            Answer::Type("pwd".into()),
            Answer::Type("   ".into()),
            Answer::Dismiss,
        ]),
        FakeKernelSpecs::available(),
    );

    let err = h
        .integration
        .capture_workflow()
        .capture(CaptureRequest::with_url(server.uri()), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, HubError::Cancelled);
    // Back from the display name lands on the last step the user can revisit
    assert_eq!(h.input.titles()[3], messages::CAPTURE_PASSWORD_TITLE);
    assert!(h.storage.all().await.unwrap().is_empty());
}
