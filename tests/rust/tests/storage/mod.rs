//! SQLite-backed storage wired into the production integration
//!
//! Uses a temp database file and an in-memory master key; the hub and the
//! user's notebook server are mocked.

use std::path::Path;
use std::sync::Arc;

use hublink_connect::{IntegrationDependencies, ServerIntegration};
use hublink_core::{
    keys, ApiToken, AuthProviderKind, Credentials, EventBus, HubSettingsService, ServerStorage,
    SettingsRepository,
};
use hublink_storage::{
    open_encrypted, MemoryKeyProvider, SqliteServerStorage, SqliteSettingsRepository,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use tests::{fast_config, hub, init_tracing, python_kernel_specs, ScriptedInput};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Stores {
    servers: Arc<SqliteServerStorage>,
    settings: Arc<SqliteSettingsRepository>,
}

fn open_stores(path: &Path, master_key: &MemoryKeyProvider) -> Stores {
    let (db, encryptor) = open_encrypted(path, master_key).unwrap();
    Stores {
        servers: Arc::new(SqliteServerStorage::new(db.clone(), encryptor)),
        settings: Arc::new(SqliteSettingsRepository::new(db)),
    }
}

fn wire_integration(stores: &Stores, input: ScriptedInput) -> ServerIntegration {
    init_tracing();
    let config = fast_config();
    let settings = Arc::new(HubSettingsService::new(stores.settings.clone()));
    let deps = IntegrationDependencies::with_reqwest(
        &config,
        stores.servers.clone(),
        settings,
        Arc::new(input),
        EventBus::new().sender(),
    )
    .unwrap();
    ServerIntegration::new(&config, deps)
}

/// Hub plus a running notebook server that lists kernels
async fn notebook_hub() -> MockServer {
    let server = hub::running_hub("joe", "minted", "t1").await;
    Mock::given(method("GET"))
        .and(path("/user/joe/api/kernelspecs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(python_kernel_specs())))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_captured_server_survives_restart() {
    let server = notebook_hub().await;
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("hublink.db");
    let master_key = MemoryKeyProvider::new();
    let cancel = CancellationToken::new();

    let server_id = {
        let stores = open_stores(&db_path, &master_key);
        let integration = wire_integration(&stores, ScriptedInput::typing(&["joe", "pwd", "Team Hub"]));
        let command = integration.provide_commands(&server.uri()).remove(0);
        let descriptor = integration
            .handle_command(&command, &cancel)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(descriptor.label, "Team Hub");
        descriptor.id
    };

    // A new process: same file, same key
    let stores = open_stores(&db_path, &master_key);
    let record = stores.servers.get(&server_id).await.unwrap().unwrap();
    assert_eq!(record.base_url, server.uri());
    assert_eq!(record.auth_kind(), AuthProviderKind::Modern);
    assert_eq!(
        stores.servers.get_credentials(&server_id).await.unwrap(),
        Some(Credentials::new("joe", "pwd"))
    );

    let integration = wire_integration(&stores, ScriptedInput::default());
    let resolved = integration
        .resolve_jupyter_server(&server_id, &cancel)
        .await
        .unwrap();
    assert_eq!(resolved.connection.base_url, format!("{}/user/joe/", server.uri()));
    assert_eq!(
        stores.servers.get_credentials(&server_id).await.unwrap(),
        Some(Credentials::new("joe", "pwd").with_token(&ApiToken::new("minted", "t1")))
    );
}

#[tokio::test]
async fn test_remove_deletes_rows() {
    let server = notebook_hub().await;
    Mock::given(method("DELETE"))
        .and(path("/hub/api/users/joe/tokens/t1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let master_key = MemoryKeyProvider::new();
    let stores = open_stores(&dir.path().join("hublink.db"), &master_key);
    let record = hublink_core::ServerRecord::new("s1", server.uri(), "Hub", AuthProviderKind::Modern);
    stores
        .servers
        .add_server_or_update(
            &record,
            &Credentials::new("joe", "pwd").with_token(&ApiToken::new("minted", "t1")),
        )
        .await
        .unwrap();

    let integration = wire_integration(&stores, ScriptedInput::default());
    integration.remove_jupyter_server("s1").await;

    assert!(integration.provide_jupyter_servers().await.unwrap().is_empty());
    assert_eq!(stores.servers.get_credentials("s1").await.unwrap(), None);
}

#[tokio::test]
async fn test_allow_unauthorized_setting_persists() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("hublink.db");
    let master_key = MemoryKeyProvider::new();

    {
        let stores = open_stores(&db_path, &master_key);
        let settings = HubSettingsService::new(stores.settings.clone());
        settings.set_allow_unauthorized_remote_connection(true).await.unwrap();
    }

    let stores = open_stores(&db_path, &master_key);
    assert_eq!(
        stores.settings.get(keys::connection::ALLOW_UNAUTHORIZED).await.unwrap(),
        Some("true".to_string())
    );
    let settings = HubSettingsService::new(stores.settings.clone());
    assert!(settings.allow_unauthorized_remote_connection().await);
}
