//! Integration tests for the agentry client/server lifecycle.
//!
//! These start a real registry server on an ephemeral port and drive it
//! through `RegistryClient`, exercising the same code paths as the CLI
//! commands.

use std::sync::Arc;
use std::time::Duration;

use agentry_core::client::{ClientConfig, RegistryClient};
use agentry_core::state::{AppState, AppStateInner};
use agentry_core::{Database, RegistryError};
use agentry_server::{start_server, start_server_with_state, ServerConfig};

async fn spawn_registry() -> String {
    let db = Database::open_in_memory().expect("Failed to open in-memory database");
    let state: AppState = Arc::new(AppStateInner::new(db));
    let config = ServerConfig {
        port: 0,
        ..Default::default()
    };
    let server = start_server_with_state(config, state)
        .await
        .expect("Failed to start server");
    format!("http://{}", server.addr)
}

fn tutor_config(registry: &str) -> ClientConfig {
    let mut metadata = serde_json::Map::new();
    metadata.insert("version".to_string(), serde_json::json!("1.0.0"));
    ClientConfig {
        name: "ai-tutor-service".to_string(),
        endpoint: "http://localhost:3001".to_string(),
        capabilities: vec!["tutoring".to_string(), "education".to_string()],
        registry_endpoint: registry.to_string(),
        heartbeat_interval_seconds: 1,
        metadata,
    }
}

#[tokio::test]
async fn full_service_lifecycle() {
    let registry = spawn_registry().await;
    let client = RegistryClient::new(tutor_config(&registry)).expect("client build failed");

    let instance = client.register().await.expect("register failed");
    assert_eq!(instance.name, "ai-tutor-service");
    assert_eq!(instance.metadata["version"], serde_json::json!("1.0.0"));

    let last_seen = client
        .heartbeat(&instance.id)
        .await
        .expect("heartbeat failed");
    assert!(last_seen >= instance.last_seen);

    let found = client.discover("tutoring").await.expect("discover failed");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "ai-tutor-service");

    let endpoint = client
        .resolve_endpoint("ai-tutor-service")
        .await
        .expect("resolve failed");
    assert_eq!(endpoint, "http://localhost:3001");

    assert!(client
        .deregister(&instance.id)
        .await
        .expect("deregister failed"));
    assert!(!client
        .deregister(&instance.id)
        .await
        .expect("second deregister failed"));

    let found = client.discover("tutoring").await.expect("discover failed");
    assert!(found.is_empty());
}

#[tokio::test]
async fn heartbeat_loop_keeps_last_seen_fresh() {
    let registry = spawn_registry().await;
    let client = RegistryClient::new(tutor_config(&registry)).expect("client build failed");
    let instance = client.register().await.expect("register failed");

    // Let the loop tick a couple of times, then cancel it.
    let _ = tokio::time::timeout(
        Duration::from_millis(2500),
        client.heartbeat_loop(instance.id),
    )
    .await;

    let listed = client.list().await.expect("list failed");
    let refreshed = listed
        .iter()
        .find(|i| i.id == instance.id)
        .expect("instance vanished");
    assert!(refreshed.last_seen > instance.last_seen);
}

#[tokio::test]
async fn list_filtered_narrows_by_status() {
    let registry = spawn_registry().await;
    let client = RegistryClient::new(tutor_config(&registry)).expect("client build failed");

    let keep = client.register().await.expect("first register failed");
    let gone = client.register().await.expect("second register failed");
    client.deregister(&gone.id).await.expect("deregister failed");

    let active = client
        .list_filtered(None, Some("active"))
        .await
        .expect("list failed");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, keep.id);

    let all = client.list().await.expect("list failed");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn call_service_fails_fast_when_unresolved() {
    let registry = spawn_registry().await;
    let client = RegistryClient::connect(&registry).expect("client build failed");

    let err = client
        .call_service(
            "nonexistent-service",
            "echo",
            serde_json::json!({}),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Discovery(_)));
}

#[tokio::test]
async fn server_persists_registrations_to_disk() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let db_path = dir.path().join("registry.db").to_string_lossy().to_string();

    let first = start_server(ServerConfig {
        port: 0,
        db_path: db_path.clone(),
        ..Default::default()
    })
    .await
    .expect("Failed to start first server");

    let mut config = tutor_config(&format!("http://{}", first.addr));
    let client = RegistryClient::new(config.clone()).expect("client build failed");
    let instance = client.register().await.expect("register failed");
    first.shutdown().await;

    // A second server over the same file sees the record.
    let second = start_server(ServerConfig {
        port: 0,
        db_path,
        ..Default::default()
    })
    .await
    .expect("Failed to start second server");

    config.registry_endpoint = format!("http://{}", second.addr);
    let client = RegistryClient::new(config).expect("client build failed");
    let listed = client.list().await.expect("list failed");
    assert!(listed.iter().any(|i| i.id == instance.id));
}
