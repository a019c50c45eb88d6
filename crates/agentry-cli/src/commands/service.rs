//! `agentry register` / `run` / `heartbeat` / `deregister` — service
//! lifecycle commands.

use serde_json::{Map, Value};
use uuid::Uuid;

use agentry_core::client::{ClientConfig, RegistryClient};

use super::{connect, print_json};

fn service_client(
    registry: &str,
    name: &str,
    endpoint: &str,
    capabilities: Vec<String>,
    metadata: &str,
    interval: u64,
) -> Result<RegistryClient, String> {
    let metadata: Map<String, Value> =
        serde_json::from_str(metadata).map_err(|e| format!("metadata must be a JSON object: {}", e))?;

    let config = ClientConfig {
        name: name.to_string(),
        endpoint: endpoint.to_string(),
        capabilities,
        registry_endpoint: registry.to_string(),
        heartbeat_interval_seconds: interval,
        metadata,
    };
    RegistryClient::new(config).map_err(|e| e.to_string())
}

pub async fn register(
    registry: &str,
    name: &str,
    endpoint: &str,
    capabilities: Vec<String>,
    metadata: &str,
) -> Result<(), String> {
    let client = service_client(registry, name, endpoint, capabilities, metadata, 60)?;
    let instance = client.register().await.map_err(|e| e.to_string())?;
    print_json(&serde_json::to_value(&instance).unwrap_or(Value::Null));
    Ok(())
}

/// Register, heartbeat until Ctrl+C, then deregister: the full lifecycle
/// of a service instance in one command.
pub async fn run(
    registry: &str,
    name: &str,
    endpoint: &str,
    capabilities: Vec<String>,
    metadata: &str,
    interval: u64,
) -> Result<(), String> {
    let client = service_client(registry, name, endpoint, capabilities, metadata, interval)?;
    let instance = client.register().await.map_err(|e| e.to_string())?;

    println!("Registered '{}' with id {}", name, instance.id);
    println!("Heartbeating every {}s. Press Ctrl+C to stop.", interval);

    tokio::select! {
        _ = client.heartbeat_loop(instance.id) => {}
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;
        }
    }

    println!("\nDeregistering...");
    client
        .deregister(&instance.id)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

pub async fn heartbeat(registry: &str, id: &str) -> Result<(), String> {
    let id: Uuid = id.parse().map_err(|e| format!("Invalid instance id: {}", e))?;
    let client = connect(registry)?;
    let last_seen = client.heartbeat(&id).await.map_err(|e| e.to_string())?;
    println!("Heartbeat accepted (last_seen: {})", last_seen.to_rfc3339());
    Ok(())
}

pub async fn deregister(registry: &str, id: &str) -> Result<(), String> {
    let id: Uuid = id.parse().map_err(|e| format!("Invalid instance id: {}", e))?;
    let client = connect(registry)?;
    let removed = client.deregister(&id).await.map_err(|e| e.to_string())?;
    if removed {
        println!("Deregistered {}", id);
    } else {
        println!("Instance {} was already gone", id);
    }
    Ok(())
}
