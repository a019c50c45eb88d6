//! `agentry list` / `discover` / `resolve` — registry query commands.

use super::{connect, print_json};

pub async fn list(
    registry: &str,
    capability: Option<&str>,
    status: Option<&str>,
) -> Result<(), String> {
    let client = connect(registry)?;
    let instances = client
        .list_filtered(capability, status)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "agents": instances }));
    Ok(())
}

pub async fn discover(registry: &str, capability: &str) -> Result<(), String> {
    let client = connect(registry)?;
    let instances = client.discover(capability).await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "agents": instances }));
    Ok(())
}

pub async fn resolve(registry: &str, name: &str) -> Result<(), String> {
    let client = connect(registry)?;
    let endpoint = client.resolve_endpoint(name).await.map_err(|e| e.to_string())?;
    println!("{}", endpoint);
    Ok(())
}
