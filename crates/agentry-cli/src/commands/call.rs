//! `agentry call` — forward a call to a named service through the registry.

use std::time::Duration;

use serde_json::Value;

use super::{connect, print_json};

pub async fn run(
    registry: &str,
    service: &str,
    method: &str,
    payload: &str,
    timeout_seconds: u64,
) -> Result<(), String> {
    let payload: Value =
        serde_json::from_str(payload).map_err(|e| format!("payload must be valid JSON: {}", e))?;

    let client = connect(registry)?;
    let response = client
        .call_service(
            service,
            method,
            payload,
            Duration::from_secs(timeout_seconds),
        )
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::to_value(&response).unwrap_or(Value::Null));
    Ok(())
}
