//! Cross-service invocation proxy.
//!
//! Resolves a service name through the discovery engine and forwards a
//! single JSON request to it. Each failure mode surfaces as its own error
//! kind so callers can decide what is worth retrying; the proxy itself
//! never retries.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::correlation::{CorrelationId, CORRELATION_HEADER};
use crate::discovery::DiscoveryEngine;
use crate::error::RegistryError;

/// Response surfaced from a proxied call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Clone)]
pub struct ServiceCaller {
    discovery: DiscoveryEngine,
    client: reqwest::Client,
}

impl ServiceCaller {
    pub fn new(discovery: DiscoveryEngine) -> Self {
        Self {
            discovery,
            client: reqwest::Client::new(),
        }
    }

    /// Forward `payload` to `{endpoint}/{method}` of the named service.
    ///
    /// Fails fast with a discovery error before any network traffic when the
    /// name does not resolve. Cancelling the returned future aborts only the
    /// outbound request; registry state is untouched either way.
    pub async fn call(
        &self,
        service_name: &str,
        method: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<CallResponse, RegistryError> {
        let endpoint = self.discovery.resolve_endpoint(service_name).await?;

        tracing::debug!("Proxying call to {}/{}", service_name, method);
        forward_json(&self.client, &endpoint, method, &payload, timeout).await
    }
}

/// Issue a single `POST {endpoint}/{method}` carrying `payload`, classifying
/// every failure mode distinctly. Shared by the proxy and the registry
/// client.
pub(crate) async fn forward_json(
    client: &reqwest::Client,
    endpoint: &str,
    method: &str,
    payload: &Value,
    timeout: Duration,
) -> Result<CallResponse, RegistryError> {
    let url = format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        method.trim_start_matches('/')
    );
    let correlation = CorrelationId::generate();

    let response = client
        .post(&url)
        .timeout(timeout)
        .header(CORRELATION_HEADER, correlation.as_str())
        .json(payload)
        .send()
        .await
        .map_err(|e| classify(&url, e))?;

    let status = response.status();
    let text = response.text().await.map_err(|e| classify(&url, e))?;

    if !status.is_success() {
        return Err(RegistryError::RemoteStatus {
            status: status.as_u16(),
            body: text,
        });
    }

    let body: Value = serde_json::from_str(&text).map_err(|e| {
        RegistryError::MalformedResponse(format!("Response from {} is not valid JSON: {}", url, e))
    })?;

    Ok(CallResponse {
        status: status.as_u16(),
        body,
    })
}

fn classify(url: &str, err: reqwest::Error) -> RegistryError {
    if err.is_timeout() {
        RegistryError::Timeout(format!("Call to {} timed out", url))
    } else {
        RegistryError::Transport(format!("Call to {} failed: {}", url, err))
    }
}
