//! Registry client for external services.
//!
//! The integration-side counterpart of the HTTP registry: a service uses
//! this to register itself, keep its heartbeat fresh, discover peers by
//! capability, and call them by name. Every request carries a correlation
//! identifier header.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::correlation::{CorrelationId, CORRELATION_HEADER};
use crate::error::RegistryError;
use crate::models::{InstanceStatus, RegisterRequest, ServiceInstance};
use crate::proxy::{forward_json, CallResponse};

/// Configuration for a service that registers with the registry.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub name: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub registry_endpoint: String,
    pub heartbeat_interval_seconds: u64,
    pub metadata: Map<String, Value>,
}

impl ClientConfig {
    /// Minimal configuration carrying no service identity, enough for
    /// discovery, listing, and cross-service calls.
    pub fn anonymous(registry_endpoint: &str) -> Self {
        Self {
            name: String::new(),
            endpoint: String::new(),
            capabilities: Vec::new(),
            registry_endpoint: registry_endpoint.to_string(),
            heartbeat_interval_seconds: 60,
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentsEnvelope {
    agents: Vec<ServiceInstance>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatAck {
    last_seen: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RemovedAck {
    removed: bool,
}

#[derive(Clone)]
pub struct RegistryClient {
    config: ClientConfig,
    client: reqwest::Client,
}

impl RegistryClient {
    pub fn new(config: ClientConfig) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RegistryError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Client bound to a registry without a service identity of its own.
    pub fn connect(registry_endpoint: &str) -> Result<Self, RegistryError> {
        Self::new(ClientConfig::anonymous(registry_endpoint))
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}",
            self.config.registry_endpoint.trim_end_matches('/'),
            path
        )
    }

    /// Register the configured service and return its admitted record.
    pub async fn register(&self) -> Result<ServiceInstance, RegistryError> {
        let request = RegisterRequest {
            name: self.config.name.clone(),
            endpoint: self.config.endpoint.clone(),
            capabilities: self.config.capabilities.clone(),
            metadata: self.config.metadata.clone(),
        };

        let response = self
            .client
            .post(self.url("/registry/agents"))
            .header(CORRELATION_HEADER, CorrelationId::generate().as_str())
            .json(&request)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("Registration request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let instance = response.json::<ServiceInstance>().await.map_err(|e| {
            RegistryError::MalformedResponse(format!("Registration response: {}", e))
        })?;

        tracing::info!(
            "Service '{}' registered with id {}",
            self.config.name,
            instance.id
        );
        Ok(instance)
    }

    /// Send one heartbeat; returns the registry's recorded `last_seen`.
    pub async fn heartbeat(&self, id: &Uuid) -> Result<DateTime<Utc>, RegistryError> {
        let body = serde_json::json!({
            "timestamp": Utc::now(),
            "status": "active",
        });

        let response = self
            .client
            .post(self.url(&format!("/registry/agents/{}/heartbeat", id)))
            .header(CORRELATION_HEADER, CorrelationId::generate().as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("Heartbeat request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let ack = response
            .json::<HeartbeatAck>()
            .await
            .map_err(|e| RegistryError::MalformedResponse(format!("Heartbeat response: {}", e)))?;
        Ok(ack.last_seen)
    }

    /// Tick forever at the configured interval. Individual failures are
    /// logged and the loop keeps going; cancel by dropping the future (e.g.
    /// from a `select!` against shutdown).
    pub async fn heartbeat_loop(&self, id: Uuid) {
        let interval = Duration::from_secs(self.config.heartbeat_interval_seconds.max(1));
        loop {
            tokio::time::sleep(interval).await;
            match self.heartbeat(&id).await {
                Ok(_) => tracing::debug!("Heartbeat sent for '{}'", self.config.name),
                Err(e) => tracing::warn!("Heartbeat for '{}' failed: {}", self.config.name, e),
            }
        }
    }

    /// Deregister an instance; `true` when this call removed it.
    pub async fn deregister(&self, id: &Uuid) -> Result<bool, RegistryError> {
        let response = self
            .client
            .delete(self.url(&format!("/registry/agents/{}", id)))
            .header(CORRELATION_HEADER, CorrelationId::generate().as_str())
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("Deregister request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let ack = response
            .json::<RemovedAck>()
            .await
            .map_err(|e| RegistryError::MalformedResponse(format!("Deregister response: {}", e)))?;
        Ok(ack.removed)
    }

    /// All registered instances, regardless of status.
    pub async fn list(&self) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.list_filtered(None, None).await
    }

    /// Registered instances matching the given capability and/or status.
    pub async fn list_filtered(
        &self,
        capability: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let mut query = Vec::new();
        if let Some(capability) = capability {
            query.push(format!("capability={}", capability));
        }
        if let Some(status) = status {
            query.push(format!("status={}", status));
        }
        let path = if query.is_empty() {
            "/registry/agents".to_string()
        } else {
            format!("/registry/agents?{}", query.join("&"))
        };
        self.fetch_agents(&path).await
    }

    /// Active instances carrying the given capability tag.
    pub async fn discover(&self, capability: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.fetch_agents(&format!(
            "/registry/agents/discover?capability={}",
            capability
        ))
        .await
    }

    /// Endpoint behind a service name, picked from the registry's active
    /// listing. Mirrors the server-side resolver: the most-recently-
    /// registered active instance wins.
    pub async fn resolve_endpoint(&self, name: &str) -> Result<String, RegistryError> {
        let instances = self
            .fetch_agents(&format!("/registry/agents?status={}", InstanceStatus::Active.as_str()))
            .await?;
        // The listing is in registration order, so the last match is the
        // most recent.
        instances
            .into_iter()
            .rev()
            .find(|instance| instance.name == name)
            .map(|instance| instance.endpoint)
            .ok_or_else(|| {
                RegistryError::Discovery(format!("No active instance registered under '{}'", name))
            })
    }

    /// Resolve `service_name` and forward a single call to it, with the same
    /// failure classification as the invocation proxy.
    pub async fn call_service(
        &self,
        service_name: &str,
        method: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<CallResponse, RegistryError> {
        let endpoint = self.resolve_endpoint(service_name).await?;
        forward_json(&self.client, &endpoint, method, &payload, timeout).await
    }

    async fn fetch_agents(&self, path: &str) -> Result<Vec<ServiceInstance>, RegistryError> {
        let response = self
            .client
            .get(self.url(path))
            .header(CORRELATION_HEADER, CorrelationId::generate().as_str())
            .send()
            .await
            .map_err(|e| RegistryError::Transport(format!("Registry query failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RegistryError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = response
            .json::<AgentsEnvelope>()
            .await
            .map_err(|e| RegistryError::MalformedResponse(format!("Registry listing: {}", e)))?;
        Ok(envelope.agents)
    }
}
