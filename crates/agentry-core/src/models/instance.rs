use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RegistryError;

/// Liveness state of a registered instance.
///
/// Transitions: `active -> stale` on heartbeat timeout, `stale -> active` on
/// a fresh heartbeat, `active|stale -> deregistered` on explicit removal.
/// `deregistered` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InstanceStatus {
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "stale")]
    Stale,
    #[serde(rename = "deregistered")]
    Deregistered,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Stale => "stale",
            Self::Deregistered => "deregistered",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "stale" => Some(Self::Stale),
            "deregistered" => Some(Self::Deregistered),
            _ => None,
        }
    }
}

/// One registered copy of an external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: Uuid,
    pub name: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub status: InstanceStatus,
    pub last_seen: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Payload accepted by the registration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RegisterRequest {
    /// Check the request before anything touches the store. A failure here
    /// means no record was created.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::Validation(
                "name must not be empty".to_string(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(RegistryError::Validation(
                "endpoint must not be empty".to_string(),
            ));
        }
        let parsed = url::Url::parse(self.endpoint.trim())
            .map_err(|e| RegistryError::Validation(format!("endpoint is not a valid URL: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(RegistryError::Validation(format!(
                "endpoint must be an http or https URL, got scheme '{}'",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(RegistryError::Validation(
                "endpoint must include a host".to_string(),
            ));
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(RegistryError::Validation(
                "capability tags must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Capability tags with duplicates removed, registration order kept.
    pub fn distinct_capabilities(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for capability in &self.capabilities {
            let tag = capability.trim().to_string();
            if !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        seen
    }
}

/// Fields a heartbeat may update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatUpdate {
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Filter for store listings. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub capability: Option<String>,
    pub status: Option<InstanceStatus>,
}
