//! Discovery engine — capability and name lookups over the registry store.
//!
//! Discovery only ever surfaces `active` instances; stale and deregistered
//! records are reachable through the store's listing with an explicit status
//! filter, never through discovery.

use crate::error::RegistryError;
use crate::models::{InstanceStatus, ListFilter, ServiceInstance};
use crate::store::InstanceStore;

#[derive(Clone)]
pub struct DiscoveryEngine {
    store: InstanceStore,
}

impl DiscoveryEngine {
    pub fn new(store: InstanceStore) -> Self {
        Self { store }
    }

    /// Active instances carrying the given capability tag (exact match),
    /// in registration order. No match is an empty list, not an error.
    pub async fn discover_by_capability(
        &self,
        capability: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.store
            .list(ListFilter {
                capability: Some(capability.to_string()),
                status: Some(InstanceStatus::Active),
            })
            .await
    }

    /// Active instances registered under the given name, in registration
    /// order.
    pub async fn discover_by_name(
        &self,
        name: &str,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.store
            .list_by_name(name, Some(InstanceStatus::Active))
            .await
    }

    /// Endpoint of the named service. When replicas share a name, the
    /// most-recently-registered active instance wins; with no state change
    /// between calls the answer never changes.
    pub async fn resolve_endpoint(&self, name: &str) -> Result<String, RegistryError> {
        let mut instances = self.discover_by_name(name).await?;
        match instances.pop() {
            Some(instance) => Ok(instance.endpoint),
            None => Err(RegistryError::Discovery(format!(
                "No active instance registered under '{}'",
                name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HeartbeatUpdate, RegisterRequest};
    use crate::Database;
    use chrono::Duration;

    fn engine() -> (DiscoveryEngine, InstanceStore) {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        let store = InstanceStore::new(db);
        (DiscoveryEngine::new(store.clone()), store)
    }

    fn request(name: &str, endpoint: &str, capabilities: &[&str]) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn capability_discovery_finds_registered_instance() {
        let (engine, store) = engine();
        store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("registration failed");

        let found = engine
            .discover_by_capability("tutoring")
            .await
            .expect("discover failed");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "svc-a");
        assert_eq!(found[0].status, InstanceStatus::Active);

        let missing = engine
            .discover_by_capability("translation")
            .await
            .expect("discover failed");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn discovery_never_returns_inactive_instances() {
        let (engine, store) = engine();
        let deregistered = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("a failed");
        store
            .register(request("svc-b", "http://localhost:9002", &["tutoring"]))
            .await
            .expect("b failed");
        let alive = store
            .register(request("svc-c", "http://localhost:9003", &["tutoring"]))
            .await
            .expect("c failed");

        store
            .deregister(&deregistered.id)
            .await
            .expect("deregister failed");
        // Freshen svc-c far enough into the future that only svc-b trips the
        // sweep below.
        store
            .update_heartbeat(
                &alive.id,
                HeartbeatUpdate {
                    timestamp: Some(chrono::Utc::now() + Duration::seconds(60)),
                    ..Default::default()
                },
            )
            .await
            .expect("heartbeat failed");
        // Let the clock advance past svc-b's registration instant.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        store
            .mark_stale(Duration::seconds(0))
            .await
            .expect("sweep failed");

        let found = engine
            .discover_by_capability("tutoring")
            .await
            .expect("discover failed");
        let names: Vec<_> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["svc-c"]);
    }

    #[tokio::test]
    async fn resolve_prefers_most_recent_registration() {
        let (engine, store) = engine();
        store
            .register(request("dup-svc", "http://localhost:9001", &[]))
            .await
            .expect("first failed");
        store
            .register(request("dup-svc", "http://localhost:9002", &[]))
            .await
            .expect("second failed");

        // Deterministic across repeated calls with no state change between.
        for _ in 0..3 {
            let endpoint = engine
                .resolve_endpoint("dup-svc")
                .await
                .expect("resolve failed");
            assert_eq!(endpoint, "http://localhost:9002");
        }
    }

    #[tokio::test]
    async fn resolve_unknown_name_is_a_discovery_error() {
        let (engine, _store) = engine();
        let err = engine.resolve_endpoint("nonexistent-service").await.unwrap_err();
        assert_eq!(err.kind(), "service_discovery_error");
    }
}
