//! Registry store — the single source of truth for service instances.
//!
//! The instance table and its capability index live in SQLite behind the
//! shared [`Database`] handle. The capability index is derived state, owned
//! exclusively by this store and maintained on register/deregister/purge.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::db::Database;
use crate::error::RegistryError;
use crate::models::{
    HeartbeatUpdate, InstanceStatus, ListFilter, RegisterRequest, ServiceInstance,
};

const INSTANCE_COLUMNS: &str =
    "id, name, endpoint, capabilities, status, metadata, last_seen, created_at, updated_at";

/// Outcome of the heartbeat read-modify-write, resolved under the store lock.
enum HeartbeatOutcome {
    NotFound,
    Deregistered,
    Applied(Box<ServiceInstance>),
}

#[derive(Clone)]
pub struct InstanceStore {
    db: Database,
}

impl InstanceStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Admit a new service instance. Mints a fresh id on every call, so a
    /// re-registering service gets a new identity and its old record ages
    /// out through the sweep. The record and its capability index rows are
    /// written in one transaction; on validation failure nothing is written.
    pub async fn register(
        &self,
        request: RegisterRequest,
    ) -> Result<ServiceInstance, RegistryError> {
        request.validate()?;

        let now = Utc::now();
        let instance = ServiceInstance {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            endpoint: request.endpoint.trim().to_string(),
            capabilities: request.distinct_capabilities(),
            status: InstanceStatus::Active,
            last_seen: now,
            created_at: now,
            updated_at: now,
            metadata: request.metadata,
        };

        let record = instance.clone();
        self.db
            .with_conn_async(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO instances (id, name, endpoint, capabilities, status, metadata, last_seen, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        record.id.to_string(),
                        record.name,
                        record.endpoint,
                        serde_json::to_string(&record.capabilities).unwrap_or_else(|_| "[]".to_string()),
                        record.status.as_str(),
                        serde_json::to_string(&record.metadata).unwrap_or_else(|_| "{}".to_string()),
                        record.last_seen.timestamp_millis(),
                        record.created_at.timestamp_millis(),
                        record.updated_at.timestamp_millis(),
                    ],
                )?;
                for capability in &record.capabilities {
                    tx.execute(
                        "INSERT OR IGNORE INTO instance_capabilities (capability, instance_id) VALUES (?1, ?2)",
                        params![capability, record.id.to_string()],
                    )?;
                }
                tx.commit()
            })
            .await?;

        tracing::info!(
            "Registered instance '{}' ({}) at {}",
            instance.name,
            instance.id,
            instance.endpoint
        );
        Ok(instance)
    }

    pub async fn get(&self, id: &Uuid) -> Result<ServiceInstance, RegistryError> {
        let key = id.to_string();
        let found = self
            .db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM instances WHERE id = ?1",
                    INSTANCE_COLUMNS
                ))?;
                stmt.query_row(params![key], row_to_instance).optional()
            })
            .await?;
        found.ok_or_else(|| RegistryError::NotFound(format!("Instance {} not found", id)))
    }

    /// List instances in registration order (`created_at` ascending, stable).
    pub async fn list(&self, filter: ListFilter) -> Result<Vec<ServiceInstance>, RegistryError> {
        self.db
            .with_conn_async(move |conn| {
                let rows = match (filter.capability, filter.status) {
                    (Some(capability), Some(status)) => {
                        let mut stmt = conn.prepare(
                            "SELECT i.id, i.name, i.endpoint, i.capabilities, i.status, i.metadata, i.last_seen, i.created_at, i.updated_at
                             FROM instances i
                             JOIN instance_capabilities c ON c.instance_id = i.id
                             WHERE c.capability = ?1 AND i.status = ?2
                             ORDER BY i.created_at ASC, i.rowid ASC",
                        )?;
                        let rows = stmt.query_map(params![capability, status.as_str()], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    (Some(capability), None) => {
                        let mut stmt = conn.prepare(
                            "SELECT i.id, i.name, i.endpoint, i.capabilities, i.status, i.metadata, i.last_seen, i.created_at, i.updated_at
                             FROM instances i
                             JOIN instance_capabilities c ON c.instance_id = i.id
                             WHERE c.capability = ?1
                             ORDER BY i.created_at ASC, i.rowid ASC",
                        )?;
                        let rows = stmt.query_map(params![capability], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    (None, Some(status)) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM instances WHERE status = ?1 ORDER BY created_at ASC, rowid ASC",
                            INSTANCE_COLUMNS
                        ))?;
                        let rows = stmt.query_map(params![status.as_str()], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    (None, None) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM instances ORDER BY created_at ASC, rowid ASC",
                            INSTANCE_COLUMNS
                        ))?;
                        let rows = stmt.query_map([], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await
    }

    /// List instances carrying the given name, optionally restricted by
    /// status, in registration order.
    pub async fn list_by_name(
        &self,
        name: &str,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<ServiceInstance>, RegistryError> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                let rows = match status {
                    Some(status) => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM instances WHERE name = ?1 AND status = ?2 ORDER BY created_at ASC, rowid ASC",
                            INSTANCE_COLUMNS
                        ))?;
                        let rows = stmt.query_map(params![name, status.as_str()], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "SELECT {} FROM instances WHERE name = ?1 ORDER BY created_at ASC, rowid ASC",
                            INSTANCE_COLUMNS
                        ))?;
                        let rows = stmt.query_map(params![name], row_to_instance)?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                };
                Ok(rows)
            })
            .await
    }

    /// Apply a heartbeat: refresh `last_seen`, reset the instance to active,
    /// merge metadata keys if provided.
    ///
    /// A timestamp older than the stored `last_seen` (out-of-order delivery)
    /// is accepted as a no-op: nothing regresses and the current record is
    /// returned. The read-modify-write runs in one lock hold, so concurrent
    /// heartbeats for the same instance cannot interleave.
    pub async fn update_heartbeat(
        &self,
        id: &Uuid,
        update: HeartbeatUpdate,
    ) -> Result<ServiceInstance, RegistryError> {
        if let Some(status) = update.status.as_deref() {
            if status != InstanceStatus::Active.as_str() {
                return Err(RegistryError::Validation(format!(
                    "heartbeat status must be 'active', got '{}'",
                    status
                )));
            }
        }

        let key = id.to_string();
        let outcome = self
            .db
            .with_conn_async(move |conn| {
                let existing = conn
                    .query_row(
                        &format!("SELECT {} FROM instances WHERE id = ?1", INSTANCE_COLUMNS),
                        params![key],
                        row_to_instance,
                    )
                    .optional()?;

                let Some(mut instance) = existing else {
                    return Ok(HeartbeatOutcome::NotFound);
                };
                if instance.status == InstanceStatus::Deregistered {
                    return Ok(HeartbeatOutcome::Deregistered);
                }

                let now = Utc::now();
                let effective = update.timestamp.unwrap_or(now);
                if effective < instance.last_seen {
                    // Retransmitted heartbeat: last_seen is monotonic.
                    return Ok(HeartbeatOutcome::Applied(Box::new(instance)));
                }

                instance.last_seen = effective;
                instance.status = InstanceStatus::Active;
                instance.updated_at = now;
                if let Some(extra) = update.metadata {
                    for (k, v) in extra {
                        instance.metadata.insert(k, v);
                    }
                }

                conn.execute(
                    "UPDATE instances SET status = ?1, metadata = ?2, last_seen = ?3, updated_at = ?4 WHERE id = ?5",
                    params![
                        instance.status.as_str(),
                        serde_json::to_string(&instance.metadata).unwrap_or_else(|_| "{}".to_string()),
                        instance.last_seen.timestamp_millis(),
                        instance.updated_at.timestamp_millis(),
                        key,
                    ],
                )?;
                Ok(HeartbeatOutcome::Applied(Box::new(instance)))
            })
            .await?;

        match outcome {
            HeartbeatOutcome::NotFound => {
                Err(RegistryError::NotFound(format!("Instance {} not found", id)))
            }
            HeartbeatOutcome::Deregistered => Err(RegistryError::Conflict(format!(
                "Instance {} is deregistered",
                id
            ))),
            HeartbeatOutcome::Applied(instance) => Ok(*instance),
        }
    }

    /// Mark an instance deregistered. Idempotent: returns `true` when an
    /// active or stale instance transitioned, `false` for unknown or
    /// already-deregistered ids. The capability index rows are removed so
    /// the instance can never be discovered again; the record itself stays
    /// queryable until purged.
    pub async fn deregister(&self, id: &Uuid) -> Result<bool, RegistryError> {
        let key = id.to_string();
        let removed = self
            .db
            .with_conn_async(move |conn| {
                let tx = conn.transaction()?;
                let now = Utc::now().timestamp_millis();
                let changed = tx.execute(
                    "UPDATE instances SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status != ?1",
                    params![InstanceStatus::Deregistered.as_str(), now, key],
                )?;
                if changed > 0 {
                    tx.execute(
                        "DELETE FROM instance_capabilities WHERE instance_id = ?1",
                        params![key],
                    )?;
                }
                tx.commit()?;
                Ok(changed > 0)
            })
            .await?;

        if removed {
            tracing::info!("Deregistered instance {}", id);
        }
        Ok(removed)
    }

    /// Transition active instances whose heartbeat has gone silent for
    /// longer than `heartbeat_timeout` to stale. Returns how many changed.
    pub async fn mark_stale(&self, heartbeat_timeout: Duration) -> Result<usize, RegistryError> {
        let cutoff = (Utc::now() - heartbeat_timeout).timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let now = Utc::now().timestamp_millis();
                conn.execute(
                    "UPDATE instances SET status = ?1, updated_at = ?2 WHERE status = ?3 AND last_seen < ?4",
                    params![
                        InstanceStatus::Stale.as_str(),
                        now,
                        InstanceStatus::Active.as_str(),
                        cutoff,
                    ],
                )
            })
            .await
    }

    /// Hard-delete stale and deregistered records whose `last_seen` is older
    /// than `purge_timeout`, bounding store growth. Capability index rows go
    /// with them via the foreign-key cascade.
    pub async fn purge_expired(&self, purge_timeout: Duration) -> Result<usize, RegistryError> {
        let cutoff = (Utc::now() - purge_timeout).timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM instances WHERE status IN (?1, ?2) AND last_seen < ?3",
                    params![
                        InstanceStatus::Stale.as_str(),
                        InstanceStatus::Deregistered.as_str(),
                        cutoff,
                    ],
                )
            })
            .await
    }

    /// Total and active instance counts, read in one lock hold.
    pub async fn counts(&self) -> Result<(i64, i64), RegistryError> {
        self.db
            .with_conn_async(|conn| {
                let total: i64 =
                    conn.query_row("SELECT COUNT(*) FROM instances", [], |row| row.get(0))?;
                let active: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM instances WHERE status = ?1",
                    params![InstanceStatus::Active.as_str()],
                    |row| row.get(0),
                )?;
                Ok((total, active))
            })
            .await
    }
}

fn row_to_instance(row: &Row<'_>) -> rusqlite::Result<ServiceInstance> {
    let id_text: String = row.get(0)?;
    let capabilities_text: String = row.get(3)?;
    let status_text: String = row.get(4)?;
    let metadata_text: String = row.get(5)?;
    let last_seen_ms: i64 = row.get(6)?;
    let created_ms: i64 = row.get(7)?;
    let updated_ms: i64 = row.get(8)?;

    Ok(ServiceInstance {
        id: Uuid::parse_str(&id_text).unwrap_or_default(),
        name: row.get(1)?,
        endpoint: row.get(2)?,
        capabilities: serde_json::from_str(&capabilities_text).unwrap_or_default(),
        status: InstanceStatus::from_str(&status_text).unwrap_or(InstanceStatus::Stale),
        metadata: serde_json::from_str(&metadata_text).unwrap_or_default(),
        last_seen: DateTime::from_timestamp_millis(last_seen_ms).unwrap_or_else(Utc::now),
        created_at: DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp_millis(updated_ms).unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn test_store() -> InstanceStore {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        InstanceStore::new(db)
    }

    fn request(name: &str, endpoint: &str, capabilities: &[&str]) -> RegisterRequest {
        RegisterRequest {
            name: name.to_string(),
            endpoint: endpoint.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            metadata: Map::new(),
        }
    }

    /// Backdate an instance's heartbeat to simulate elapsed time.
    fn backdate(store: &InstanceStore, id: &Uuid, seconds: i64) {
        let past = (Utc::now() - Duration::seconds(seconds)).timestamp_millis();
        store
            .db
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE instances SET last_seen = ?1 WHERE id = ?2",
                    params![past, id.to_string()],
                )
            })
            .expect("Failed to backdate instance");
    }

    #[tokio::test]
    async fn register_then_get_returns_active_record() {
        let store = test_store();
        let before = Utc::now().timestamp_millis();

        let instance = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("registration failed");

        let after = Utc::now().timestamp_millis();
        let fetched = store.get(&instance.id).await.expect("get failed");

        assert_eq!(fetched.name, "svc-a");
        assert_eq!(fetched.endpoint, "http://localhost:9001");
        assert_eq!(fetched.status, InstanceStatus::Active);
        assert_eq!(fetched.capabilities, vec!["tutoring"]);
        assert!(fetched.last_seen.timestamp_millis() >= before);
        assert!(fetched.last_seen.timestamp_millis() <= after);
    }

    #[tokio::test]
    async fn invalid_registration_leaves_store_unchanged() {
        let store = test_store();

        let err = store
            .register(request("", "http://localhost:9001", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = store
            .register(request("svc-a", "not-a-url", &[]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let (total, active) = store.counts().await.expect("counts failed");
        assert_eq!(total, 0);
        assert_eq!(active, 0);
    }

    #[tokio::test]
    async fn identical_registrations_mint_distinct_ids() {
        let store = test_store();
        let req = request("dup-svc", "http://localhost:9001", &["echo"]);

        let first = store.register(req.clone()).await.expect("first failed");
        let second = store.register(req).await.expect("second failed");

        assert_ne!(first.id, second.id);
        let (total, _) = store.counts().await.expect("counts failed");
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn silent_instance_goes_stale_and_heartbeat_revives_it() {
        let store = test_store();
        let instance = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("registration failed");

        backdate(&store, &instance.id, 600);
        let marked = store
            .mark_stale(Duration::seconds(180))
            .await
            .expect("sweep failed");
        assert_eq!(marked, 1);
        let fetched = store.get(&instance.id).await.expect("get failed");
        assert_eq!(fetched.status, InstanceStatus::Stale);

        store
            .update_heartbeat(&instance.id, HeartbeatUpdate::default())
            .await
            .expect("heartbeat failed");
        let fetched = store.get(&instance.id).await.expect("get failed");
        assert_eq!(fetched.status, InstanceStatus::Active);
    }

    #[tokio::test]
    async fn heartbeat_errors_are_typed() {
        let store = test_store();

        let err = store
            .update_heartbeat(&Uuid::new_v4(), HeartbeatUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");

        let instance = store
            .register(request("svc-a", "http://localhost:9001", &[]))
            .await
            .expect("registration failed");
        store
            .deregister(&instance.id)
            .await
            .expect("deregister failed");
        let err = store
            .update_heartbeat(&instance.id, HeartbeatUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[tokio::test]
    async fn heartbeat_rejects_non_active_status() {
        let store = test_store();
        let instance = store
            .register(request("svc-a", "http://localhost:9001", &[]))
            .await
            .expect("registration failed");

        let err = store
            .update_heartbeat(
                &instance.id,
                HeartbeatUpdate {
                    status: Some("deregistered".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[tokio::test]
    async fn out_of_order_heartbeat_does_not_regress_last_seen() {
        let store = test_store();
        let instance = store
            .register(request("svc-a", "http://localhost:9001", &[]))
            .await
            .expect("registration failed");

        let current = store.get(&instance.id).await.expect("get failed").last_seen;
        let updated = store
            .update_heartbeat(
                &instance.id,
                HeartbeatUpdate {
                    timestamp: Some(current - Duration::seconds(60)),
                    ..Default::default()
                },
            )
            .await
            .expect("heartbeat failed");

        assert_eq!(updated.last_seen, current);
        let fetched = store.get(&instance.id).await.expect("get failed");
        assert_eq!(fetched.last_seen, current);
    }

    #[tokio::test]
    async fn heartbeat_merges_metadata() {
        let store = test_store();
        let mut req = request("svc-a", "http://localhost:9001", &[]);
        req.metadata.insert("version".to_string(), json!("1.0.0"));
        let instance = store.register(req).await.expect("registration failed");

        let mut extra = Map::new();
        extra.insert("version".to_string(), json!("1.1.0"));
        extra.insert("language".to_string(), json!("python"));
        let updated = store
            .update_heartbeat(
                &instance.id,
                HeartbeatUpdate {
                    metadata: Some(extra),
                    ..Default::default()
                },
            )
            .await
            .expect("heartbeat failed");

        assert_eq!(updated.metadata["version"], json!("1.1.0"));
        assert_eq!(updated.metadata["language"], json!("python"));
    }

    #[tokio::test]
    async fn deregister_is_idempotent() {
        let store = test_store();
        let instance = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("registration failed");

        assert!(store.deregister(&instance.id).await.expect("first failed"));
        assert!(!store.deregister(&instance.id).await.expect("second failed"));
        assert!(!store.deregister(&Uuid::new_v4()).await.expect("unknown failed"));

        let fetched = store.get(&instance.id).await.expect("get failed");
        assert_eq!(fetched.status, InstanceStatus::Deregistered);
    }

    #[tokio::test]
    async fn list_is_ordered_and_filtered() {
        let store = test_store();
        let a = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("a failed");
        let b = store
            .register(request("svc-b", "http://localhost:9002", &["search"]))
            .await
            .expect("b failed");
        store.deregister(&b.id).await.expect("deregister failed");

        let all = store.list(ListFilter::default()).await.expect("list failed");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(all[1].id, b.id);

        let active = store
            .list(ListFilter {
                status: Some(InstanceStatus::Active),
                ..Default::default()
            })
            .await
            .expect("list failed");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, a.id);

        let tutoring = store
            .list(ListFilter {
                capability: Some("tutoring".to_string()),
                ..Default::default()
            })
            .await
            .expect("list failed");
        assert_eq!(tutoring.len(), 1);
        assert_eq!(tutoring[0].name, "svc-a");

        // Deregistration removed svc-b from the capability index.
        let search = store
            .list(ListFilter {
                capability: Some("search".to_string()),
                ..Default::default()
            })
            .await
            .expect("list failed");
        assert!(search.is_empty());
    }

    #[tokio::test]
    async fn purge_removes_expired_records() {
        let store = test_store();
        let instance = store
            .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
            .await
            .expect("registration failed");

        backdate(&store, &instance.id, 7200);
        store
            .mark_stale(Duration::seconds(180))
            .await
            .expect("sweep failed");
        let purged = store
            .purge_expired(Duration::seconds(3600))
            .await
            .expect("purge failed");
        assert_eq!(purged, 1);

        let err = store.get(&instance.id).await.unwrap_err();
        assert_eq!(err.kind(), "not_found");
        let (total, _) = store.counts().await.expect("counts failed");
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let path = dir.path().join("registry.db");
        let path = path.to_string_lossy().to_string();

        let id = {
            let store = InstanceStore::new(Database::open(&path).expect("open failed"));
            store
                .register(request("svc-a", "http://localhost:9001", &["tutoring"]))
                .await
                .expect("registration failed")
                .id
        };

        let store = InstanceStore::new(Database::open(&path).expect("reopen failed"));
        let fetched = store.get(&id).await.expect("get failed");
        assert_eq!(fetched.name, "svc-a");
        assert_eq!(fetched.capabilities, vec!["tutoring"]);
    }
}
