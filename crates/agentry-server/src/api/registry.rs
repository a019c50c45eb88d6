//! Registry API
//!
//! POST   /registry/agents                — register a service instance
//! GET    /registry/agents                — list instances (capability/status filters)
//! GET    /registry/agents/discover       — discover active instances by capability
//! GET    /registry/agents/{id}           — fetch one instance
//! POST   /registry/agents/{id}/heartbeat — refresh liveness
//! DELETE /registry/agents/{id}           — deregister (idempotent)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use agentry_core::error::RegistryError;
use agentry_core::models::{
    HeartbeatUpdate, InstanceStatus, ListFilter, RegisterRequest, ServiceInstance,
};
use agentry_core::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/agents", get(list_instances).post(register_instance))
        .route("/agents/discover", get(discover_instances))
        .route("/agents/{id}", get(get_instance).delete(deregister_instance))
        .route(
            "/agents/{id}/heartbeat",
            axum::routing::post(heartbeat_instance),
        )
}

async fn register_instance(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ServiceInstance>), RegistryError> {
    let instance = state.instances.register(body).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    capability: Option<String>,
    status: Option<String>,
}

async fn list_instances(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, RegistryError> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(
            InstanceStatus::from_str(raw)
                .ok_or_else(|| RegistryError::Validation(format!("Invalid status: {}", raw)))?,
        ),
        None => None,
    };

    let agents = state
        .instances
        .list(ListFilter {
            capability: query.capability,
            status,
        })
        .await?;
    let (total_count, active_count) = state.instances.counts().await?;

    Ok(Json(serde_json::json!({
        "agents": agents,
        "total_count": total_count,
        "active_count": active_count,
    })))
}

#[derive(Debug, Deserialize)]
struct DiscoverQuery {
    capability: String,
}

async fn discover_instances(
    State(state): State<AppState>,
    Query(query): Query<DiscoverQuery>,
) -> Result<Json<Value>, RegistryError> {
    let agents = state
        .discovery
        .discover_by_capability(&query.capability)
        .await?;
    Ok(Json(serde_json::json!({ "agents": agents })))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceInstance>, RegistryError> {
    let instance = state.instances.get(&id).await?;
    Ok(Json(instance))
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    timestamp: Option<DateTime<Utc>>,
    status: Option<String>,
    metadata: Option<Map<String, Value>>,
}

async fn heartbeat_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<HeartbeatRequest>,
) -> Result<Json<Value>, RegistryError> {
    let instance = state
        .instances
        .update_heartbeat(
            &id,
            HeartbeatUpdate {
                timestamp: body.timestamp,
                status: body.status,
                metadata: body.metadata,
            },
        )
        .await?;

    Ok(Json(serde_json::json!({
        "message": "heartbeat accepted",
        "last_seen": instance.last_seen,
    })))
}

async fn deregister_instance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, RegistryError> {
    let removed = state.instances.deregister(&id).await?;
    Ok(Json(serde_json::json!({ "removed": removed, "id": id })))
}
