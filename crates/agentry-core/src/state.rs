//! Shared application state for HTTP and CLI consumers.

use std::sync::Arc;

use crate::db::Database;
use crate::discovery::DiscoveryEngine;
use crate::store::InstanceStore;

/// Shared state accessible by all API handlers. The store is the only
/// owner of mutable registry state; everything else borrows it.
pub struct AppStateInner {
    pub db: Database,
    pub instances: InstanceStore,
    pub discovery: DiscoveryEngine,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database) -> Self {
        let instances = InstanceStore::new(db.clone());
        let discovery = DiscoveryEngine::new(instances.clone());
        Self {
            db,
            instances,
            discovery,
        }
    }
}
