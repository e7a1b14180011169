use axum::extract::FromRef;

use crate::catalog_store::CatalogStore;
use crate::delivery::DeliveryEngine;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedDeliveryEngine = Arc<DeliveryEngine>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub delivery_engine: GuardedDeliveryEngine,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedDeliveryEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.delivery_engine.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
