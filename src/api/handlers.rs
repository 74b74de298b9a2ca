//! API Handlers
//!
//! HTTP request handlers for each node endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::cache::InMemCache;
use crate::error::{CacheError, Result};
use crate::models::{EntryPath, GetResponse, HealthResponse, PutResponse, StatsResponse};
use crate::relay::BusRelay;

/// Application state shared across all handlers.
///
/// The cache locks internally, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Replicated cache
    pub cache: Arc<InMemCache>,
    /// Node id of the attached relay, if any
    pub node_id: Option<String>,
    /// Whether the attached relay encrypts
    pub encrypted: bool,
}

impl AppState {
    /// Creates state for a cache that does not replicate.
    pub fn new(cache: InMemCache) -> Self {
        Self {
            cache: Arc::new(cache),
            node_id: None,
            encrypted: false,
        }
    }

    /// Creates state for a cache wired to `relay`.
    pub fn replicated(max_cache_size: u64, relay: Arc<BusRelay>) -> Self {
        let node_id = Some(relay.node_id().to_string());
        let encrypted = relay.is_encrypted();
        Self {
            cache: InMemCache::with_relay(max_cache_size, relay),
            node_id,
            encrypted,
        }
    }
}

/// Handler for PUT /cache/:namespace/:key
///
/// Stores the JSON body as the value.
pub async fn put_handler(
    State(state): State<AppState>,
    Path(path): Path<EntryPath>,
    Json(value): Json<Value>,
) -> Result<Json<PutResponse>> {
    if let Some(error_msg) = path.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.put(&path.namespace, &path.key, &value)?;

    Ok(Json(PutResponse::new(path.namespace, path.key)))
}

/// Handler for GET /cache/:namespace/:key
///
/// Retrieves a value, touching the entry.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(path): Path<EntryPath>,
) -> Result<Json<GetResponse>> {
    let value: Value = state.cache.get(&path.namespace, &path.key)?;

    Ok(Json(GetResponse::new(path.namespace, path.key, value)))
}

/// Handler for GET /stats
///
/// Returns current cache statistics and relay identity.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(
        state.cache.stats(),
        state.node_id.clone(),
        state.encrypted,
    ))
}

/// Handler for GET /health
///
/// Returns health status of the node.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
