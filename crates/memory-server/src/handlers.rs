use crate::{SharedMemory, error::ServerError};
use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    #[serde(default)]
    pub key: Option<String>,
}

/// # POST /put
pub async fn put(
    State(memory): State<SharedMemory>,
    Json(request): Json<PutRequest>,
) -> Result<Json<Value>, ServerError> {
    let key = request.key.ok_or(ServerError::MissingKey)?;
    tracing::debug!(key = %key, "PUT");
    memory.write().await.insert(key, request.value);
    Ok(Json(json!({ "status": "ok" })))
}

/// # GET /get?key=
/// Unknown (or absent) keys answer `{"value": null}`.
pub async fn get(State(memory): State<SharedMemory>, Query(query): Query<KeyRequest>) -> Json<Value> {
    let value = match query.key {
        Some(key) => memory.read().await.get(&key).cloned().unwrap_or(Value::Null),
        None => Value::Null,
    };
    Json(json!({ "value": value }))
}

/// # POST /delete
pub async fn delete(
    State(memory): State<SharedMemory>,
    Json(request): Json<KeyRequest>,
) -> Result<Json<Value>, ServerError> {
    let key = request.key.ok_or(ServerError::MissingKey)?;
    match memory.write().await.remove(&key) {
        Some(_) => {
            tracing::debug!(key = %key, "DELETE");
            Ok(Json(json!({ "status": "ok" })))
        }
        None => Err(ServerError::KeyNotFound(key)),
    }
}

/// # GET /health
pub async fn health(State(memory): State<SharedMemory>) -> Json<Value> {
    let keys = memory.read().await.len();
    Json(json!({ "status": "ok", "keys": keys }))
}
