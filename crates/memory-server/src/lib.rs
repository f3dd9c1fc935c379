//! # Tuneloop Memory Server
//!
//! A small key-value service for sharing tuning memory between processes.
//!
//! ## Architectural Principles
//!
//! - **In-process and volatile:** Values live in a map behind a `RwLock` and are lost
//!   on restart. Durable memory is the file backend's job.
//! - **Tiny protocol:** `POST /put {key, value}`, `GET /get?key=`, `POST /delete {key}`
//!   and `GET /health`. The `memory` crate's `HttpMemoryStore` is the client.
//!
//! ## Public API
//!
//! - `router`: The configured axum `Router` over a `SharedMemory`.
//! - `serve` / `run_server`: Serve on a bound listener, or bind and serve.
//! - `ServerError`: The specific error types that can be returned from this crate.

use axum::{
    Router,
    routing::{get, post},
};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;

pub use error::ServerError;

/// The store every handler shares.
pub type SharedMemory = Arc<RwLock<HashMap<String, Value>>>;

/// The port the server listens on when none is given.
pub const DEFAULT_PORT: u16 = 8080;

pub fn router(memory: SharedMemory) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/put", post(handlers::put))
        .route("/get", get(handlers::get))
        .route("/delete", post(handlers::delete))
        .route("/health", get(handlers::health))
        .with_state(memory)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serves a fresh, empty store on an already bound listener.
pub async fn serve(listener: TcpListener) -> Result<(), ServerError> {
    let memory = SharedMemory::default();
    axum::serve(listener, router(memory)).await?;
    Ok(())
}

/// Binds `addr` and serves until the process is stopped.
pub async fn run_server(addr: SocketAddr) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Memory server listening on http://{}", listener.local_addr()?);
    serve(listener).await
}
