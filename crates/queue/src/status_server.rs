//! Read-only HTTP status endpoint
//!
//! `GET /queue` returns the items, `GET /stats` the aggregate counters.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use thiserror::Error;

use crate::item::{QueueItem, QueueStats};
use crate::manager::{QueueError, QueueManager};

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
}

fn error_response(err: QueueError) -> Response {
    let status = match err {
        QueueError::ManagerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

async fn get_queue(State(manager): State<QueueManager>) -> Result<Json<Vec<QueueItem>>, Response> {
    manager.get_all().await.map(Json).map_err(error_response)
}

async fn get_stats(State(manager): State<QueueManager>) -> Result<Json<QueueStats>, Response> {
    manager.get_stats().await.map(Json).map_err(error_response)
}

pub fn create_status_router(manager: QueueManager) -> Router {
    Router::new()
        .route("/queue", get(get_queue))
        .route("/stats", get(get_stats))
        .with_state(manager)
}

/// Serve the status endpoint on `bind_addr` until the task is dropped
pub async fn run_status_server(manager: QueueManager, bind_addr: &str) -> Result<(), ServerError> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|_| ServerError::InvalidAddress(bind_addr.to_string()))?;
    let app = create_status_router(manager);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
