//! Health check handlers
//!
//! This module provides the health check endpoint used by load balancers to
//! decide whether this instance can reach its database.

use axum::{extract::State, Json};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::{
    binder::Database,
    driver::{Driver, PooledConnection},
    error::Error,
};

/// Public health check response
///
/// Simple status indicator for load balancers and health monitoring.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    /// Status indicator (always "ok")
    pub status: String,
}

/// Public health check handler
///
/// Borrows a connection through the request scope and pings the server.
/// Answers 503 when the pool is not published yet or the database is
/// unreachable.
///
/// # Example
/// ```bash
/// curl http://localhost:3000/api/v1/health
/// # Returns: {"status":"ok"}
/// ```
pub async fn health_check<D: Driver>(
    State(db): State<Database<D>>,
) -> Result<Json<HealthCheckResponse>, Error> {
    db.connection(|conn| async move { conn.ping().await.map_err(Error::Connection) }.boxed())
        .await?;

    tracing::debug!(slot = %db.slot(), "Health check requested - database reachable");
    Ok(Json(HealthCheckResponse {
        status: "ok".to_string(),
    }))
}
