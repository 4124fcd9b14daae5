//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::instrument;

/// Health check handler.
///
/// Pings the document store and reports the service status. Always answers
/// 200 so probes can read the body.
///
/// ## Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "healthy"
/// }
/// ```
#[instrument(skip_all, name = "rc.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, database) = match state.coordinator.ping_store().await {
        Ok(()) => ("healthy", "healthy"),
        Err(err) => {
            tracing::warn!(target: "rc.health", error = %err, "Document store ping failed");
            ("unhealthy", "unhealthy")
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        database: Some(database.to_string()),
    })
}
