//! Health check endpoint.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,

    /// `sandbox` or `live`
    pub payhere_mode: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
///
/// Runs `SELECT 1` against the pool; an unreachable database surfaces as the
/// standard 500 error body.
///
/// ```json
/// {
///   "status": "healthy",
///   "database": "connected",
///   "payhere_mode": "sandbox",
///   "timestamp": "2025-12-21T19:00:00Z"
/// }
/// ```
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    sqlx::query("SELECT 1").execute(&state.pool).await?;

    Ok(Json(HealthResponse {
        status: "healthy",
        database: "connected",
        payhere_mode: if state.config.payhere_sandbox {
            "sandbox"
        } else {
            "live"
        },
        timestamp: Utc::now(),
    }))
}
