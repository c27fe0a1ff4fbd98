//! PayHere notification endpoint.

use axum::extract::State;
use serde_json::{Value, json};

use crate::{
    error::AppError,
    extract::{Form, Json},
    models::payment::PayHereNotification,
    services::payment_service,
    state::AppState,
};

/// Receive a PayHere payment notification.
///
/// # Endpoint
///
/// `POST /api/v1/payhere/notify` (`application/x-www-form-urlencoded`)
///
/// # Authentication
///
/// None. Authenticity is established by the `md5sig` field.
///
/// # Response
///
/// - **Success (200 OK)**: `{"status": "<outcome>"}`; duplicates also answer 200
///   so PayHere stops retrying
/// - **Error (400)**: signature or merchant id mismatch
/// - **Error (404)**: order not known to this server
pub async fn notify(
    State(state): State<AppState>,
    Form(notification): Form<PayHereNotification>,
) -> Result<Json<Value>, AppError> {
    let outcome =
        payment_service::process_notification(&state.pool, &state.payhere, &state.config, notification)
            .await?;

    Ok(Json(json!({ "status": outcome })))
}
