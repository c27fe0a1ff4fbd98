//! Subscription HTTP handlers.
//!
//! This module implements:
//! - GET /api/v1/subscriptions/current - Plan, limits, usage and days remaining
//! - GET /api/v1/subscriptions/history - Lifecycle history, newest first
//! - POST /api/v1/subscriptions/checkout - Signed PayHere checkout form
//! - POST /api/v1/subscriptions/cancel - Cancel at period end
//! - POST /api/v1/subscriptions/downgrade - Downgrade to Free at period end

use axum::{Extension, extract::State};

use crate::{
    error::AppError,
    extract::Json,
    middleware::auth::AuthContext,
    models::{
        payment::PayHereCheckout,
        subscription::{
            CheckoutRequest, HistoryEvent, ScheduledChangeResponse, SubscriptionHistory,
            SubscriptionOverview,
        },
    },
    services::subscription_service,
    state::AppState,
};

/// Current subscription.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "subscription": { "plan": "premium", "status": "active", ... },
///   "effective_plan": "premium",
///   "limits": { "max_businesses": 3, "max_live_offers": 15 },
///   "usage": { "businesses": 1, "live_offers": 4 },
///   "days_remaining": 12,
///   "can_upgrade": false
/// }
/// ```
pub async fn current(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<SubscriptionOverview>, AppError> {
    let overview = subscription_service::overview(&state.pool, auth.user_id).await?;
    Ok(Json(overview))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<SubscriptionHistory>>, AppError> {
    let history = subscription_service::history(&state.pool, auth.user_id).await?;
    Ok(Json(history))
}

/// Start a Premium checkout.
///
/// # Endpoint
///
/// `POST /api/v1/subscriptions/checkout`
///
/// # Request Body
///
/// ```json
/// { "plan": "premium" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: PayHere checkout URL and the signed form fields the
///   client posts to it
/// - **Error (400)**: plan is not purchasable
/// - **Error (409)**: Premium already active and renewing
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<PayHereCheckout>, AppError> {
    let checkout = subscription_service::create_checkout(
        &state.pool,
        &state.payhere,
        &state.config,
        auth.user_id,
        request.plan,
    )
    .await?;

    Ok(Json(checkout))
}

/// Cancel Premium. The user keeps Premium until the paid period ends.
pub async fn cancel(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ScheduledChangeResponse>, AppError> {
    let response = subscription_service::schedule_downgrade(
        &state.pool,
        &state.payhere,
        auth.user_id,
        HistoryEvent::CancelScheduled,
    )
    .await?;

    Ok(Json(response))
}

/// Downgrade to Free at the end of the paid period.
pub async fn downgrade(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ScheduledChangeResponse>, AppError> {
    let response = subscription_service::schedule_downgrade(
        &state.pool,
        &state.payhere,
        auth.user_id,
        HistoryEvent::DowngradeScheduled,
    )
    .await?;

    Ok(Json(response))
}
