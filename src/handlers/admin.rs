//! Admin HTTP handlers.
//!
//! All routes here require an admin token:
//! - GET /api/v1/admin/offers?status=pending - Review queue
//! - POST /api/v1/admin/offers/{id}/review - Approve or decline
//! - GET /api/v1/admin/users - Users with subscription summary
//! - POST /api/v1/admin/users/{id}/status - Activate or deactivate a user
//! - GET /api/v1/admin/users/{id}/payments - Checkout and notification log
//! - GET /api/v1/admin/stats - Dashboard counters

use axum::{Extension, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{Json, Path, Query},
    middleware::auth::AdminContext,
    models::{
        admin::{AdminStats, AdminUserView},
        offer::{AdminOfferQuery, Offer, ReviewRequest},
        payment::SubscriptionLog,
    },
    services::admin_service,
};

/// Request body for `POST /api/v1/admin/users/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub is_active: bool,
}

pub async fn list_offers(
    State(pool): State<DbPool>,
    Query(query): Query<AdminOfferQuery>,
) -> Result<Json<Vec<Offer>>, AppError> {
    let offers = admin_service::list_offers(&pool, query).await?;
    Ok(Json(offers))
}

/// Review an offer.
///
/// # Request Body
///
/// ```json
/// { "decision": "declined", "note": "Discount terms are missing" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: the reviewed offer
/// - **Error (404)**: offer not found
pub async fn review_offer(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AdminContext>,
    Path(offer_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> Result<Json<Offer>, AppError> {
    let offer = admin_service::review_offer(&pool, admin.admin_id, offer_id, request).await?;
    Ok(Json(offer))
}

pub async fn list_users(State(pool): State<DbPool>) -> Result<Json<Vec<AdminUserView>>, AppError> {
    let users = admin_service::list_users(&pool).await?;
    Ok(Json(users))
}

pub async fn set_user_status(
    State(pool): State<DbPool>,
    Extension(admin): Extension<AdminContext>,
    Path(user_id): Path<i64>,
    Json(request): Json<UserStatusRequest>,
) -> Result<Json<Value>, AppError> {
    admin_service::set_user_active(&pool, admin.admin_id, user_id, request.is_active).await?;
    Ok(Json(json!({ "id": user_id, "is_active": request.is_active })))
}

pub async fn payment_logs(
    State(pool): State<DbPool>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<SubscriptionLog>>, AppError> {
    let logs = admin_service::payment_logs(&pool, user_id).await?;
    Ok(Json(logs))
}

pub async fn stats(State(pool): State<DbPool>) -> Result<Json<AdminStats>, AppError> {
    let stats = admin_service::stats(&pool).await?;
    Ok(Json(stats))
}
