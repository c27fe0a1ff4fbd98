//! Offer HTTP handlers.
//!
//! Owner endpoints (authenticated):
//! - POST /api/v1/offers - Submit an offer for review
//! - GET /api/v1/offers - List own offers, optionally `?business_id=`
//! - GET/PUT/DELETE /api/v1/offers/{id}
//!
//! Public endpoints:
//! - GET /api/v1/public/offers - Approved offers currently running
//! - GET /api/v1/public/offers/{id}

use axum::{Extension, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{Json, Path, Query},
    middleware::auth::AuthContext,
    models::offer::{Offer, OfferListQuery, OfferRequest, PublicOffer, PublicOfferQuery},
    services::offer_service,
};

/// Submit an offer.
///
/// # Endpoint
///
/// `POST /api/v1/offers`
///
/// # Request Body
///
/// ```json
/// {
///   "business_id": "550e8400-e29b-41d4-a716-446655440000",
///   "title": "20% off all rice & curry",
///   "discount_percent": 20,
///   "start_date": "2025-02-01T00:00:00Z",
///   "end_date": "2025-02-28T23:59:59Z"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the offer, with status `pending`
/// - **Error (400)**: validation failed
/// - **Error (403)**: live-offer limit reached, or business suspended
/// - **Error (404)**: business not found or not owned
pub async fn create_offer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<OfferRequest>,
) -> Result<(StatusCode, Json<Offer>), AppError> {
    let offer = offer_service::create_offer(&pool, auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

pub async fn list_offers(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<OfferListQuery>,
) -> Result<Json<Vec<Offer>>, AppError> {
    let offers = offer_service::list_offers(&pool, auth.user_id, query).await?;
    Ok(Json(offers))
}

pub async fn get_offer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(offer_id): Path<Uuid>,
) -> Result<Json<Offer>, AppError> {
    let offer = offer_service::get_offer(&pool, auth.user_id, offer_id).await?;
    Ok(Json(offer))
}

/// Edit an offer. The offer returns to `pending` and must be reviewed again.
pub async fn update_offer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(offer_id): Path<Uuid>,
    Json(request): Json<OfferRequest>,
) -> Result<Json<Offer>, AppError> {
    let offer = offer_service::update_offer(&pool, auth.user_id, offer_id, request).await?;
    Ok(Json(offer))
}

pub async fn delete_offer(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(offer_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    offer_service::delete_offer(&pool, auth.user_id, offer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Public offer listing.
///
/// # Endpoint
///
/// `GET /api/v1/public/offers?business_id=...&category=restaurant`
pub async fn list_public(
    State(pool): State<DbPool>,
    Query(query): Query<PublicOfferQuery>,
) -> Result<Json<Vec<PublicOffer>>, AppError> {
    let offers = offer_service::list_public(&pool, query).await?;
    Ok(Json(offers))
}

pub async fn get_public(
    State(pool): State<DbPool>,
    Path(offer_id): Path<Uuid>,
) -> Result<Json<PublicOffer>, AppError> {
    let offer = offer_service::get_public(&pool, offer_id).await?;
    Ok(Json(offer))
}
