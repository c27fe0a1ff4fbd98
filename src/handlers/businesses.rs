//! Business HTTP handlers.
//!
//! Owner endpoints (authenticated):
//! - POST /api/v1/businesses - Create a business (plan limit applies)
//! - GET /api/v1/businesses - List own businesses
//! - GET/PUT/DELETE /api/v1/businesses/{id}
//!
//! Public endpoints:
//! - GET /api/v1/public/businesses - Directory search
//! - GET /api/v1/public/businesses/{id}

use axum::{Extension, extract::State, http::StatusCode};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    extract::{Json, Path, Query},
    middleware::auth::AuthContext,
    models::business::{Business, BusinessRequest, BusinessSearchQuery},
    services::business_service,
};

/// Create a business.
///
/// # Endpoint
///
/// `POST /api/v1/businesses`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Lanka Spice Kitchen",
///   "category": "restaurant",
///   "city": "Colombo",
///   "website": "https://spice.example.lk"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the created business
/// - **Error (400)**: validation failed
/// - **Error (403)**: plan's business limit reached
pub async fn create_business(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<BusinessRequest>,
) -> Result<(StatusCode, Json<Business>), AppError> {
    let business = business_service::create_business(&pool, auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

pub async fn list_businesses(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Business>>, AppError> {
    let businesses = business_service::list_businesses(&pool, auth.user_id).await?;
    Ok(Json(businesses))
}

/// Returns 404 for businesses owned by someone else.
pub async fn get_business(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(business_id): Path<Uuid>,
) -> Result<Json<Business>, AppError> {
    let business = business_service::get_business(&pool, auth.user_id, business_id).await?;
    Ok(Json(business))
}

/// Replace a business.
///
/// # Response
///
/// - **Success (200 OK)**: the updated business
/// - **Error (404)**: not found or not owned
/// - **Error (403)**: business is suspended by a downgrade
pub async fn update_business(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(business_id): Path<Uuid>,
    Json(request): Json<BusinessRequest>,
) -> Result<Json<Business>, AppError> {
    let business =
        business_service::update_business(&pool, auth.user_id, business_id, request).await?;
    Ok(Json(business))
}

pub async fn delete_business(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(business_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    business_service::delete_business(&pool, auth.user_id, business_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Search the public directory.
///
/// # Endpoint
///
/// `GET /api/v1/public/businesses?category=restaurant&city=Colombo&search=spice`
///
/// All filters are optional. `search` matches name and description.
pub async fn search_public(
    State(pool): State<DbPool>,
    Query(query): Query<BusinessSearchQuery>,
) -> Result<Json<Vec<Business>>, AppError> {
    let businesses = business_service::search_public(&pool, query).await?;
    Ok(Json(businesses))
}

pub async fn get_public(
    State(pool): State<DbPool>,
    Path(business_id): Path<Uuid>,
) -> Result<Json<Business>, AppError> {
    let business = business_service::get_public(&pool, business_id).await?;
    Ok(Json(business))
}
