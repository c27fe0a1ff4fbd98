//! Profile endpoints for the authenticated user.

use axum::{Extension, extract::State};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    extract::Json,
    middleware::auth::AuthContext,
    models::user::{ChangePasswordRequest, UpdateProfileRequest, UserResponse},
    services::user_service,
    state::AppState,
};

/// `GET /api/v1/users/me`
pub async fn get_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_service::get_profile(&state.pool, auth.user_id).await?;
    Ok(Json(user))
}

/// Update name and phone.
///
/// # Endpoint
///
/// `PUT /api/v1/users/me`
///
/// # Request Body
///
/// Omitted fields are left unchanged.
///
/// ```json
/// { "name": "Nimal Perera", "phone": "0771234567" }
/// ```
pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    let user = user_service::update_profile(&state.pool, auth.user_id, request).await?;
    Ok(Json(user))
}

/// Change password.
///
/// # Endpoint
///
/// `PUT /api/v1/users/me/password`
///
/// # Response
///
/// - **Success (200 OK)**
/// - **Error (400)**: new password too weak
/// - **Error (401)**: current password is wrong
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, AppError> {
    user_service::change_password(&state.pool, auth.user_id, state.config.bcrypt_cost, request)
        .await?;

    Ok(Json(json!({ "message": "Password changed" })))
}
