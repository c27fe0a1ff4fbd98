//! Authentication HTTP handlers.
//!
//! This module implements the public authentication endpoints:
//! - POST /api/v1/auth/register - Create an account on the Free plan
//! - POST /api/v1/auth/login - Exchange credentials for a session token
//! - POST /api/v1/auth/forgot-password - Issue a password reset token
//! - POST /api/v1/auth/reset-password - Set a new password with a reset token
//! - POST /api/v1/admin/login - Admin session token

use axum::{extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::{
    error::AppError,
    extract::Json,
    models::user::{
        AdminResponse, AuthResponse, ForgotPasswordRequest, LoginRequest, RegisterRequest,
        ResetPasswordRequest, UserResponse,
    },
    services::user_service,
    state::AppState,
};

/// Register a new user.
///
/// # Endpoint
///
/// `POST /api/v1/auth/register`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "Nimal Perera",
///   "email": "nimal@example.lk",
///   "password": "at-least-8-chars",
///   "phone": "0771234567"  // optional
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: session token and the new user
/// - **Error (400)**: validation failed
/// - **Error (409)**: email already registered
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse<UserResponse>>), AppError> {
    let response =
        user_service::register(&state.pool, &state.jwt, state.config.bcrypt_cost, request).await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// Log in.
///
/// # Endpoint
///
/// `POST /api/v1/auth/login`
///
/// # Response
///
/// - **Success (200 OK)**: session token and user
/// - **Error (401)**: unknown email, wrong password or deactivated account
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse<UserResponse>>, AppError> {
    let response = user_service::login(&state.pool, &state.jwt, request).await?;
    Ok(Json(response))
}

/// Request a password reset link.
///
/// Always answers 200 with the same message so registered emails cannot be
/// discovered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    user_service::request_password_reset(
        &state.pool,
        &state.reset_tokens,
        &state.config.frontend_base_url,
        &request.email,
    )
    .await?;

    Ok(Json(json!({
        "message": "If the email is registered, a reset link has been sent"
    })))
}

/// Reset a password.
///
/// # Endpoint
///
/// `POST /api/v1/auth/reset-password`
///
/// # Request Body
///
/// ```json
/// { "token": "3f1c...", "password": "new-password" }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: password changed, the token is spent
/// - **Error (400)**: token unknown, expired or already used; weak password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    user_service::reset_password(
        &state.pool,
        &state.reset_tokens,
        state.config.bcrypt_cost,
        request,
    )
    .await?;

    Ok(Json(json!({ "message": "Password has been reset" })))
}

/// Admin login.
///
/// `POST /api/v1/admin/login`
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse<AdminResponse>>, AppError> {
    let response = user_service::admin_login(&state.pool, &state.jwt, request).await?;
    Ok(Json(response))
}
