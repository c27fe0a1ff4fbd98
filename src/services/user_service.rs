//! Account service: registration, login, profile and password management.
//!
//! Passwords are hashed with bcrypt on the blocking thread pool so hashing
//! never stalls the async runtime.

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::{JwtKeys, Role},
    models::{
        subscription::{HistoryEvent, PlanTier},
        user::{
            Admin, AdminResponse, AuthResponse, ChangePasswordRequest, LoginRequest,
            RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, User, UserResponse,
            normalize_email, validate_password,
        },
    },
    services::{reset_tokens::ResetTokenStore, subscription_service},
};

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(AppError::from)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(AppError::from)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Register a user with a Free subscription.
///
/// # Process
///
/// 1. Validate the request
/// 2. Hash the password
/// 3. Insert user, Free subscription and a `created` history entry in one transaction
/// 4. Issue a session token
///
/// # Errors
///
/// - `InvalidRequest`: validation failed
/// - `Conflict`: email already registered
pub async fn register(
    pool: &DbPool,
    jwt: &JwtKeys,
    bcrypt_cost: u32,
    request: RegisterRequest,
) -> Result<AuthResponse<UserResponse>, AppError> {
    request.validate()?;

    let email = normalize_email(&request.email);
    let password_hash = hash_password(request.password, bcrypt_cost).await?;

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, password_hash, phone)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(request.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(request.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Email is already registered".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    sqlx::query("INSERT INTO subscriptions (user_id, plan, status) VALUES ($1, 'free', 'active')")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    subscription_service::record_history(
        &mut tx,
        user.id,
        HistoryEvent::Created,
        None,
        Some(PlanTier::Free),
        None,
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = user.id, "User registered");

    Ok(AuthResponse {
        token: jwt.issue(user.id, Role::User)?,
        token_type: "Bearer",
        expires_in: jwt.expires_in(),
        user: user.into(),
    })
}

/// Log a user in.
///
/// Unknown email, wrong password and deactivated accounts all return the
/// same `InvalidCredentials` error.
pub async fn login(
    pool: &DbPool,
    jwt: &JwtKeys,
    request: LoginRequest,
) -> Result<AuthResponse<UserResponse>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(normalize_email(&request.email))
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(request.password, user.password_hash.clone()).await? || !user.is_active {
        return Err(AppError::InvalidCredentials);
    }

    Ok(AuthResponse {
        token: jwt.issue(user.id, Role::User)?,
        token_type: "Bearer",
        expires_in: jwt.expires_in(),
        user: user.into(),
    })
}

pub async fn admin_login(
    pool: &DbPool,
    jwt: &JwtKeys,
    request: LoginRequest,
) -> Result<AuthResponse<AdminResponse>, AppError> {
    let admin = sqlx::query_as::<_, Admin>("SELECT * FROM admins WHERE email = $1")
        .bind(normalize_email(&request.email))
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(request.password, admin.password_hash.clone()).await? {
        return Err(AppError::InvalidCredentials);
    }

    tracing::info!(admin_id = admin.id, "Admin logged in");

    Ok(AuthResponse {
        token: jwt.issue(admin.id, Role::Admin)?,
        token_type: "Bearer",
        expires_in: jwt.expires_in(),
        user: admin.into(),
    })
}

/// Create or update the bootstrap admin account.
pub async fn ensure_admin(
    pool: &DbPool,
    email: &str,
    password: &str,
    bcrypt_cost: u32,
) -> Result<(), AppError> {
    let password_hash = hash_password(password.to_string(), bcrypt_cost).await?;

    sqlx::query(
        r#"
        INSERT INTO admins (name, email, password_hash)
        VALUES ('Administrator', $1, $2)
        ON CONFLICT (email)
        DO UPDATE SET password_hash = EXCLUDED.password_hash, updated_at = NOW()
        "#,
    )
    .bind(normalize_email(email))
    .bind(password_hash)
    .execute(pool)
    .await?;

    Ok(())
}

/// Start a password reset.
///
/// Succeeds whether or not the email is registered, so the endpoint cannot be
/// used to enumerate accounts. For a registered, active user a token is issued
/// and the reset link is logged for delivery.
pub async fn request_password_reset(
    pool: &DbPool,
    reset_tokens: &ResetTokenStore,
    frontend_base_url: &str,
    email: &str,
) -> Result<(), AppError> {
    let user_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM users WHERE email = $1 AND is_active = true")
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await?;

    let Some(user_id) = user_id else {
        tracing::debug!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = reset_tokens.issue(user_id).await;
    let link = format!(
        "{}/reset-password?token={}",
        frontend_base_url.trim_end_matches('/'),
        token
    );
    tracing::info!(user_id, %link, "Password reset link issued");

    Ok(())
}

/// Complete a password reset with a token from `request_password_reset`.
pub async fn reset_password(
    pool: &DbPool,
    reset_tokens: &ResetTokenStore,
    bcrypt_cost: u32,
    request: ResetPasswordRequest,
) -> Result<(), AppError> {
    validate_password(&request.password)?;

    let user_id = reset_tokens
        .consume(&request.token)
        .await
        .ok_or_else(|| AppError::InvalidRequest("Reset token is invalid or expired".to_string()))?;

    let password_hash = hash_password(request.password, bcrypt_cost).await?;

    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    tracing::info!(user_id, "Password reset completed");
    Ok(())
}

pub async fn get_profile(pool: &DbPool, user_id: i64) -> Result<UserResponse, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(user.into())
}

pub async fn update_profile(
    pool: &DbPool,
    user_id: i64,
    request: UpdateProfileRequest,
) -> Result<UserResponse, AppError> {
    if matches!(&request.name, Some(name) if name.trim().is_empty()) {
        return Err(AppError::InvalidRequest("Name cannot be empty".to_string()));
    }

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = COALESCE($2, name),
            phone = COALESCE($3, phone),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.name.as_deref().map(str::trim))
    .bind(request.phone.as_deref().map(str::trim))
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    Ok(user.into())
}

pub async fn change_password(
    pool: &DbPool,
    user_id: i64,
    bcrypt_cost: u32,
    request: ChangePasswordRequest,
) -> Result<(), AppError> {
    validate_password(&request.new_password)?;

    let current_hash: String =
        sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("User"))?;

    if !verify_password(request.current_password, current_hash).await? {
        return Err(AppError::InvalidCredentials);
    }

    let password_hash = hash_password(request.new_password, bcrypt_cost).await?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(password_hash)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn password_hash_verifies() {
        let hash = hash_password("correct-horse".to_string(), 4).await.unwrap();
        assert!(verify_password("correct-horse".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong-horse".to_string(), hash).await.unwrap());
    }
}
