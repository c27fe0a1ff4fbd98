//! User and admin account models.
//!
//! This module defines:
//! - `User` / `Admin`: database entities
//! - Registration, login and profile request bodies
//! - `UserResponse` / `AuthResponse`: bodies returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Represents a registered business owner.
///
/// # Database Table
///
/// Maps to the `users` table. The numeric `id` is the owner key referenced by
/// businesses, offers and the user's subscription.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,

    /// Always stored lower-cased
    pub email: String,

    /// bcrypt hash, never serialized
    pub password_hash: String,

    pub phone: Option<String>,

    /// Deactivated users cannot log in and are hidden from the public directory
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents an administrator who reviews offers.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Admin {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/auth/register`.
///
/// ```json
/// {
///   "name": "Nimal Perera",
///   "email": "nimal@example.lk",
///   "password": "correct-horse",
///   "phone": "+94771234567"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::InvalidRequest("Name is required".to_string()));
        }
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

/// Request body for user and admin login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Request body for `PUT /api/v1/users/me`. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public view of a user (no password hash).
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

/// Public view of an admin.
#[derive(Debug, Serialize)]
pub struct AdminResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<Admin> for AdminResponse {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id,
            name: admin.name,
            email: admin.email,
        }
    }
}

/// Returned by register and login.
///
/// ```json
/// {
///   "token": "eyJhbGciOi...",
///   "token_type": "Bearer",
///   "expires_in": 86400,
///   "user": { "id": 42, "name": "Nimal Perera", ... }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct AuthResponse<T> {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: T,
}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Minimal structural check: one `@`, non-empty local part, dotted domain.
pub fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::InvalidRequest("A valid email is required".to_string()))
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(validate_email("owner@shop.lk").is_ok());
        assert!(validate_email("  owner@shop.lk ").is_ok());
        assert!(validate_email("owner").is_err());
        assert!(validate_email("@shop.lk").is_err());
        assert!(validate_email("owner@shop").is_err());
        assert!(validate_email("owner@shop.").is_err());
        assert!(validate_email("a@b@c.lk").is_err());
    }

    #[test]
    fn register_request_requires_name_and_long_password() {
        let mut request = RegisterRequest {
            name: "Nimal".to_string(),
            email: "nimal@example.lk".to_string(),
            password: "short".to_string(),
            phone: None,
        };
        assert!(request.validate().is_err());

        request.password = "long-enough".to_string();
        assert!(request.validate().is_ok());

        request.name = "   ".to_string();
        assert!(request.validate().is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email(" Owner@Shop.LK "), "owner@shop.lk");
    }
}
