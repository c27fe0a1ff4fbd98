//! Bearer token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the `Authorization: Bearer <jwt>` header
//! 2. Verify its HS256 signature and expiry
//! 3. Check the role the route group requires
//! 4. Inject the authentication context into the request
//!
//! Users and admins share the token format; the `role` claim decides which
//! route group a token opens.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

const ISSUER: &str = "offers-directory";

/// Who a token was issued to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Numeric user or admin id, as a string
    pub sub: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signing and verification keys derived from `JWT_SECRET`.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    /// Token lifetime in seconds, as reported to clients.
    pub fn expires_in(&self) -> i64 {
        self.ttl_hours * 3600
    }

    pub fn issue(&self, subject_id: i64, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.ttl_hours)).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized)
    }
}

/// Authentication context attached to user requests.
///
/// Handlers extract this with `Extension<AuthContext>` and filter every owner
/// query by `user_id`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
}

/// Authentication context attached to admin requests.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin_id: i64,
}

/// Verify the bearer token in `headers` and require `role`.
///
/// Returns 401 for a missing or invalid token and 403 for a valid token of
/// the wrong role.
fn authenticate(keys: &JwtKeys, headers: &HeaderMap, role: Role) -> Result<i64, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let claims = keys.verify(token.trim())?;
    if claims.role != role {
        return Err(AppError::Forbidden);
    }

    claims.sub.parse().map_err(|_| AppError::Unauthorized)
}

/// User authentication middleware.
///
/// # Flow
///
/// 1. Verify the bearer token and require the `user` role
/// 2. Confirm the user still exists and is active
/// 3. Inject `AuthContext` and call the next handler
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = authenticate(&state.jwt, request.headers(), Role::User)?;

    // Deactivated accounts lose access immediately, not at token expiry
    let is_active: bool = sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !is_active {
        return Err(AppError::Unauthorized);
    }

    request.extensions_mut().insert(AuthContext { user_id });

    Ok(next.run(request).await)
}

/// Admin authentication middleware.
pub async fn admin_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let admin_id = authenticate(&state.jwt, request.headers(), Role::Admin)?;

    request.extensions_mut().insert(AdminContext { admin_id });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_token_with_matching_role() {
        let keys = JwtKeys::new("secret", 1);
        let token = keys.issue(42, Role::User).unwrap();
        assert_eq!(authenticate(&keys, &headers_with(&token), Role::User).unwrap(), 42);
    }

    #[test]
    fn wrong_role_is_forbidden() {
        let keys = JwtKeys::new("secret", 1);
        let token = keys.issue(42, Role::User).unwrap();
        let err = authenticate(&keys, &headers_with(&token), Role::Admin).unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = JwtKeys::new("other", 1).issue(42, Role::Admin).unwrap();
        let keys = JwtKeys::new("secret", 1);
        let err = authenticate(&keys, &headers_with(&token), Role::Admin).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = JwtKeys::new("secret", -1);
        let token = keys.issue(42, Role::User).unwrap();
        let err = authenticate(&keys, &headers_with(&token), Role::User).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let keys = JwtKeys::new("secret", 1);
        let err = authenticate(&keys, &HeaderMap::new(), Role::User).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
