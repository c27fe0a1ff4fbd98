//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    middleware::auth::JwtKeys,
    services::{payhere::PayHereClient, reset_tokens::ResetTokenStore},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,

    /// Password reset tokens live in memory only; a restart invalidates them
    pub reset_tokens: Arc<ResetTokenStore>,
    pub payhere: PayHereClient,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Result<Self, AppError> {
        let payhere = PayHereClient::new(&config)?;
        let jwt = JwtKeys::new(&config.jwt_secret, config.jwt_expiration_hours);
        let reset_tokens = ResetTokenStore::new(config.reset_token_ttl_minutes);

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            reset_tokens: Arc::new(reset_tokens),
            payhere,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
