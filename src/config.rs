//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HS256 signing key for session tokens
/// - `PAYHERE_MERCHANT_ID` / `PAYHERE_MERCHANT_SECRET` (required): PayHere merchant credentials
/// - `PUBLIC_BASE_URL` (required): externally reachable URL of this API, used for `notify_url`
/// - `FRONTEND_BASE_URL` (required): SPA URL, used for return/cancel and reset links
/// - everything else is optional, see the defaults below
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    pub jwt_secret: String,

    #[serde(default = "default_jwt_expiration_hours")]
    pub jwt_expiration_hours: i64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    pub payhere_merchant_id: String,

    pub payhere_merchant_secret: String,

    /// Use the PayHere sandbox endpoints
    #[serde(default = "default_true")]
    pub payhere_sandbox: bool,

    /// OAuth app credentials for the PayHere subscription API.
    ///
    /// Remote cancellation of recurring payments is skipped when unset.
    pub payhere_app_id: Option<String>,
    pub payhere_app_secret: Option<String>,

    pub public_base_url: String,

    pub frontend_base_url: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    /// Monthly Premium price in cents (150000 = 1500.00)
    #[serde(default = "default_premium_price_cents")]
    pub premium_price_cents: i64,

    #[serde(default = "default_grace_period_days")]
    pub grace_period_days: i64,

    /// Failed renewals tolerated before a Premium subscription is expired
    #[serde(default = "default_max_renewal_attempts")]
    pub max_renewal_attempts: i32,

    #[serde(default = "default_reset_token_ttl_minutes")]
    pub reset_token_ttl_minutes: i64,

    /// How often the subscription lifecycle worker runs
    #[serde(default = "default_lifecycle_interval_secs")]
    pub lifecycle_interval_secs: u64,

    /// Bootstrap admin account, upserted at startup when both are set
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_jwt_expiration_hours() -> i64 {
    24
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "LKR".to_string()
}

fn default_premium_price_cents() -> i64 {
    150_000
}

fn default_grace_period_days() -> i64 {
    7
}

fn default_max_renewal_attempts() -> i32 {
    3
}

fn default_reset_token_ttl_minutes() -> i64 {
    60
}

fn default_lifecycle_interval_secs() -> u64 {
    3600
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Admin bootstrap credentials, if both halves are configured.
    pub fn admin_bootstrap(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email.as_str(), password.as_str()))
            }
            _ => None,
        }
    }

    /// PayHere subscription API credentials, if configured.
    pub fn payhere_api_credentials(&self) -> Option<(&str, &str)> {
        match (&self.payhere_app_id, &self.payhere_app_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }
}
