//! PayHere gateway integration.
//!
//! This module handles:
//! - Checkout hash generation for the hosted checkout form
//! - `md5sig` verification of payment notifications
//! - Cancelling recurring subscriptions through the PayHere merchant API
//!
//! # Signatures
//!
//! PayHere signs with MD5 over concatenated fields and the upper-cased MD5 of
//! the merchant secret:
//!
//! ```text
//! hash   = UPPER(MD5(merchant_id + order_id + amount + currency + UPPER(MD5(secret))))
//! md5sig = UPPER(MD5(merchant_id + order_id + payhere_amount + payhere_currency
//!                    + status_code + UPPER(MD5(secret))))
//! ```

use std::time::Duration;

use md5::{Digest, Md5};
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::error::AppError;
use crate::models::payment::PayHereNotification;

const SANDBOX_CHECKOUT_URL: &str = "https://sandbox.payhere.lk/pay/checkout";
const LIVE_CHECKOUT_URL: &str = "https://www.payhere.lk/pay/checkout";
const SANDBOX_API_BASE: &str = "https://sandbox.payhere.lk/merchant/v1";
const LIVE_API_BASE: &str = "https://www.payhere.lk/merchant/v1";

/// PayHere client shared through `AppState`.
#[derive(Clone)]
pub struct PayHereClient {
    http: reqwest::Client,
    merchant_id: String,
    merchant_secret: String,
    sandbox: bool,
    api_credentials: Option<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct OAuthToken {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: i32,
    #[serde(default)]
    msg: Option<String>,
}

impl PayHereClient {
    /// Build a client from configuration.
    ///
    /// Requests to the merchant API time out after 10 seconds.
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {e}")))?;

        Ok(Self {
            http,
            merchant_id: config.payhere_merchant_id.clone(),
            merchant_secret: config.payhere_merchant_secret.clone(),
            sandbox: config.payhere_sandbox,
            api_credentials: config
                .payhere_api_credentials()
                .map(|(id, secret)| (id.to_string(), secret.to_string())),
        })
    }

    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn checkout_url(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_CHECKOUT_URL
        } else {
            LIVE_CHECKOUT_URL
        }
    }

    fn api_base(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_API_BASE
        } else {
            LIVE_API_BASE
        }
    }

    /// Hash for the checkout form.
    pub fn checkout_hash(&self, order_id: &str, amount: &str, currency: &str) -> String {
        md5_upper(&format!(
            "{}{}{}{}{}",
            self.merchant_id,
            order_id,
            amount,
            currency,
            md5_upper(&self.merchant_secret)
        ))
    }

    /// Check that a notification was sent by PayHere for this merchant.
    pub fn verify_notification(&self, notification: &PayHereNotification) -> bool {
        if notification.merchant_id.trim() != self.merchant_id {
            return false;
        }

        let expected = md5_upper(&format!(
            "{}{}{}{}{}{}",
            notification.merchant_id.trim(),
            notification.order_id,
            notification.payhere_amount,
            notification.payhere_currency,
            notification.status_code,
            md5_upper(&self.merchant_secret)
        ));

        expected.eq_ignore_ascii_case(notification.md5sig.trim())
    }

    /// Whether merchant API credentials are configured.
    pub fn can_manage_subscriptions(&self) -> bool {
        self.api_credentials.is_some()
    }

    /// Stop a recurring subscription at PayHere.
    ///
    /// # Process
    ///
    /// 1. Exchange the app credentials for an OAuth access token
    /// 2. `POST /subscription/cancel` with the PayHere subscription id
    ///
    /// # Errors
    ///
    /// `Internal` if credentials are missing, the request fails, or PayHere
    /// answers with a non-success status.
    pub async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), AppError> {
        let (app_id, app_secret) = self
            .api_credentials
            .as_ref()
            .ok_or_else(|| AppError::Internal("PayHere API credentials not configured".into()))?;

        let token: OAuthToken = self
            .http
            .post(format!("{}/oauth/token", self.api_base()))
            .basic_auth(app_id, Some(app_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| AppError::Internal(format!("PayHere token request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("PayHere token response invalid: {e}")))?;

        let response: ApiResponse = self
            .http
            .post(format!("{}/subscription/cancel", self.api_base()))
            .bearer_auth(&token.access_token)
            .json(&json!({ "subscription_id": subscription_id }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| AppError::Internal(format!("PayHere cancel request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("PayHere cancel response invalid: {e}")))?;

        if response.status != 1 {
            return Err(AppError::Internal(format!(
                "PayHere refused to cancel subscription {subscription_id}: {}",
                response.msg.unwrap_or_default()
            )));
        }

        tracing::info!(subscription_id, "PayHere recurring subscription cancelled");
        Ok(())
    }
}

/// Format cents the way PayHere expects amounts: two decimals, no separators.
pub fn format_amount(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, (cents % 100).abs())
}

fn md5_upper(input: &str) -> String {
    hex::encode_upper(Md5::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::test_config;
    use crate::models::payment::tests::notification;

    fn client() -> PayHereClient {
        PayHereClient::new(&test_config()).unwrap()
    }

    fn signed(status: &str) -> PayHereNotification {
        let mut n = notification(status, None);
        n.md5sig = md5_upper(&format!(
            "1211149SUB-11500.00LKR{status}{}",
            md5_upper("merchant-secret")
        ));
        n
    }

    #[test]
    fn secret_digest_is_upper_hex() {
        assert_eq!(md5_upper("merchant-secret"), "98532A5713B020CFE966902199C9E591");
    }

    #[test]
    fn checkout_hash_matches_known_value() {
        assert_eq!(
            client().checkout_hash("SUB-1", "1500.00", "LKR"),
            "38C43B40D551A13AC384FD4CC3B75770"
        );
    }

    #[test]
    fn verifies_known_notification_signature() {
        let mut n = notification("2", None);
        n.md5sig = "83132E10A98EC5903C9AF5F767DD8F97".to_string();
        assert!(client().verify_notification(&n));

        n.md5sig = n.md5sig.to_lowercase();
        assert!(client().verify_notification(&n));
    }

    #[test]
    fn tampered_status_fails_verification() {
        let mut n = signed("-2");
        assert!(client().verify_notification(&n));

        n.status_code = "2".to_string();
        assert!(!client().verify_notification(&n));
    }

    #[test]
    fn tampered_amount_fails_verification() {
        let mut n = signed("2");
        n.payhere_amount = "15.00".to_string();
        assert!(!client().verify_notification(&n));
    }

    #[test]
    fn other_merchant_fails_verification() {
        let mut n = signed("2");
        n.merchant_id = "999".to_string();
        assert!(!client().verify_notification(&n));
    }

    #[test]
    fn amounts_have_two_decimals() {
        assert_eq!(format_amount(150_000), "1500.00");
        assert_eq!(format_amount(105), "1.05");
        assert_eq!(format_amount(0), "0.00");
    }

    #[test]
    fn sandbox_switches_urls() {
        let mut config = test_config();
        assert_eq!(client().checkout_url(), SANDBOX_CHECKOUT_URL);

        config.payhere_sandbox = false;
        let live = PayHereClient::new(&config).unwrap();
        assert_eq!(live.checkout_url(), LIVE_CHECKOUT_URL);
        assert!(!live.can_manage_subscriptions());
    }
}
