//! PayHere checkout and payment notification models.
//!
//! # Payment Flow
//!
//! 1. The SPA asks `POST /api/v1/subscriptions/checkout` for a signed
//!    `PayHereCheckout` form and posts it to PayHere
//! 2. PayHere charges the customer and sets up the monthly recurrence
//! 3. PayHere calls `POST /api/v1/payhere/notify` for the first payment and
//!    for every later installment, signed with `md5sig`
//! 4. Every checkout and notification is stored in `subscription_logs`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Form-encoded notification posted by PayHere to the `notify_url`.
///
/// All values are kept as raw strings: the signature is computed over the
/// exact text PayHere sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayHereNotification {
    pub merchant_id: String,
    pub order_id: String,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    pub payhere_amount: String,
    pub payhere_currency: String,
    pub status_code: String,
    pub md5sig: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub method: Option<String>,

    /// `"1"` for recurring payments
    #[serde(default)]
    pub recurring: Option<String>,

    /// Recurring notification kind, e.g. `RECURRING_INSTALLMENT_SUCCESS`
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub item_rec_status: Option<String>,
    #[serde(default)]
    pub item_rec_date_next: Option<String>,

    /// User id set at checkout
    #[serde(default)]
    pub custom_1: Option<String>,

    /// Plan code set at checkout
    #[serde(default)]
    pub custom_2: Option<String>,
}

/// PayHere payment status codes.
pub mod status_code {
    pub const SUCCESS: i32 = 2;
    pub const PENDING: i32 = 0;
    pub const CANCELLED: i32 = -1;
    pub const FAILED: i32 = -2;
    pub const CHARGED_BACK: i32 = -3;
}

/// What a notification means for the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    /// First payment or a recurring installment went through
    Succeeded,
    Pending,
    /// A charge (usually a renewal installment) failed
    Failed,
    /// The customer or PayHere stopped the recurrence
    RecurrenceStopped,
    ChargedBack,
    Unknown,
}

impl PayHereNotification {
    fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn payment_id(&self) -> Option<&str> {
        Self::non_empty(&self.payment_id)
    }

    pub fn subscription_id(&self) -> Option<&str> {
        Self::non_empty(&self.subscription_id)
    }

    pub fn message_type(&self) -> Option<&str> {
        Self::non_empty(&self.message_type)
    }

    pub fn status_code(&self) -> Option<i32> {
        self.status_code.trim().parse().ok()
    }

    /// User id carried in `custom_1`, if it parses.
    pub fn custom_user_id(&self) -> Option<i64> {
        Self::non_empty(&self.custom_1).and_then(|v| v.parse().ok())
    }

    /// Classify the notification.
    ///
    /// Recurring `message_type` values take precedence over the plain status
    /// code because installment notifications reuse the original order's
    /// status fields.
    pub fn event(&self) -> PaymentEvent {
        match self.message_type() {
            Some("AUTHORIZATION_SUCCESS") | Some("RECURRING_INSTALLMENT_SUCCESS") => {
                return PaymentEvent::Succeeded;
            }
            Some("AUTHORIZATION_FAILED") | Some("RECURRING_INSTALLMENT_FAILED") => {
                return PaymentEvent::Failed;
            }
            Some("RECURRING_STOPPED") | Some("RECURRING_COMPLETE") => {
                return PaymentEvent::RecurrenceStopped;
            }
            _ => {}
        }

        match self.status_code() {
            Some(status_code::SUCCESS) => PaymentEvent::Succeeded,
            Some(status_code::PENDING) => PaymentEvent::Pending,
            Some(status_code::CANCELLED) => PaymentEvent::RecurrenceStopped,
            Some(status_code::FAILED) => PaymentEvent::Failed,
            Some(status_code::CHARGED_BACK) => PaymentEvent::ChargedBack,
            _ => PaymentEvent::Unknown,
        }
    }
}

/// Kind of `subscription_logs` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum LogKind {
    Checkout,
    Notification,
}

/// Stored checkout or notification.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SubscriptionLog {
    pub id: Uuid,
    pub user_id: Option<i64>,
    pub kind: LogKind,
    pub order_id: String,
    pub payment_id: Option<String>,
    pub payhere_subscription_id: Option<String>,
    pub status_code: Option<i32>,
    pub message_type: Option<String>,
    pub amount: String,
    pub currency: String,
    pub verified: bool,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Signed PayHere checkout form returned to the SPA.
///
/// The SPA posts these fields unchanged to `checkout_url`. Field names match
/// the PayHere checkout form.
///
/// ```json
/// {
///   "checkout_url": "https://sandbox.payhere.lk/pay/checkout",
///   "fields": {
///     "merchant_id": "1211149",
///     "order_id": "SUB-8f14e45fceea167a5a36dedd4bea2543",
///     "amount": "1500.00",
///     "currency": "LKR",
///     "recurrence": "1 Month",
///     "duration": "Forever",
///     "hash": "D5C0B0...",
///     ...
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PayHereCheckout {
    pub checkout_url: String,
    pub fields: CheckoutFields,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutFields {
    pub merchant_id: String,
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
    pub order_id: String,
    pub items: String,
    pub currency: String,
    pub amount: String,
    pub recurrence: String,
    pub duration: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub custom_1: String,
    pub custom_2: String,
    pub hash: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn notification(status: &str, message_type: Option<&str>) -> PayHereNotification {
        PayHereNotification {
            merchant_id: "1211149".to_string(),
            order_id: "SUB-1".to_string(),
            payment_id: Some("320025071278".to_string()),
            subscription_id: Some("420075032251".to_string()),
            payhere_amount: "1500.00".to_string(),
            payhere_currency: "LKR".to_string(),
            status_code: status.to_string(),
            md5sig: String::new(),
            status_message: None,
            method: Some("VISA".to_string()),
            recurring: Some("1".to_string()),
            message_type: message_type.map(str::to_string),
            item_rec_status: None,
            item_rec_date_next: None,
            custom_1: Some("42".to_string()),
            custom_2: Some("2".to_string()),
        }
    }

    #[test]
    fn classifies_plain_status_codes() {
        assert_eq!(notification("2", None).event(), PaymentEvent::Succeeded);
        assert_eq!(notification("0", None).event(), PaymentEvent::Pending);
        assert_eq!(notification("-1", None).event(), PaymentEvent::RecurrenceStopped);
        assert_eq!(notification("-2", None).event(), PaymentEvent::Failed);
        assert_eq!(notification("-3", None).event(), PaymentEvent::ChargedBack);
        assert_eq!(notification("x", None).event(), PaymentEvent::Unknown);
    }

    #[test]
    fn recurring_message_type_wins_over_status_code() {
        assert_eq!(
            notification("2", Some("RECURRING_INSTALLMENT_FAILED")).event(),
            PaymentEvent::Failed
        );
        assert_eq!(
            notification("2", Some("RECURRING_STOPPED")).event(),
            PaymentEvent::RecurrenceStopped
        );
        assert_eq!(
            notification("-2", Some("RECURRING_INSTALLMENT_SUCCESS")).event(),
            PaymentEvent::Succeeded
        );
    }

    #[test]
    fn empty_optional_fields_are_absent() {
        let mut n = notification("2", Some(""));
        n.subscription_id = Some("  ".to_string());
        n.custom_1 = Some("not-a-number".to_string());
        assert_eq!(n.message_type(), None);
        assert_eq!(n.subscription_id(), None);
        assert_eq!(n.custom_user_id(), None);
        assert_eq!(n.event(), PaymentEvent::Succeeded);
    }
}
