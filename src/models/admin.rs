//! Admin dashboard views.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::subscription::{PlanTier, SubscriptionStatus};

/// Row of `GET /api/v1/admin/users`: a user joined with their subscription.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AdminUserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_active: bool,
    pub plan: PlanTier,
    pub effective_plan: PlanTier,
    pub subscription_status: SubscriptionStatus,
    pub end_date: Option<DateTime<Utc>>,
    pub grace_ends_at: Option<DateTime<Utc>>,
    pub business_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Response for `GET /api/v1/admin/stats`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AdminStats {
    pub users: i64,
    pub businesses: i64,
    pub offers: i64,
    pub pending_offers: i64,
    pub approved_offers: i64,

    /// Subscriptions currently paid through or in grace
    pub premium_subscribers: i64,
    pub in_grace: i64,
}
