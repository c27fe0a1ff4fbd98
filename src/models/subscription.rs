//! Subscription models, plan tiers and lifecycle rules.
//!
//! A user has exactly one subscription row. Its lifecycle:
//!
//! ```text
//!            payment success                  end_date passes, no payment
//!   free ─────────────────────► premium/active ───────────────────────────► premium/grace
//!    ▲                            │      ▲    │                                  │   │
//!    │   scheduled change due     │      └────┼──── payment success ─────────────┘   │
//!    ├────────────────────────────┘           │                                      │
//!    │   chargeback / too many failures       │                                      │
//!    ├────────────────────────────────────────┘                                      │
//!    │   grace_ends_at passes                                                        │
//!    └───────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The rules here are pure functions of a `Subscription` and a timestamp so
//! both the request handlers and the lifecycle worker agree on them.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription plan.
///
/// PayHere checkouts carry the plan as a numeric code in `custom_2`
/// (`"1"` = Free, `"2"` = Premium).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Premium,
}

/// Resource limits attached to a plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanLimits {
    pub max_businesses: i64,

    /// Offers that are not declined, not suspended and not yet ended
    pub max_live_offers: i64,
}

impl PlanTier {
    pub fn limits(self) -> PlanLimits {
        match self {
            PlanTier::Free => PlanLimits {
                max_businesses: 1,
                max_live_offers: 3,
            },
            PlanTier::Premium => PlanLimits {
                max_businesses: 3,
                max_live_offers: 15,
            },
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            PlanTier::Free => "1",
            PlanTier::Premium => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(PlanTier::Free),
            "2" => Some(PlanTier::Premium),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Premium => "premium",
        }
    }
}

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,

    /// Premium renewal is overdue; features stay on until `grace_ends_at`
    Grace,

    Cancelled,
    Expired,
}

/// Represents a subscription record from the database.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: i64,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,

    /// Paid-through date. `None` on the Free plan.
    pub end_date: Option<DateTime<Utc>>,

    /// Whether PayHere is expected to charge the next installment
    pub auto_renew: bool,

    #[serde(skip_serializing)]
    pub payhere_subscription_id: Option<String>,

    /// Plan the subscription moves to at `scheduled_change_at`
    pub pending_plan: Option<PlanTier>,
    pub scheduled_change_at: Option<DateTime<Utc>>,

    pub grace_ends_at: Option<DateTime<Utc>>,

    /// Consecutive failed renewal installments
    pub renewal_attempts: i32,

    pub last_payment_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `Subscription::effective_tier` as a SQL predicate over a `subscriptions`
/// row aliased `s`. True while Premium applies.
pub const PREMIUM_IN_EFFECT_SQL: &str = "(s.plan = 'premium' \
     AND ((s.status = 'active' AND s.end_date > NOW()) \
       OR (s.status = 'grace' AND s.grace_ends_at > NOW())))";

/// Transition the lifecycle worker must apply to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueTransition {
    /// A cancellation or downgrade scheduled by the user has come due
    ApplyScheduledChange(PlanTier),

    /// Paid period ended without a renewal payment
    EnterGrace,

    /// Grace period ran out
    Expire,
}

impl Subscription {
    /// Tier whose limits and features currently apply.
    ///
    /// Premium only counts while paid through (`active` with `end_date` in the
    /// future) or inside a grace period.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> PlanTier {
        if self.plan != PlanTier::Premium {
            return PlanTier::Free;
        }

        let paid_through = matches!(self.end_date, Some(end) if end > now);
        let in_grace = matches!(self.grace_ends_at, Some(ends) if ends > now);

        match self.status {
            SubscriptionStatus::Active if paid_through => PlanTier::Premium,
            SubscriptionStatus::Grace if in_grace => PlanTier::Premium,
            _ => PlanTier::Free,
        }
    }

    pub fn has_scheduled_downgrade(&self) -> bool {
        self.pending_plan == Some(PlanTier::Free) && self.scheduled_change_at.is_some()
    }

    /// Whether a new Premium checkout may be started.
    ///
    /// Refused while a PayHere recurrence is still running, even after
    /// `end_date` has passed and before the lifecycle worker catches up;
    /// a second checkout would start a second recurrence.
    pub fn can_start_checkout(&self) -> bool {
        !(self.plan == PlanTier::Premium && self.auto_renew && !self.has_scheduled_downgrade())
    }

    /// Whole days left on the paid period (or grace period), if any.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        let until = match self.status {
            SubscriptionStatus::Grace => self.grace_ends_at,
            _ => self.end_date,
        }?;
        Some((until - now).num_days().max(0))
    }

    /// Work the lifecycle worker has to do for this subscription, if any.
    pub fn due_transition(&self, now: DateTime<Utc>) -> Option<DueTransition> {
        if let (Some(plan), Some(at)) = (self.pending_plan, self.scheduled_change_at) {
            if at <= now {
                return Some(DueTransition::ApplyScheduledChange(plan));
            }
        }

        if self.plan != PlanTier::Premium {
            return None;
        }

        match self.status {
            SubscriptionStatus::Active => match self.end_date {
                Some(end) if end <= now => Some(DueTransition::EnterGrace),
                None => Some(DueTransition::Expire),
                _ => None,
            },
            SubscriptionStatus::Grace => match self.grace_ends_at {
                Some(ends) if ends > now => None,
                _ => Some(DueTransition::Expire),
            },
            SubscriptionStatus::Cancelled | SubscriptionStatus::Expired => {
                Some(DueTransition::Expire)
            }
        }
    }

    /// Paid-through date after a successful payment of one month.
    ///
    /// Payments made before the current period ends extend it; late payments
    /// start a fresh month from `now`.
    pub fn next_end_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let base = match self.end_date {
            Some(end) if self.plan == PlanTier::Premium && end > now => end,
            _ => now,
        };
        add_billing_period(base)
    }

    /// Grace deadline after a failed renewal.
    pub fn grace_deadline(&self, now: DateTime<Utc>, grace_period_days: i64) -> DateTime<Utc> {
        let base = match self.end_date {
            Some(end) if end > now => end,
            _ => now,
        };
        base + Duration::days(grace_period_days)
    }
}

/// One monthly billing period, matching the PayHere `"1 Month"` recurrence.
pub fn add_billing_period(from: DateTime<Utc>) -> DateTime<Utc> {
    from.checked_add_months(Months::new(1))
        .unwrap_or(from + Duration::days(30))
}

/// Audit trail entry for a lifecycle transition.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SubscriptionHistory {
    pub id: Uuid,
    pub user_id: i64,
    pub event: String,
    pub from_plan: Option<PlanTier>,
    pub to_plan: Option<PlanTier>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle events recorded in `subscription_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryEvent {
    Created,
    Activated,
    Renewed,
    RenewalFailed,
    GraceStarted,
    RecurringStopped,
    CancelScheduled,
    DowngradeScheduled,
    Downgraded,
    Expired,
    ChargedBack,
}

impl HistoryEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryEvent::Created => "created",
            HistoryEvent::Activated => "activated",
            HistoryEvent::Renewed => "renewed",
            HistoryEvent::RenewalFailed => "renewal_failed",
            HistoryEvent::GraceStarted => "grace_started",
            HistoryEvent::RecurringStopped => "recurring_stopped",
            HistoryEvent::CancelScheduled => "cancel_scheduled",
            HistoryEvent::DowngradeScheduled => "downgrade_scheduled",
            HistoryEvent::Downgraded => "downgraded",
            HistoryEvent::Expired => "expired",
            HistoryEvent::ChargedBack => "charged_back",
        }
    }
}

/// Current resource usage against the effective plan.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanUsage {
    pub businesses: i64,
    pub live_offers: i64,
}

/// Response for `GET /api/v1/subscriptions/current`.
#[derive(Debug, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Subscription,
    pub effective_plan: PlanTier,
    pub limits: PlanLimits,
    pub usage: PlanUsage,
    pub days_remaining: Option<i64>,
    pub can_upgrade: bool,
}

/// Request body for `POST /api/v1/subscriptions/checkout`.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan: PlanTier,
}

/// Response for cancel / downgrade scheduling.
#[derive(Debug, Serialize)]
pub struct ScheduledChangeResponse {
    pub pending_plan: PlanTier,
    pub effective_at: Option<DateTime<Utc>>,
    pub subscription: Subscription,
}
