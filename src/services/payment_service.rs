//! PayHere notification processing.
//!
//! # Process
//!
//! 1. Verify merchant id and `md5sig`
//! 2. Resolve the user through the checkout order or the PayHere subscription id
//! 3. Lock the subscription and store the notification; a delivery that is
//!    already stored stops here as a duplicate
//! 4. Apply the subscription transition in the same transaction
//! 5. Stop any PayHere recurrence a downgrade left running

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::{
        payment::{LogKind, PayHereNotification, PaymentEvent},
        subscription::{HistoryEvent, PlanTier, Subscription, SubscriptionStatus},
    },
    services::{
        payhere::PayHereClient,
        subscription_service::{self, lock_subscription},
    },
};

/// Result of processing a notification, returned to PayHere as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    Activated,
    GraceStarted,
    Expired,
    RecurrenceStopped,
    ChargedBack,
    Duplicate,
    Ignored,
}

/// What a verified notification does to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Activate,
    EnterGrace {
        attempts: i32,
        grace_ends_at: DateTime<Utc>,
    },
    Expire {
        attempts: i32,
    },
    ScheduleDowngrade {
        effective_at: DateTime<Utc>,
    },
    ChargeBack,
    Ignore,
}

/// Decide the transition for `event` against the locked subscription.
///
/// Failures, stopped recurrences and chargebacks only matter while the plan
/// is Premium. The failure that reaches `max_renewal_attempts` expires the
/// subscription instead of extending grace.
pub fn plan_notification(
    subscription: &Subscription,
    event: PaymentEvent,
    now: DateTime<Utc>,
    grace_period_days: i64,
    max_renewal_attempts: i32,
) -> NotificationAction {
    let premium = subscription.plan == PlanTier::Premium;

    match event {
        PaymentEvent::Succeeded => NotificationAction::Activate,
        PaymentEvent::Failed if premium => {
            let attempts = subscription.renewal_attempts + 1;
            if attempts >= max_renewal_attempts {
                NotificationAction::Expire { attempts }
            } else {
                NotificationAction::EnterGrace {
                    attempts,
                    grace_ends_at: subscription.grace_deadline(now, grace_period_days),
                }
            }
        }
        PaymentEvent::RecurrenceStopped if premium => NotificationAction::ScheduleDowngrade {
            effective_at: subscription.end_date.filter(|end| *end > now).unwrap_or(now),
        },
        PaymentEvent::ChargedBack if premium => NotificationAction::ChargeBack,
        _ => NotificationAction::Ignore,
    }
}

/// Verify and apply a PayHere notification.
///
/// # Errors
///
/// - `InvalidSignature`: merchant id or `md5sig` does not match
/// - `NotFound`: the order and subscription id are both unknown
/// - `Database`: database error occurred
pub async fn process_notification(
    pool: &DbPool,
    payhere: &PayHereClient,
    config: &Config,
    notification: PayHereNotification,
) -> Result<NotificationOutcome, AppError> {
    if !payhere.verify_notification(&notification) {
        tracing::warn!(
            order_id = %notification.order_id,
            merchant_id = %notification.merchant_id,
            "Rejected PayHere notification with invalid signature"
        );
        return Err(AppError::InvalidSignature);
    }

    let event = notification.event();
    let status_code = notification.status_code();
    let user_id = resolve_user(pool, &notification).await?;

    // custom fields are echoed back unsigned; the checkout log stays authoritative
    if let Some(custom_user) = notification.custom_user_id() {
        if custom_user != user_id {
            tracing::warn!(
                user_id,
                custom_user,
                order_id = %notification.order_id,
                "custom_1 does not match the order owner"
            );
        }
    }
    if let Some(code) = notification.custom_2.as_deref() {
        if PlanTier::from_code(code) != Some(PlanTier::Premium) {
            tracing::warn!(order_id = %notification.order_id, code, "Unexpected plan code in custom_2");
        }
    }

    let payload = serde_json::to_value(&notification)
        .map_err(|e| AppError::Internal(format!("Failed to serialize notification: {e}")))?;

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let subscription = lock_subscription(&mut tx, user_id).await?;

    // PayHere retries until it gets a 200; the unique index keeps one row per delivery
    let stored = sqlx::query(
        r#"
        INSERT INTO subscription_logs (
            user_id, kind, order_id, payment_id, payhere_subscription_id,
            status_code, message_type, amount, currency, verified, payload
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true, $10)
        ON CONFLICT (payment_id, status_code, (COALESCE(message_type, '')))
            WHERE kind = 'notification'
            DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(LogKind::Notification)
    .bind(&notification.order_id)
    .bind(notification.payment_id())
    .bind(notification.subscription_id())
    .bind(status_code)
    .bind(notification.message_type())
    .bind(&notification.payhere_amount)
    .bind(&notification.payhere_currency)
    .bind(payload)
    .execute(&mut *tx)
    .await?;

    if stored.rows_affected() == 0 {
        tx.rollback().await?;
        tracing::info!(
            user_id,
            payment_id = ?notification.payment_id(),
            "Duplicate PayHere notification ignored"
        );
        return Ok(NotificationOutcome::Duplicate);
    }

    let action = plan_notification(
        &subscription,
        event,
        now,
        config.grace_period_days,
        config.max_renewal_attempts,
    );
    let mut stop_after_commit = None;

    let outcome = match action {
        NotificationAction::Activate => {
            subscription_service::activate_premium(
                &mut tx,
                &subscription,
                notification.subscription_id(),
                now,
            )
            .await?;
            NotificationOutcome::Activated
        }
        NotificationAction::Expire { attempts } => {
            stop_after_commit = subscription_service::downgrade_to_free(
                &mut tx,
                &subscription,
                SubscriptionStatus::Expired,
                HistoryEvent::Expired,
                Some(format!("{attempts} failed renewal attempts")),
                now,
            )
            .await?;
            NotificationOutcome::Expired
        }
        NotificationAction::EnterGrace {
            attempts,
            grace_ends_at,
        } => {
            subscription_service::enter_grace(
                &mut tx,
                &subscription,
                grace_ends_at,
                attempts,
                HistoryEvent::RenewalFailed,
                Some(format!(
                    "renewal attempt {attempts} of {} failed",
                    config.max_renewal_attempts
                )),
            )
            .await?;
            NotificationOutcome::GraceStarted
        }
        NotificationAction::ScheduleDowngrade { effective_at } => {
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET auto_renew = false,
                    pending_plan = 'free',
                    scheduled_change_at = $2,
                    updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(effective_at)
            .execute(&mut *tx)
            .await?;

            subscription_service::record_history(
                &mut tx,
                user_id,
                HistoryEvent::RecurringStopped,
                Some(PlanTier::Premium),
                Some(PlanTier::Free),
                Some(format!("effective {}", effective_at.to_rfc3339())),
            )
            .await?;
            NotificationOutcome::RecurrenceStopped
        }
        NotificationAction::ChargeBack => {
            stop_after_commit = subscription_service::downgrade_to_free(
                &mut tx,
                &subscription,
                SubscriptionStatus::Cancelled,
                HistoryEvent::ChargedBack,
                notification.payment_id().map(|id| format!("payment {id} charged back")),
                now,
            )
            .await?;
            NotificationOutcome::ChargedBack
        }
        NotificationAction::Ignore => NotificationOutcome::Ignored,
    };

    tx.commit().await?;

    tracing::info!(
        user_id,
        order_id = %notification.order_id,
        status_code = ?status_code,
        message_type = ?notification.message_type(),
        outcome = ?outcome,
        "PayHere notification processed"
    );

    if let Some(payhere_id) = stop_after_commit {
        subscription_service::stop_recurring(payhere, &payhere_id).await;
    }

    Ok(outcome)
}

/// Find the user a notification belongs to.
///
/// The checkout log is authoritative for first payments; recurring
/// installments are matched on the PayHere subscription id as well.
async fn resolve_user(pool: &DbPool, notification: &PayHereNotification) -> Result<i64, AppError> {
    let from_order: Option<Option<i64>> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM subscription_logs
        WHERE kind = 'checkout' AND order_id = $1
        ORDER BY created_at
        LIMIT 1
        "#,
    )
    .bind(&notification.order_id)
    .fetch_optional(pool)
    .await?;

    if let Some(Some(user_id)) = from_order {
        return Ok(user_id);
    }

    if let Some(subscription_id) = notification.subscription_id() {
        let from_subscription: Option<i64> = sqlx::query_scalar(
            "SELECT user_id FROM subscriptions WHERE payhere_subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(pool)
        .await?;

        if let Some(user_id) = from_subscription {
            return Ok(user_id);
        }
    }

    tracing::warn!(order_id = %notification.order_id, "PayHere notification for unknown order");
    Err(AppError::NotFound("Order"))
}
