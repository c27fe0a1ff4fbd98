//! Background subscription lifecycle worker.
//!
//! Time-driven transitions happen here rather than in request handlers:
//! scheduled cancellations and downgrades, Premium periods that ended
//! without a renewal payment, and grace periods that ran out.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::subscription::{DueTransition, HistoryEvent, PlanTier, SubscriptionStatus},
    services::{
        payhere::PayHereClient,
        subscription_service::{self, lock_subscription},
    },
};

/// Counts from one worker pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleReport {
    pub downgraded: usize,
    pub entered_grace: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Run the worker forever, one pass per `LIFECYCLE_INTERVAL_SECS`.
pub async fn run_worker(pool: DbPool, payhere: PayHereClient, config: Arc<Config>) {
    tracing::info!(
        interval_secs = config.lifecycle_interval_secs,
        "Starting subscription lifecycle worker"
    );

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.lifecycle_interval_secs));

    loop {
        interval.tick().await;

        match run_once(&pool, &payhere, &config).await {
            Ok(report) if report != LifecycleReport::default() => {
                tracing::info!(?report, "Subscription lifecycle pass complete");
            }
            Ok(_) => tracing::debug!("Subscription lifecycle pass found nothing due"),
            Err(e) => tracing::error!("Subscription lifecycle pass failed: {e}"),
        }
    }
}

/// Apply every transition that is due now.
///
/// A failure on one subscription is logged and counted; the pass continues
/// with the rest.
pub async fn run_once(
    pool: &DbPool,
    payhere: &PayHereClient,
    config: &Config,
) -> Result<LifecycleReport, AppError> {
    let candidates: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT user_id FROM subscriptions
        WHERE (scheduled_change_at IS NOT NULL AND scheduled_change_at <= NOW())
           OR (plan = 'premium' AND status = 'active'
               AND (end_date IS NULL OR end_date <= NOW()))
           OR (plan = 'premium' AND status <> 'active'
               AND (grace_ends_at IS NULL OR grace_ends_at <= NOW()))
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut report = LifecycleReport::default();

    for user_id in candidates {
        match apply_due(pool, payhere, config, user_id).await {
            Ok(Some(DueTransition::EnterGrace)) => report.entered_grace += 1,
            Ok(Some(DueTransition::Expire)) => report.expired += 1,
            Ok(Some(DueTransition::ApplyScheduledChange(_))) => report.downgraded += 1,
            Ok(None) => {}
            Err(e) => {
                report.failed += 1;
                tracing::error!(user_id, "Failed to apply subscription transition: {e}");
            }
        }
    }

    Ok(report)
}

/// Re-check and apply the due transition for one user under a row lock.
///
/// Returns the transition that was applied, or `None` if nothing was due.
pub async fn apply_due(
    pool: &DbPool,
    payhere: &PayHereClient,
    config: &Config,
    user_id: i64,
) -> Result<Option<DueTransition>, AppError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let subscription = lock_subscription(&mut tx, user_id).await?;
    let Some(transition) = subscription.due_transition(now) else {
        tx.commit().await?;
        return Ok(None);
    };

    let mut stop_after_commit = None;

    match transition {
        DueTransition::ApplyScheduledChange(PlanTier::Free) => {
            stop_after_commit = subscription_service::downgrade_to_free(
                &mut tx,
                &subscription,
                SubscriptionStatus::Cancelled,
                HistoryEvent::Downgraded,
                Some("scheduled change applied".to_string()),
                now,
            )
            .await?;
        }
        DueTransition::ApplyScheduledChange(PlanTier::Premium) => {
            // Upgrades are never scheduled; drop the stray schedule
            sqlx::query(
                r#"
                UPDATE subscriptions
                SET pending_plan = NULL, scheduled_change_at = NULL, updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
        DueTransition::EnterGrace if subscription.auto_renew => {
            let grace_ends_at = subscription.grace_deadline(now, config.grace_period_days);
            subscription_service::enter_grace(
                &mut tx,
                &subscription,
                grace_ends_at,
                subscription.renewal_attempts,
                HistoryEvent::GraceStarted,
                Some("renewal payment not received".to_string()),
            )
            .await?;
        }
        DueTransition::EnterGrace | DueTransition::Expire => {
            stop_after_commit = subscription_service::downgrade_to_free(
                &mut tx,
                &subscription,
                SubscriptionStatus::Expired,
                HistoryEvent::Expired,
                Some("paid period ended".to_string()),
                now,
            )
            .await?;
        }
    }

    tx.commit().await?;

    if let Some(payhere_id) = stop_after_commit {
        subscription_service::stop_recurring(payhere, &payhere_id).await;
    }

    // A non-renewing Premium period skips grace and expires directly
    let applied = match transition {
        DueTransition::EnterGrace if !subscription.auto_renew => DueTransition::Expire,
        other => other,
    };
    Ok(Some(applied))
}
