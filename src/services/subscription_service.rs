//! Subscription service - plan enforcement and lifecycle transitions.
//!
//! This service handles:
//! - Plan limit checks for businesses and offers
//! - PayHere checkout creation
//! - Scheduling cancellations and downgrades
//! - Activation, grace and downgrade transitions
//! - Suspending and restoring resources when the plan changes
//!
//! # Atomicity
//!
//! Transitions touch the subscription, businesses, offers and history rows.
//! They take a `&mut PgConnection` so callers run them inside one database
//! transaction, with the subscription row locked `FOR UPDATE`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    models::{
        business::Business,
        offer::{Offer, OfferStatus},
        payment::{CheckoutFields, LogKind, PayHereCheckout},
        subscription::{
            HistoryEvent, PlanLimits, PlanTier, PlanUsage, ScheduledChangeResponse, Subscription,
            SubscriptionHistory, SubscriptionOverview, SubscriptionStatus,
        },
        user::User,
    },
    services::payhere::{PayHereClient, format_amount},
};

/// Fetch a user's subscription, creating the Free row if it is missing.
pub async fn get_subscription(pool: &DbPool, user_id: i64) -> Result<Subscription, AppError> {
    let mut conn = pool.acquire().await?;
    ensure_subscription(&mut conn, user_id).await?;

    let subscription =
        sqlx::query_as::<_, Subscription>("SELECT * FROM subscriptions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(subscription)
}

async fn ensure_subscription(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO subscriptions (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Lock a user's subscription row for the rest of the transaction.
///
/// Serializes plan checks and lifecycle transitions per user, so two
/// concurrent creates cannot both pass the limit check.
pub async fn lock_subscription(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<Subscription, AppError> {
    ensure_subscription(conn, user_id).await?;

    let subscription = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(subscription)
}

/// Count the resources that count against plan limits.
pub async fn usage(conn: &mut PgConnection, user_id: i64) -> Result<PlanUsage, AppError> {
    let (businesses, live_offers): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM businesses WHERE user_id = $1 AND NOT suspended),
            (SELECT COUNT(*) FROM offers
              WHERE user_id = $1
                AND status <> 'declined'
                AND NOT suspended
                AND end_date >= NOW())
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PlanUsage {
        businesses,
        live_offers,
    })
}

/// Fail with `PlanLimitReached` unless one more business fits the plan.
///
/// Must be called inside the transaction that inserts the business.
pub async fn ensure_business_slot(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    let subscription = lock_subscription(conn, user_id).await?;
    let tier = subscription.effective_tier(Utc::now());
    let limits = tier.limits();
    let usage = usage(conn, user_id).await?;

    if usage.businesses >= limits.max_businesses {
        return Err(AppError::PlanLimitReached(format!(
            "The {} plan allows {} business(es). Upgrade to add more.",
            tier.as_str(),
            limits.max_businesses
        )));
    }
    Ok(())
}

/// Fail with `PlanLimitReached` unless one more live offer fits the plan.
pub async fn ensure_offer_slot(conn: &mut PgConnection, user_id: i64) -> Result<(), AppError> {
    let subscription = lock_subscription(conn, user_id).await?;
    let tier = subscription.effective_tier(Utc::now());
    let limits = tier.limits();
    let usage = usage(conn, user_id).await?;

    if usage.live_offers >= limits.max_live_offers {
        return Err(AppError::PlanLimitReached(format!(
            "The {} plan allows {} active offer(s). Upgrade or wait for an offer to end.",
            tier.as_str(),
            limits.max_live_offers
        )));
    }
    Ok(())
}

/// Subscription with effective tier, limits and usage.
pub async fn overview(pool: &DbPool, user_id: i64) -> Result<SubscriptionOverview, AppError> {
    let subscription = get_subscription(pool, user_id).await?;
    let mut conn = pool.acquire().await?;
    let usage = usage(&mut conn, user_id).await?;

    let now = Utc::now();
    let effective_plan = subscription.effective_tier(now);

    Ok(SubscriptionOverview {
        effective_plan,
        limits: effective_plan.limits(),
        usage,
        days_remaining: subscription.days_remaining(now),
        can_upgrade: subscription.can_start_checkout(),
        subscription,
    })
}

/// Subscription history, newest first.
pub async fn history(pool: &DbPool, user_id: i64) -> Result<Vec<SubscriptionHistory>, AppError> {
    let entries = sqlx::query_as::<_, SubscriptionHistory>(
        "SELECT * FROM subscription_history WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

pub async fn record_history(
    conn: &mut PgConnection,
    user_id: i64,
    event: HistoryEvent,
    from_plan: Option<PlanTier>,
    to_plan: Option<PlanTier>,
    note: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO subscription_history (user_id, event, from_plan, to_plan, note)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(event.as_str())
    .bind(from_plan)
    .bind(to_plan)
    .bind(note)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Create a signed PayHere checkout for a Premium subscription.
///
/// # Process
///
/// 1. Check the user may start a checkout (see `Subscription::can_start_checkout`)
/// 2. Generate an order id and sign the form
/// 3. Store a `checkout` log row so the notification can be traced back to the user
///
/// # Errors
///
/// - `InvalidRequest`: a plan other than Premium was requested
/// - `Conflict`: a Premium recurrence is still running
pub async fn create_checkout(
    pool: &DbPool,
    payhere: &PayHereClient,
    config: &Config,
    user_id: i64,
    plan: PlanTier,
) -> Result<PayHereCheckout, AppError> {
    if plan != PlanTier::Premium {
        return Err(AppError::InvalidRequest(
            "Only the premium plan can be purchased".to_string(),
        ));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let subscription = get_subscription(pool, user_id).await?;
    if !subscription.can_start_checkout() {
        return Err(AppError::Conflict(
            "Premium subscription is still renewing".to_string(),
        ));
    }

    let order_id = format!("SUB-{}", Uuid::new_v4().simple());
    let amount = format_amount(config.premium_price_cents);
    let hash = payhere.checkout_hash(&order_id, &amount, &config.currency);
    let (first_name, last_name) = split_name(&user.name);
    let frontend = config.frontend_base_url.trim_end_matches('/');

    let fields = CheckoutFields {
        merchant_id: payhere.merchant_id().to_string(),
        return_url: format!("{frontend}/subscription/success"),
        cancel_url: format!("{frontend}/subscription/cancel"),
        notify_url: format!(
            "{}/api/v1/payhere/notify",
            config.public_base_url.trim_end_matches('/')
        ),
        order_id: order_id.clone(),
        items: "Premium plan (monthly)".to_string(),
        currency: config.currency.clone(),
        amount: amount.clone(),
        recurrence: "1 Month".to_string(),
        duration: "Forever".to_string(),
        first_name,
        last_name,
        email: user.email,
        phone: user.phone.unwrap_or_default(),
        address: String::new(),
        city: String::new(),
        country: "Sri Lanka".to_string(),
        custom_1: user_id.to_string(),
        custom_2: plan.code().to_string(),
        hash,
    };

    let payload = serde_json::to_value(&fields)
        .map_err(|e| AppError::Internal(format!("Failed to serialize checkout: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO subscription_logs (user_id, kind, order_id, amount, currency, verified, payload)
        VALUES ($1, $2, $3, $4, $5, true, $6)
        "#,
    )
    .bind(user_id)
    .bind(LogKind::Checkout)
    .bind(&order_id)
    .bind(&amount)
    .bind(&config.currency)
    .bind(payload)
    .execute(pool)
    .await?;

    tracing::info!(user_id, %order_id, "PayHere checkout created");

    Ok(PayHereCheckout {
        checkout_url: payhere.checkout_url().to_string(),
        fields,
    })
}

/// Schedule the move back to Free at the end of the paid period.
///
/// Used by both cancel and downgrade; `event` records which one the user
/// asked for. Scheduling twice is a no-op. When merchant API credentials are
/// configured the PayHere recurrence is stopped so no further installment is
/// charged; a failure there is logged and the schedule still stands.
pub async fn schedule_downgrade(
    pool: &DbPool,
    payhere: &PayHereClient,
    user_id: i64,
    event: HistoryEvent,
) -> Result<ScheduledChangeResponse, AppError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let subscription = lock_subscription(&mut tx, user_id).await?;
    if subscription.effective_tier(now) != PlanTier::Premium {
        return Err(AppError::InvalidRequest(
            "No active premium subscription to cancel".to_string(),
        ));
    }

    if subscription.has_scheduled_downgrade() {
        tx.commit().await?;
        return Ok(ScheduledChangeResponse {
            pending_plan: PlanTier::Free,
            effective_at: subscription.scheduled_change_at,
            subscription,
        });
    }

    let effective_at = match subscription.status {
        SubscriptionStatus::Grace => subscription.grace_ends_at,
        _ => subscription.end_date,
    }
    .unwrap_or(now);

    let updated = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET auto_renew = false,
            pending_plan = 'free',
            scheduled_change_at = $2,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(effective_at)
    .fetch_one(&mut *tx)
    .await?;

    record_history(
        &mut tx,
        user_id,
        event,
        Some(PlanTier::Premium),
        Some(PlanTier::Free),
        Some(format!("effective {}", effective_at.to_rfc3339())),
    )
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, event = event.as_str(), %effective_at, "Plan change scheduled");

    if subscription.auto_renew {
        if let Some(payhere_id) = subscription.payhere_subscription_id.as_deref() {
            stop_recurring(payhere, payhere_id).await;
        }
    }

    Ok(ScheduledChangeResponse {
        pending_plan: PlanTier::Free,
        effective_at: Some(effective_at),
        subscription: updated,
    })
}

/// Best-effort remote cancellation of a PayHere recurrence.
pub async fn stop_recurring(payhere: &PayHereClient, payhere_subscription_id: &str) {
    if !payhere.can_manage_subscriptions() {
        tracing::warn!(
            payhere_subscription_id,
            "PayHere API credentials not configured, recurrence must be stopped manually"
        );
        return;
    }

    if let Err(e) = payhere.cancel_subscription(payhere_subscription_id).await {
        tracing::error!(payhere_subscription_id, "Failed to stop PayHere recurrence: {e}");
    }
}

/// Apply a successful payment: activate or extend Premium.
///
/// A payment on a Premium row is a renewal even when it lands after
/// `end_date`, before the lifecycle worker has moved the row to grace.
pub async fn activate_premium(
    conn: &mut PgConnection,
    subscription: &Subscription,
    payhere_subscription_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Subscription, AppError> {
    let from_plan = subscription.plan;
    let end_date = subscription.next_end_date(now);

    let updated = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET start_date = CASE WHEN plan = 'premium' AND status IN ('active', 'grace')
                              THEN start_date ELSE $3 END,
            plan = 'premium',
            status = 'active',
            end_date = $2,
            auto_renew = true,
            payhere_subscription_id = COALESCE($4, payhere_subscription_id),
            pending_plan = NULL,
            scheduled_change_at = NULL,
            grace_ends_at = NULL,
            renewal_attempts = 0,
            last_payment_at = $3,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING *
        "#,
    )
    .bind(subscription.user_id)
    .bind(end_date)
    .bind(now)
    .bind(payhere_subscription_id)
    .fetch_one(&mut *conn)
    .await?;

    restore_resources(conn, subscription.user_id, PlanTier::Premium.limits(), now).await?;

    let event = if from_plan == PlanTier::Free {
        HistoryEvent::Activated
    } else {
        HistoryEvent::Renewed
    };
    record_history(
        conn,
        subscription.user_id,
        event,
        Some(from_plan),
        Some(PlanTier::Premium),
        Some(format!("paid through {}", end_date.to_rfc3339())),
    )
    .await?;

    tracing::info!(
        user_id = subscription.user_id,
        event = event.as_str(),
        %end_date,
        "Premium subscription paid"
    );

    Ok(updated)
}

/// Put a Premium subscription into its grace period.
pub async fn enter_grace(
    conn: &mut PgConnection,
    subscription: &Subscription,
    grace_ends_at: DateTime<Utc>,
    renewal_attempts: i32,
    event: HistoryEvent,
    note: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET status = 'grace',
            grace_ends_at = $2,
            renewal_attempts = $3,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(subscription.user_id)
    .bind(grace_ends_at)
    .bind(renewal_attempts)
    .execute(&mut *conn)
    .await?;

    record_history(
        conn,
        subscription.user_id,
        event,
        Some(PlanTier::Premium),
        Some(PlanTier::Premium),
        note,
    )
    .await?;

    tracing::info!(
        user_id = subscription.user_id,
        %grace_ends_at,
        "Subscription entered grace period"
    );
    Ok(())
}

/// Move a subscription to Free and suspend whatever exceeds the Free limits.
///
/// Returns the PayHere subscription id whose recurrence is still running, so
/// the caller can stop it after the transaction commits.
pub async fn downgrade_to_free(
    conn: &mut PgConnection,
    subscription: &Subscription,
    status: SubscriptionStatus,
    event: HistoryEvent,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<String>, AppError> {
    let from_plan = subscription.plan;

    sqlx::query(
        r#"
        UPDATE subscriptions
        SET plan = 'free',
            status = $2,
            end_date = NULL,
            auto_renew = false,
            payhere_subscription_id = NULL,
            pending_plan = NULL,
            scheduled_change_at = NULL,
            grace_ends_at = NULL,
            renewal_attempts = 0,
            updated_at = NOW()
        WHERE user_id = $1
        "#,
    )
    .bind(subscription.user_id)
    .bind(status)
    .execute(&mut *conn)
    .await?;

    let (businesses, offers) =
        enforce_limits(conn, subscription.user_id, PlanTier::Free.limits(), now).await?;

    record_history(
        conn,
        subscription.user_id,
        event,
        Some(from_plan),
        Some(PlanTier::Free),
        note,
    )
    .await?;

    tracing::info!(
        user_id = subscription.user_id,
        event = event.as_str(),
        suspended_businesses = businesses,
        suspended_offers = offers,
        "Subscription downgraded to free"
    );

    let still_recurring = subscription
        .payhere_subscription_id
        .clone()
        .filter(|_| subscription.auto_renew);
    Ok(still_recurring)
}

/// Resources to suspend or restore after a plan change.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResourceChanges {
    pub businesses: Vec<Uuid>,
    pub offers: Vec<Uuid>,
}

/// Pick what to suspend so the user fits `limits`.
///
/// The oldest businesses are kept. Offers of suspended businesses are
/// suspended; of the remaining live offers the oldest are kept. Inputs must
/// be ordered by `created_at`.
pub fn plan_suspensions(
    businesses: &[Business],
    offers: &[Offer],
    limits: PlanLimits,
    now: DateTime<Utc>,
) -> ResourceChanges {
    let mut changes = ResourceChanges::default();
    let mut kept: HashSet<Uuid> = HashSet::new();

    for business in businesses.iter().filter(|b| !b.suspended) {
        if (kept.len() as i64) < limits.max_businesses {
            kept.insert(business.id);
        } else {
            changes.businesses.push(business.id);
        }
    }

    let mut live = 0;
    for offer in offers.iter().filter(|o| !o.suspended) {
        if !kept.contains(&offer.business_id) {
            changes.offers.push(offer.id);
        } else if offer.is_live(now) {
            if live < limits.max_live_offers {
                live += 1;
            } else {
                changes.offers.push(offer.id);
            }
        }
    }

    changes
}

/// Pick what to unsuspend now that `limits` allow more.
///
/// Suspended businesses come back oldest first while slots remain. Suspended
/// offers of active businesses come back oldest first; offers that no longer
/// count as live (ended or declined) are restored regardless of slots.
pub fn plan_restorations(
    businesses: &[Business],
    offers: &[Offer],
    limits: PlanLimits,
    now: DateTime<Utc>,
) -> ResourceChanges {
    let mut changes = ResourceChanges::default();

    let mut active: HashSet<Uuid> = businesses
        .iter()
        .filter(|b| !b.suspended)
        .map(|b| b.id)
        .collect();

    for business in businesses.iter().filter(|b| b.suspended) {
        if (active.len() as i64) < limits.max_businesses {
            active.insert(business.id);
            changes.businesses.push(business.id);
        }
    }

    let mut live = offers
        .iter()
        .filter(|o| !o.suspended && active.contains(&o.business_id) && o.is_live(now))
        .count() as i64;

    for offer in offers.iter().filter(|o| o.suspended) {
        if !active.contains(&offer.business_id) {
            continue;
        }
        let counts = offer.status != OfferStatus::Declined && offer.end_date >= now;
        if !counts {
            changes.offers.push(offer.id);
        } else if live < limits.max_live_offers {
            live += 1;
            changes.offers.push(offer.id);
        }
    }

    changes
}

async fn load_resources(
    conn: &mut PgConnection,
    user_id: i64,
) -> Result<(Vec<Business>, Vec<Offer>), AppError> {
    let businesses = sqlx::query_as::<_, Business>(
        "SELECT * FROM businesses WHERE user_id = $1 ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    let offers = sqlx::query_as::<_, Offer>(
        "SELECT * FROM offers WHERE user_id = $1 ORDER BY created_at, id",
    )
    .bind(user_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok((businesses, offers))
}

async fn set_suspended(
    conn: &mut PgConnection,
    changes: &ResourceChanges,
    suspended: bool,
) -> Result<(), AppError> {
    if !changes.businesses.is_empty() {
        sqlx::query(
            "UPDATE businesses SET suspended = $2, updated_at = NOW() WHERE id = ANY($1)",
        )
        .bind(&changes.businesses)
        .bind(suspended)
        .execute(&mut *conn)
        .await?;
    }

    if !changes.offers.is_empty() {
        sqlx::query("UPDATE offers SET suspended = $2, updated_at = NOW() WHERE id = ANY($1)")
            .bind(&changes.offers)
            .bind(suspended)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Suspend resources over `limits`. Returns (businesses, offers) suspended.
pub async fn enforce_limits(
    conn: &mut PgConnection,
    user_id: i64,
    limits: PlanLimits,
    now: DateTime<Utc>,
) -> Result<(usize, usize), AppError> {
    let (businesses, offers) = load_resources(conn, user_id).await?;
    let changes = plan_suspensions(&businesses, &offers, limits, now);
    set_suspended(conn, &changes, true).await?;
    Ok((changes.businesses.len(), changes.offers.len()))
}

/// Unsuspend resources that fit `limits`.
pub async fn restore_resources(
    conn: &mut PgConnection,
    user_id: i64,
    limits: PlanLimits,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let (businesses, offers) = load_resources(conn, user_id).await?;
    let changes = plan_restorations(&businesses, &offers, limits, now);
    set_suspended(conn, &changes, false).await
}

/// Split a display name into PayHere's first/last name fields.
fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.rsplit_once(' ') {
        Some((first, last)) => (first.trim().to_string(), last.to_string()),
        None => (name.to_string(), String::new()),
    }
}
