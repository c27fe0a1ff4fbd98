//! Admin operations: offer review, user management and dashboard stats.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        admin::{AdminStats, AdminUserView},
        offer::{AdminOfferQuery, Offer, OfferStatus, ReviewRequest},
        payment::SubscriptionLog,
        subscription::PREMIUM_IN_EFFECT_SQL,
    },
};

/// Offers in the review queue, oldest first so nothing starves.
pub async fn list_offers(pool: &DbPool, query: AdminOfferQuery) -> Result<Vec<Offer>, AppError> {
    let status = query.status.unwrap_or(OfferStatus::Pending);

    let offers = sqlx::query_as::<_, Offer>(
        "SELECT * FROM offers WHERE status = $1 ORDER BY created_at ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await?;

    Ok(offers)
}

/// Approve or decline an offer.
///
/// Re-reviewing an already reviewed offer is allowed and overwrites the
/// earlier decision.
pub async fn review_offer(
    pool: &DbPool,
    admin_id: i64,
    offer_id: Uuid,
    request: ReviewRequest,
) -> Result<Offer, AppError> {
    let status: OfferStatus = request.decision.into();
    let note = request
        .note
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    let offer = sqlx::query_as::<_, Offer>(
        r#"
        UPDATE offers
        SET status = $2, review_note = $3, reviewed_by = $4, reviewed_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(offer_id)
    .bind(status)
    .bind(note)
    .bind(admin_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Offer"))?;

    tracing::info!(admin_id, %offer_id, status = ?offer.status, "Offer reviewed");
    Ok(offer)
}

pub async fn list_users(pool: &DbPool) -> Result<Vec<AdminUserView>, AppError> {
    let sql = format!(
        r#"
        SELECT
            u.id, u.name, u.email, u.phone, u.is_active,
            s.plan,
            CASE WHEN {premium} THEN 'premium' ELSE 'free' END AS effective_plan,
            s.status AS subscription_status,
            s.end_date,
            s.grace_ends_at,
            (SELECT COUNT(*) FROM businesses b WHERE b.user_id = u.id) AS business_count,
            u.created_at
        FROM users u
        JOIN subscriptions s ON s.user_id = u.id
        ORDER BY u.created_at DESC
        "#,
        premium = PREMIUM_IN_EFFECT_SQL
    );

    let users = sqlx::query_as::<_, AdminUserView>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(users)
}

/// Activate or deactivate a user account.
///
/// Deactivated users cannot log in, their tokens stop working and their
/// listings drop out of the public directory.
pub async fn set_user_active(
    pool: &DbPool,
    admin_id: i64,
    user_id: i64,
    is_active: bool,
) -> Result<(), AppError> {
    let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
        .bind(user_id)
        .bind(is_active)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User"));
    }

    tracing::info!(admin_id, user_id, is_active, "User status changed");
    Ok(())
}

/// Checkouts and PayHere notifications recorded for a user, newest first.
pub async fn payment_logs(pool: &DbPool, user_id: i64) -> Result<Vec<SubscriptionLog>, AppError> {
    let logs = sqlx::query_as::<_, SubscriptionLog>(
        "SELECT * FROM subscription_logs WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}

pub async fn stats(pool: &DbPool) -> Result<AdminStats, AppError> {
    let sql = format!(
        r#"
        SELECT
            (SELECT COUNT(*) FROM users) AS users,
            (SELECT COUNT(*) FROM businesses) AS businesses,
            (SELECT COUNT(*) FROM offers) AS offers,
            (SELECT COUNT(*) FROM offers WHERE status = 'pending') AS pending_offers,
            (SELECT COUNT(*) FROM offers WHERE status = 'approved') AS approved_offers,
            (SELECT COUNT(*) FROM subscriptions s WHERE {premium}) AS premium_subscribers,
            (SELECT COUNT(*) FROM subscriptions WHERE status = 'grace') AS in_grace
        "#,
        premium = PREMIUM_IN_EFFECT_SQL
    );

    let stats = sqlx::query_as::<_, AdminStats>(&sql)
        .fetch_one(pool)
        .await?;

    Ok(stats)
}
