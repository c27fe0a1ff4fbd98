//! Offer service.
//!
//! Every create or edit puts the offer back into the admin review queue.

use chrono::Utc;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::offer::{Offer, OfferListQuery, OfferRequest, PublicOffer, PublicOfferQuery},
    services::subscription_service,
};

/// Check that the business exists, belongs to the user and is not suspended.
async fn ensure_owned_business(
    conn: &mut PgConnection,
    user_id: i64,
    business_id: Uuid,
) -> Result<(), AppError> {
    let suspended: Option<bool> =
        sqlx::query_scalar("SELECT suspended FROM businesses WHERE id = $1 AND user_id = $2")
            .bind(business_id)
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;

    match suspended {
        None => Err(AppError::NotFound("Business")),
        Some(true) => Err(AppError::ResourceSuspended("Business")),
        Some(false) => Ok(()),
    }
}

/// Create a pending offer.
///
/// # Errors
///
/// - `InvalidRequest`: validation failed
/// - `NotFound`: business does not exist or belongs to someone else
/// - `ResourceSuspended`: business is suspended
/// - `PlanLimitReached`: the plan's live-offer limit is used up
pub async fn create_offer(
    pool: &DbPool,
    user_id: i64,
    request: OfferRequest,
) -> Result<Offer, AppError> {
    request.validate(Utc::now())?;

    let mut tx = pool.begin().await?;
    ensure_owned_business(&mut tx, user_id, request.business_id).await?;
    subscription_service::ensure_offer_slot(&mut tx, user_id).await?;

    let offer = sqlx::query_as::<_, Offer>(
        r#"
        INSERT INTO offers (
            business_id, user_id, title, description, discount_percent,
            terms, image_url, start_date, end_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(request.business_id)
    .bind(user_id)
    .bind(request.title.trim())
    .bind(request.description)
    .bind(request.discount_percent)
    .bind(request.terms)
    .bind(request.image_url)
    .bind(request.start_date)
    .bind(request.end_date)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, offer_id = %offer.id, "Offer submitted for review");
    Ok(offer)
}

pub async fn list_offers(
    pool: &DbPool,
    user_id: i64,
    query: OfferListQuery,
) -> Result<Vec<Offer>, AppError> {
    let offers = sqlx::query_as::<_, Offer>(
        r#"
        SELECT * FROM offers
        WHERE user_id = $1 AND ($2::uuid IS NULL OR business_id = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(query.business_id)
    .fetch_all(pool)
    .await?;

    Ok(offers)
}

pub async fn get_offer(pool: &DbPool, user_id: i64, offer_id: Uuid) -> Result<Offer, AppError> {
    sqlx::query_as::<_, Offer>("SELECT * FROM offers WHERE id = $1 AND user_id = $2")
        .bind(offer_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Offer"))
}

/// Replace an offer and send it back for review.
///
/// An offer that no longer counted against the plan (declined or ended)
/// needs a free slot again before it can be revived.
pub async fn update_offer(
    pool: &DbPool,
    user_id: i64,
    offer_id: Uuid,
    request: OfferRequest,
) -> Result<Offer, AppError> {
    let now = Utc::now();
    request.validate(now)?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Offer>(
        "SELECT * FROM offers WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(offer_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Offer"))?;

    if existing.suspended {
        return Err(AppError::ResourceSuspended("Offer"));
    }

    ensure_owned_business(&mut tx, user_id, request.business_id).await?;
    if !existing.is_live(now) {
        subscription_service::ensure_offer_slot(&mut tx, user_id).await?;
    }

    let offer = sqlx::query_as::<_, Offer>(
        r#"
        UPDATE offers
        SET business_id = $3, title = $4, description = $5, discount_percent = $6,
            terms = $7, image_url = $8, start_date = $9, end_date = $10,
            status = 'pending', review_note = NULL, reviewed_by = NULL, reviewed_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(offer_id)
    .bind(user_id)
    .bind(request.business_id)
    .bind(request.title.trim())
    .bind(request.description)
    .bind(request.discount_percent)
    .bind(request.terms)
    .bind(request.image_url)
    .bind(request.start_date)
    .bind(request.end_date)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, %offer_id, "Offer edited and resubmitted for review");
    Ok(offer)
}

pub async fn delete_offer(pool: &DbPool, user_id: i64, offer_id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM offers WHERE id = $1 AND user_id = $2")
        .bind(offer_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Offer"));
    }
    Ok(())
}

const PUBLIC_OFFER_SELECT: &str = r#"
    SELECT o.id, o.business_id, b.name AS business_name, b.category, b.city,
           o.title, o.description, o.discount_percent, o.terms, o.image_url,
           o.start_date, o.end_date
    FROM offers o
    JOIN businesses b ON b.id = o.business_id
    JOIN users u ON u.id = o.user_id
    WHERE o.status = 'approved'
      AND NOT o.suspended
      AND NOT b.suspended
      AND u.is_active
      AND o.start_date <= NOW()
      AND o.end_date >= NOW()
"#;

/// Approved offers currently running, newest first.
pub async fn list_public(
    pool: &DbPool,
    query: PublicOfferQuery,
) -> Result<Vec<PublicOffer>, AppError> {
    let sql = format!(
        "{PUBLIC_OFFER_SELECT}
          AND ($1::uuid IS NULL OR o.business_id = $1)
          AND ($2::text IS NULL OR b.category = lower($2))
        ORDER BY o.start_date DESC"
    );

    let offers = sqlx::query_as::<_, PublicOffer>(&sql)
        .bind(query.business_id)
        .bind(query.category.as_deref().map(str::trim))
        .fetch_all(pool)
        .await?;

    Ok(offers)
}

pub async fn get_public(pool: &DbPool, offer_id: Uuid) -> Result<PublicOffer, AppError> {
    let sql = format!("{PUBLIC_OFFER_SELECT} AND o.id = $1");

    sqlx::query_as::<_, PublicOffer>(&sql)
        .bind(offer_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Offer"))
}
