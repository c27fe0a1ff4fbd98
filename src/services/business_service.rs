//! Business directory service.
//!
//! Owner operations always filter by `user_id`, so a business that exists
//! but belongs to someone else is reported as not found.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::business::{Business, BusinessRequest, BusinessSearchQuery},
    services::subscription_service,
};

/// Create a business, enforcing the plan's business limit.
pub async fn create_business(
    pool: &DbPool,
    user_id: i64,
    request: BusinessRequest,
) -> Result<Business, AppError> {
    request.validate()?;

    let mut tx = pool.begin().await?;
    subscription_service::ensure_business_slot(&mut tx, user_id).await?;

    let business = sqlx::query_as::<_, Business>(
        r#"
        INSERT INTO businesses (
            user_id, name, category, description, address, city, phone, email, website, logo_url
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.name.trim())
    .bind(request.category.trim().to_lowercase())
    .bind(request.description)
    .bind(request.address)
    .bind(request.city)
    .bind(request.phone)
    .bind(request.email)
    .bind(request.website)
    .bind(request.logo_url)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id, business_id = %business.id, "Business created");
    Ok(business)
}

pub async fn list_businesses(pool: &DbPool, user_id: i64) -> Result<Vec<Business>, AppError> {
    let businesses = sqlx::query_as::<_, Business>(
        "SELECT * FROM businesses WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(businesses)
}

pub async fn get_business(
    pool: &DbPool,
    user_id: i64,
    business_id: Uuid,
) -> Result<Business, AppError> {
    sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1 AND user_id = $2")
        .bind(business_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Business"))
}

/// Replace a business's details. Suspended businesses are read-only.
pub async fn update_business(
    pool: &DbPool,
    user_id: i64,
    business_id: Uuid,
    request: BusinessRequest,
) -> Result<Business, AppError> {
    request.validate()?;

    let existing = get_business(pool, user_id, business_id).await?;
    if existing.suspended {
        return Err(AppError::ResourceSuspended("Business"));
    }

    let business = sqlx::query_as::<_, Business>(
        r#"
        UPDATE businesses
        SET name = $3, category = $4, description = $5, address = $6, city = $7,
            phone = $8, email = $9, website = $10, logo_url = $11, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(business_id)
    .bind(user_id)
    .bind(request.name.trim())
    .bind(request.category.trim().to_lowercase())
    .bind(request.description)
    .bind(request.address)
    .bind(request.city)
    .bind(request.phone)
    .bind(request.email)
    .bind(request.website)
    .bind(request.logo_url)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Business"))?;

    Ok(business)
}

/// Delete a business and, by cascade, its offers.
pub async fn delete_business(
    pool: &DbPool,
    user_id: i64,
    business_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM businesses WHERE id = $1 AND user_id = $2")
        .bind(business_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Business"));
    }

    tracing::info!(user_id, %business_id, "Business deleted");
    Ok(())
}

/// Public directory search over unsuspended businesses of active owners.
pub async fn search_public(
    pool: &DbPool,
    query: BusinessSearchQuery,
) -> Result<Vec<Business>, AppError> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));
    let city = city_pattern(query.city.as_deref());

    let businesses = sqlx::query_as::<_, Business>(
        r#"
        SELECT b.* FROM businesses b
        JOIN users u ON u.id = b.user_id
        WHERE NOT b.suspended
          AND u.is_active
          AND ($1::text IS NULL OR b.category = lower($1))
          AND ($2::text IS NULL OR b.city ILIKE $2)
          AND ($3::text IS NULL OR b.name ILIKE $3 OR b.description ILIKE $3)
        ORDER BY b.name
        "#,
    )
    .bind(query.category.as_deref().map(str::trim))
    .bind(city)
    .bind(search)
    .fetch_all(pool)
    .await?;

    Ok(businesses)
}

pub async fn get_public(pool: &DbPool, business_id: Uuid) -> Result<Business, AppError> {
    sqlx::query_as::<_, Business>(
        r#"
        SELECT b.* FROM businesses b
        JOIN users u ON u.id = b.user_id
        WHERE b.id = $1 AND NOT b.suspended AND u.is_active
        "#,
    )
    .bind(business_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Business"))
}

/// City filter: a case-insensitive exact match, so wildcards are escaped.
fn city_pattern(city: Option<&str>) -> Option<String> {
    city.map(str::trim).filter(|c| !c.is_empty()).map(escape_like)
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
