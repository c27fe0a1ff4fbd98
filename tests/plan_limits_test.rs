mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use offers_directory_server::{
    error::AppError,
    models::{
        business::BusinessRequest,
        offer::OfferRequest,
        subscription::{PREMIUM_IN_EFFECT_SQL, PlanTier, Subscription, SubscriptionStatus},
    },
    services::{business_service, offer_service},
};

use common::{TestContext, register_user, setup};

fn business(name: &str) -> BusinessRequest {
    BusinessRequest {
        name: name.to_string(),
        category: "restaurants".to_string(),
        description: None,
        address: None,
        city: None,
        phone: None,
        email: None,
        website: None,
        logo_url: None,
    }
}

fn offer(business_id: Uuid, title: &str) -> OfferRequest {
    let now = Utc::now();
    OfferRequest {
        business_id,
        title: title.to_string(),
        description: None,
        discount_percent: Some(10),
        terms: None,
        image_url: None,
        start_date: now,
        end_date: now + Duration::days(14),
    }
}

fn assert_plan_limit(err: AppError) {
    assert!(matches!(err, AppError::PlanLimitReached(_)), "{err:?}");
    assert_eq!(
        err.status_and_code(),
        (StatusCode::FORBIDDEN, "plan_limit_reached")
    );
}

async fn make_premium(ctx: &TestContext, user_id: i64) {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET plan = 'premium', status = 'active', end_date = NOW() + INTERVAL '30 days',
            auto_renew = true
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&ctx.pool)
    .await
    .expect("make premium");
}

#[tokio::test]
async fn free_plan_allows_one_business() {
    let Some(ctx) = setup("free_plan_allows_one_business").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let limit = PlanTier::Free.limits().max_businesses;

    for n in 0..limit {
        business_service::create_business(&ctx.pool, user_id, business(&format!("Shop {n}")))
            .await
            .expect("within limit");
    }

    let err = business_service::create_business(&ctx.pool, user_id, business("One too many"))
        .await
        .expect_err("over limit");
    assert_plan_limit(err);
}

#[tokio::test]
async fn premium_plan_raises_the_business_limit() {
    let Some(ctx) = setup("premium_plan_raises_the_business_limit").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    make_premium(&ctx, user_id).await;
    let limit = PlanTier::Premium.limits().max_businesses;

    for n in 0..limit {
        business_service::create_business(&ctx.pool, user_id, business(&format!("Shop {n}")))
            .await
            .expect("within limit");
    }

    let err = business_service::create_business(&ctx.pool, user_id, business("One too many"))
        .await
        .expect_err("over limit");
    assert_plan_limit(err);
}

#[tokio::test]
async fn free_plan_caps_live_offers() {
    let Some(ctx) = setup("free_plan_caps_live_offers").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let shop = business_service::create_business(&ctx.pool, user_id, business("Spice House"))
        .await
        .expect("business");
    let limit = PlanTier::Free.limits().max_live_offers;

    for n in 0..limit {
        offer_service::create_offer(&ctx.pool, user_id, offer(shop.id, &format!("Deal {n}")))
            .await
            .expect("within limit");
    }

    let err = offer_service::create_offer(&ctx.pool, user_id, offer(shop.id, "One too many"))
        .await
        .expect_err("over limit");
    assert_plan_limit(err);
}

#[tokio::test]
async fn declined_offers_free_a_slot() {
    let Some(ctx) = setup("declined_offers_free_a_slot").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let shop = business_service::create_business(&ctx.pool, user_id, business("Tea Corner"))
        .await
        .expect("business");

    let mut created = Vec::new();
    for n in 0..PlanTier::Free.limits().max_live_offers {
        let request = offer(shop.id, &format!("Deal {n}"));
        let created_offer = offer_service::create_offer(&ctx.pool, user_id, request)
            .await
            .expect("within limit");
        created.push(created_offer.id);
    }

    sqlx::query("UPDATE offers SET status = 'declined' WHERE id = $1")
        .bind(created[0])
        .execute(&ctx.pool)
        .await
        .expect("decline");

    offer_service::create_offer(&ctx.pool, user_id, offer(shop.id, "Replacement"))
        .await
        .expect("slot freed by declined offer");
}

async fn premium_in_sql(ctx: &TestContext, sub: &Subscription) -> bool {
    let sql = format!(
        "SELECT COALESCE({PREMIUM_IN_EFFECT_SQL}, false) \
         FROM (VALUES ($1::text, $2::text, $3::timestamptz, $4::timestamptz)) \
           AS s(plan, status, end_date, grace_ends_at)"
    );
    sqlx::query_scalar::<_, bool>(&sql)
        .bind(sub.plan.as_str())
        .bind(format!("{:?}", sub.status).to_lowercase())
        .bind(sub.end_date)
        .bind(sub.grace_ends_at)
        .fetch_one(&ctx.pool)
        .await
        .expect("evaluate predicate")
}

fn row(
    plan: PlanTier,
    status: SubscriptionStatus,
    end_date: Option<DateTime<Utc>>,
    grace_ends_at: Option<DateTime<Utc>>,
) -> Subscription {
    let now = Utc::now();
    Subscription {
        id: Uuid::new_v4(),
        user_id: 1,
        plan,
        status,
        start_date: now,
        end_date,
        auto_renew: true,
        payhere_subscription_id: None,
        pending_plan: None,
        scheduled_change_at: None,
        grace_ends_at,
        renewal_attempts: 0,
        last_payment_at: None,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn sql_and_rust_agree_on_effective_premium() {
    let Some(ctx) = setup("sql_and_rust_agree_on_effective_premium").await else {
        return;
    };
    let now = Utc::now();
    let future = Some(now + Duration::days(3));
    let past = Some(now - Duration::days(3));

    let cases = [
        row(PlanTier::Premium, SubscriptionStatus::Active, future, None),
        row(PlanTier::Premium, SubscriptionStatus::Active, past, None),
        row(PlanTier::Premium, SubscriptionStatus::Active, None, None),
        row(PlanTier::Premium, SubscriptionStatus::Grace, past, future),
        row(PlanTier::Premium, SubscriptionStatus::Grace, past, past),
        row(PlanTier::Premium, SubscriptionStatus::Grace, future, None),
        row(PlanTier::Premium, SubscriptionStatus::Cancelled, future, None),
        row(PlanTier::Premium, SubscriptionStatus::Expired, future, future),
        row(PlanTier::Free, SubscriptionStatus::Active, future, None),
        row(PlanTier::Free, SubscriptionStatus::Grace, future, future),
    ];

    for sub in &cases {
        let in_rust = sub.effective_tier(Utc::now()) == PlanTier::Premium;
        let in_sql = premium_in_sql(&ctx, sub).await;
        assert_eq!(in_rust, in_sql, "{:?}/{:?}", sub.plan, sub.status);
    }
}
