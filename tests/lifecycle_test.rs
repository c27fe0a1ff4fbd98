mod common;

use chrono::{Duration, Utc};

use offers_directory_server::{
    models::{
        business::BusinessRequest,
        subscription::{DueTransition, PlanTier, SubscriptionStatus},
    },
    services::{business_service, lifecycle},
};

use common::{TestContext, history_events, register_user, setup, subscription};

/// Put a user on Premium with the given row state, bypassing payments.
async fn set_premium(
    ctx: &TestContext,
    user_id: i64,
    status: &str,
    end_offset: &str,
    grace_offset: Option<&str>,
    auto_renew: bool,
) {
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET plan = 'premium',
            status = $2,
            end_date = NOW() + $3::interval,
            grace_ends_at = NOW() + $4::interval,
            auto_renew = $5
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .bind(status)
    .bind(end_offset)
    .bind(grace_offset)
    .bind(auto_renew)
    .execute(&ctx.pool)
    .await
    .expect("set premium");
}

async fn apply(ctx: &TestContext, user_id: i64) -> Option<DueTransition> {
    lifecycle::apply_due(&ctx.pool, &ctx.payhere, &ctx.config, user_id)
        .await
        .expect("apply due")
}

fn business(name: &str) -> BusinessRequest {
    BusinessRequest {
        name: name.to_string(),
        category: "restaurants".to_string(),
        description: None,
        address: None,
        city: Some("Kandy".to_string()),
        phone: None,
        email: None,
        website: None,
        logo_url: None,
    }
}

#[tokio::test]
async fn nothing_due_for_paid_premium() {
    let Some(ctx) = setup("nothing_due_for_paid_premium").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "active", "10 days", None, true).await;

    assert_eq!(apply(&ctx, user_id).await, None);
    assert_eq!(subscription(&ctx, user_id).await.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn scheduled_downgrade_applies_when_due() {
    let Some(ctx) = setup("scheduled_downgrade_applies_when_due").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "active", "-1 minute", None, false).await;
    sqlx::query(
        r#"
        UPDATE subscriptions
        SET pending_plan = 'free', scheduled_change_at = end_date
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .execute(&ctx.pool)
    .await
    .expect("schedule");

    assert_eq!(
        apply(&ctx, user_id).await,
        Some(DueTransition::ApplyScheduledChange(PlanTier::Free))
    );

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert_eq!(sub.pending_plan, None);
    assert_eq!(sub.scheduled_change_at, None);

    let events = history_events(&ctx, user_id).await;
    assert_eq!(
        events.last(),
        Some(&("downgraded".to_string(), Some(PlanTier::Premium)))
    );
}

#[tokio::test]
async fn renewing_premium_enters_grace_after_end_date() {
    let Some(ctx) = setup("renewing_premium_enters_grace_after_end_date").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "active", "-1 hour", None, true).await;

    assert_eq!(apply(&ctx, user_id).await, Some(DueTransition::EnterGrace));

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Premium);
    assert_eq!(sub.status, SubscriptionStatus::Grace);
    let grace_ends_at = sub.grace_ends_at.expect("grace deadline");
    let expected = Utc::now() + Duration::days(ctx.config.grace_period_days);
    assert!((grace_ends_at - expected).num_minutes().abs() < 5);
    assert_eq!(sub.effective_tier(Utc::now()), PlanTier::Premium);

    // A second pass finds nothing new until the deadline
    assert_eq!(apply(&ctx, user_id).await, None);
}

#[tokio::test]
async fn grace_that_ran_out_expires_to_free() {
    let Some(ctx) = setup("grace_that_ran_out_expires_to_free").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "grace", "-8 days", Some("-1 hour"), true).await;

    assert_eq!(apply(&ctx, user_id).await, Some(DueTransition::Expire));

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Expired);
    assert_eq!(sub.grace_ends_at, None);
}

#[tokio::test]
async fn non_renewing_premium_skips_grace() {
    let Some(ctx) = setup("non_renewing_premium_skips_grace").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "active", "-1 hour", None, false).await;

    assert_eq!(apply(&ctx, user_id).await, Some(DueTransition::Expire));

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Expired);
}

#[tokio::test]
async fn expiry_suspends_businesses_over_the_free_limit() {
    let Some(ctx) = setup("expiry_suspends_businesses_over_the_free_limit").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    set_premium(&ctx, user_id, "active", "10 days", None, true).await;

    let oldest = business_service::create_business(&ctx.pool, user_id, business("Spice House"))
        .await
        .expect("first business");
    let newer = business_service::create_business(&ctx.pool, user_id, business("Tea Corner"))
        .await
        .expect("second business");

    set_premium(&ctx, user_id, "grace", "-8 days", Some("-1 minute"), true).await;
    assert_eq!(apply(&ctx, user_id).await, Some(DueTransition::Expire));

    let kept = business_service::get_business(&ctx.pool, user_id, oldest.id)
        .await
        .expect("oldest");
    let suspended = business_service::get_business(&ctx.pool, user_id, newer.id)
        .await
        .expect("newer");
    assert!(!kept.suspended);
    assert!(suspended.suspended);

    let public = business_service::get_public(&ctx.pool, newer.id).await;
    assert!(public.is_err());
}
