mod common;

use chrono::{Duration, Utc};

use offers_directory_server::{
    error::AppError,
    models::subscription::{PlanTier, SubscriptionStatus},
    services::{
        payment_service::{NotificationOutcome, process_notification},
        subscription_service,
    },
};

use common::{
    TestContext, history_events, register_user, setup, signed_notification, start_checkout,
    subscription,
};

async fn premium_user(ctx: &TestContext) -> (i64, String) {
    let user_id = register_user(ctx).await;
    let order_id = start_checkout(ctx, user_id).await;
    let first = signed_notification(&order_id, user_id, "2", None);

    let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, first)
        .await
        .expect("first payment");
    assert_eq!(outcome, NotificationOutcome::Activated);

    (user_id, order_id)
}

async fn notification_logs(ctx: &TestContext, user_id: i64) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM subscription_logs WHERE user_id = $1 AND kind = 'notification'",
    )
    .bind(user_id)
    .fetch_one(&ctx.pool)
    .await
    .expect("count logs")
}

#[tokio::test]
async fn first_payment_activates_premium_for_one_month() {
    let Some(ctx) = setup("first_payment_activates_premium_for_one_month").await else {
        return;
    };
    let (user_id, _) = premium_user(&ctx).await;

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Premium);
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert!(sub.auto_renew);
    let end = sub.end_date.expect("end date");
    assert!(end > Utc::now() + Duration::days(27) && end < Utc::now() + Duration::days(32));

    let events = history_events(&ctx, user_id).await;
    assert_eq!(
        events.last(),
        Some(&("activated".to_string(), Some(PlanTier::Free)))
    );
}

#[tokio::test]
async fn concurrent_redelivery_is_applied_once() {
    let Some(ctx) = setup("concurrent_redelivery_is_applied_once").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let order_id = start_checkout(&ctx, user_id).await;
    let delivery = signed_notification(&order_id, user_id, "2", None);

    let (a, b) = tokio::join!(
        process_notification(&ctx.pool, &ctx.payhere, &ctx.config, delivery.clone()),
        process_notification(&ctx.pool, &ctx.payhere, &ctx.config, delivery),
    );
    let mut outcomes = vec![a.expect("first delivery"), b.expect("second delivery")];
    outcomes.sort_by_key(|o| format!("{o:?}"));

    assert_eq!(
        outcomes,
        vec![NotificationOutcome::Activated, NotificationOutcome::Duplicate]
    );
    assert_eq!(notification_logs(&ctx, user_id).await, 1);

    let events = history_events(&ctx, user_id).await;
    assert_eq!(events.iter().filter(|(e, _)| e == "activated").count(), 1);
    assert!(!events.iter().any(|(e, _)| e == "renewed"));

    let end = subscription(&ctx, user_id).await.end_date.expect("end date");
    assert!(end < Utc::now() + Duration::days(32));
}

#[tokio::test]
async fn sequential_redelivery_is_a_duplicate() {
    let Some(ctx) = setup("sequential_redelivery_is_a_duplicate").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let order_id = start_checkout(&ctx, user_id).await;
    let delivery = signed_notification(&order_id, user_id, "2", None);

    let first = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, delivery.clone())
        .await
        .expect("first");
    let again = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, delivery)
        .await
        .expect("again");

    assert_eq!(first, NotificationOutcome::Activated);
    assert_eq!(again, NotificationOutcome::Duplicate);
    assert_eq!(notification_logs(&ctx, user_id).await, 1);
}

#[tokio::test]
async fn failed_renewals_use_grace_until_the_attempt_limit() {
    let Some(ctx) = setup("failed_renewals_use_grace_until_the_attempt_limit").await else {
        return;
    };
    let (user_id, order_id) = premium_user(&ctx).await;
    let failure =
        || signed_notification(&order_id, user_id, "-2", Some("RECURRING_INSTALLMENT_FAILED"));

    for attempt in 1..ctx.config.max_renewal_attempts {
        let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, failure())
            .await
            .expect("failed renewal");
        assert_eq!(outcome, NotificationOutcome::GraceStarted);

        let sub = subscription(&ctx, user_id).await;
        assert_eq!(sub.status, SubscriptionStatus::Grace);
        assert_eq!(sub.renewal_attempts, attempt);
        assert_eq!(sub.effective_tier(Utc::now()), PlanTier::Premium);
    }

    let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, failure())
        .await
        .expect("last failed renewal");
    assert_eq!(outcome, NotificationOutcome::Expired);

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Expired);
    assert_eq!(sub.renewal_attempts, 0);
}

#[tokio::test]
async fn stopped_recurrence_schedules_free_at_period_end() {
    let Some(ctx) = setup("stopped_recurrence_schedules_free_at_period_end").await else {
        return;
    };
    let (user_id, order_id) = premium_user(&ctx).await;
    let paid_through = subscription(&ctx, user_id).await.end_date;

    let stop = signed_notification(&order_id, user_id, "-1", Some("RECURRING_STOPPED"));
    let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, stop)
        .await
        .expect("stop");
    assert_eq!(outcome, NotificationOutcome::RecurrenceStopped);

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Premium);
    assert!(!sub.auto_renew);
    assert_eq!(sub.pending_plan, Some(PlanTier::Free));
    assert_eq!(sub.scheduled_change_at, paid_through);
    assert!(sub.can_start_checkout());
}

#[tokio::test]
async fn chargeback_cancels_premium_immediately() {
    let Some(ctx) = setup("chargeback_cancels_premium_immediately").await else {
        return;
    };
    let (user_id, order_id) = premium_user(&ctx).await;

    let chargeback = signed_notification(&order_id, user_id, "-3", None);
    let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, chargeback)
        .await
        .expect("chargeback");
    assert_eq!(outcome, NotificationOutcome::ChargedBack);

    let sub = subscription(&ctx, user_id).await;
    assert_eq!(sub.plan, PlanTier::Free);
    assert_eq!(sub.status, SubscriptionStatus::Cancelled);
    assert_eq!(sub.payhere_subscription_id, None);
}

#[tokio::test]
async fn lapsed_recurring_premium_cannot_checkout_and_installment_renews() {
    let Some(ctx) = setup("lapsed_recurring_premium_cannot_checkout_and_installment_renews").await
    else {
        return;
    };
    let (user_id, order_id) = premium_user(&ctx).await;

    // Paid period just ended; the lifecycle worker has not run yet
    sqlx::query(
        "UPDATE subscriptions SET end_date = NOW() - INTERVAL '10 minutes' WHERE user_id = $1",
    )
    .bind(user_id)
    .execute(&ctx.pool)
    .await
    .expect("age subscription");

    let checkout = subscription_service::create_checkout(
        &ctx.pool,
        &ctx.payhere,
        &ctx.config,
        user_id,
        PlanTier::Premium,
    )
    .await;
    assert!(matches!(checkout, Err(AppError::Conflict(_))));

    let installment =
        signed_notification(&order_id, user_id, "2", Some("RECURRING_INSTALLMENT_SUCCESS"));
    let outcome = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, installment)
        .await
        .expect("installment");
    assert_eq!(outcome, NotificationOutcome::Activated);

    let events = history_events(&ctx, user_id).await;
    assert_eq!(
        events.last(),
        Some(&("renewed".to_string(), Some(PlanTier::Premium)))
    );
    assert!(subscription(&ctx, user_id).await.end_date.expect("end") > Utc::now());
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let Some(ctx) = setup("unknown_order_is_not_found").await else {
        return;
    };
    let user_id = register_user(&ctx).await;
    let mut stray = signed_notification("SUB-never-issued", user_id, "2", None);
    stray.subscription_id = None;

    let result = process_notification(&ctx.pool, &ctx.payhere, &ctx.config, stray).await;
    assert!(matches!(result, Err(AppError::NotFound("Order"))));
}
