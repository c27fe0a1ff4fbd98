//! Shared setup for database-backed tests.
//!
//! Tests need a PostgreSQL server in `DATABASE_URL`; without one they print a
//! notice and return early.

#![allow(dead_code)]

use md5::{Digest, Md5};
use uuid::Uuid;

use offers_directory_server::{
    config::Config,
    db::{self, DbPool},
    middleware::auth::JwtKeys,
    models::{
        payment::PayHereNotification,
        subscription::{PlanTier, Subscription},
        user::RegisterRequest,
    },
    services::{payhere::PayHereClient, subscription_service, user_service},
};

pub const MERCHANT_ID: &str = "1211149";
pub const MERCHANT_SECRET: &str = "merchant-secret";

pub struct TestContext {
    pub pool: DbPool,
    pub config: Config,
    pub payhere: PayHereClient,
}

pub fn test_config(database_url: String) -> Config {
    Config {
        database_url,
        server_port: 3000,
        jwt_secret: "integration-test-secret".to_string(),
        jwt_expiration_hours: 1,
        bcrypt_cost: 4,
        payhere_merchant_id: MERCHANT_ID.to_string(),
        payhere_merchant_secret: MERCHANT_SECRET.to_string(),
        payhere_sandbox: true,
        payhere_app_id: None,
        payhere_app_secret: None,
        public_base_url: "https://api.example.lk".to_string(),
        frontend_base_url: "https://app.example.lk".to_string(),
        currency: "LKR".to_string(),
        premium_price_cents: 150_000,
        grace_period_days: 7,
        max_renewal_attempts: 3,
        reset_token_ttl_minutes: 60,
        lifecycle_interval_secs: 3600,
        admin_email: None,
        admin_password: None,
    }
}

/// Connect and migrate, or `None` when no database is available.
pub async fn setup(test_name: &str) -> Option<TestContext> {
    dotenvy::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping {test_name}: DATABASE_URL not set");
        return None;
    };

    let pool = match db::create_pool(&database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Skipping {test_name}: cannot connect to database: {e}");
            return None;
        }
    };
    db::run_migrations(&pool).await.expect("migrations");

    let config = test_config(database_url);
    let payhere = PayHereClient::new(&config).expect("payhere client");

    Some(TestContext {
        pool,
        config,
        payhere,
    })
}

/// Register a fresh Free user and return its id.
pub async fn register_user(ctx: &TestContext) -> i64 {
    let jwt = JwtKeys::new(&ctx.config.jwt_secret, 1);
    let request = RegisterRequest {
        name: "Nimal Perera".to_string(),
        email: format!("owner-{}@example.lk", Uuid::new_v4().simple()),
        password: "correct-horse-battery".to_string(),
        phone: None,
    };

    user_service::register(&ctx.pool, &jwt, 4, request)
        .await
        .expect("register")
        .user
        .id
}

/// Start a Premium checkout and return its order id.
pub async fn start_checkout(ctx: &TestContext, user_id: i64) -> String {
    subscription_service::create_checkout(
        &ctx.pool,
        &ctx.payhere,
        &ctx.config,
        user_id,
        PlanTier::Premium,
    )
    .await
    .expect("checkout")
    .fields
    .order_id
}

fn md5_upper(input: &str) -> String {
    hex::encode_upper(Md5::digest(input.as_bytes()))
}

/// A notification for `order_id` signed with the test merchant secret.
pub fn signed_notification(
    order_id: &str,
    user_id: i64,
    status_code: &str,
    message_type: Option<&str>,
) -> PayHereNotification {
    let amount = "1500.00";
    let currency = "LKR";
    let md5sig = md5_upper(&format!(
        "{MERCHANT_ID}{order_id}{amount}{currency}{status_code}{}",
        md5_upper(MERCHANT_SECRET)
    ));

    PayHereNotification {
        merchant_id: MERCHANT_ID.to_string(),
        order_id: order_id.to_string(),
        payment_id: Some(format!("3200{}", Uuid::new_v4().simple())),
        subscription_id: Some(format!("4200-{user_id}")),
        payhere_amount: amount.to_string(),
        payhere_currency: currency.to_string(),
        status_code: status_code.to_string(),
        md5sig,
        status_message: None,
        method: Some("VISA".to_string()),
        recurring: Some("1".to_string()),
        message_type: message_type.map(str::to_string),
        item_rec_status: None,
        item_rec_date_next: None,
        custom_1: Some(user_id.to_string()),
        custom_2: Some(PlanTier::Premium.code().to_string()),
    }
}

pub async fn subscription(ctx: &TestContext, user_id: i64) -> Subscription {
    subscription_service::get_subscription(&ctx.pool, user_id)
        .await
        .expect("subscription")
}

/// History events, oldest first.
pub async fn history_events(ctx: &TestContext, user_id: i64) -> Vec<(String, Option<PlanTier>)> {
    let mut entries = subscription_service::history(&ctx.pool, user_id)
        .await
        .expect("history");
    entries.reverse();
    entries
        .into_iter()
        .map(|entry| (entry.event, entry.from_plan))
        .collect()
}
