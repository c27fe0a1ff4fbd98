//! HTTP router assembly.
//!
//! Routes fall into three groups:
//! - public: health, auth, PayHere notifications, directory browsing
//! - user: owner resources and subscriptions, behind `auth_middleware`
//! - admin: review queue and dashboard, behind `admin_middleware`

use axum::{
    Router,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{handlers, middleware, state::AppState};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        // Authentication
        .route("/api/v1/auth/register", post(handlers::auth::register))
        .route("/api/v1/auth/login", post(handlers::auth::login))
        .route(
            "/api/v1/auth/forgot-password",
            post(handlers::auth::forgot_password),
        )
        .route(
            "/api/v1/auth/reset-password",
            post(handlers::auth::reset_password),
        )
        .route("/api/v1/admin/login", post(handlers::auth::admin_login))
        // PayHere server-to-server callback
        .route("/api/v1/payhere/notify", post(handlers::payhere::notify))
        // Directory
        .route(
            "/api/v1/public/businesses",
            get(handlers::businesses::search_public),
        )
        .route(
            "/api/v1/public/businesses/{id}",
            get(handlers::businesses::get_public),
        )
        .route("/api/v1/public/offers", get(handlers::offers::list_public))
        .route(
            "/api/v1/public/offers/{id}",
            get(handlers::offers::get_public),
        );

    let user_routes = Router::new()
        .route(
            "/api/v1/users/me",
            get(handlers::users::get_me).put(handlers::users::update_me),
        )
        .route(
            "/api/v1/users/me/password",
            put(handlers::users::change_password),
        )
        .route(
            "/api/v1/businesses",
            post(handlers::businesses::create_business).get(handlers::businesses::list_businesses),
        )
        .route(
            "/api/v1/businesses/{id}",
            get(handlers::businesses::get_business)
                .put(handlers::businesses::update_business)
                .delete(handlers::businesses::delete_business),
        )
        .route(
            "/api/v1/offers",
            post(handlers::offers::create_offer).get(handlers::offers::list_offers),
        )
        .route(
            "/api/v1/offers/{id}",
            get(handlers::offers::get_offer)
                .put(handlers::offers::update_offer)
                .delete(handlers::offers::delete_offer),
        )
        .route(
            "/api/v1/subscriptions/current",
            get(handlers::subscriptions::current),
        )
        .route(
            "/api/v1/subscriptions/history",
            get(handlers::subscriptions::history),
        )
        .route(
            "/api/v1/subscriptions/checkout",
            post(handlers::subscriptions::checkout),
        )
        .route(
            "/api/v1/subscriptions/cancel",
            post(handlers::subscriptions::cancel),
        )
        .route(
            "/api/v1/subscriptions/downgrade",
            post(handlers::subscriptions::downgrade),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let admin_routes = Router::new()
        .route("/api/v1/admin/offers", get(handlers::admin::list_offers))
        .route(
            "/api/v1/admin/offers/{id}/review",
            post(handlers::admin::review_offer),
        )
        .route("/api/v1/admin/users", get(handlers::admin::list_users))
        .route(
            "/api/v1/admin/users/{id}/status",
            post(handlers::admin::set_user_status),
        )
        .route(
            "/api/v1/admin/users/{id}/payments",
            get(handlers::admin::payment_logs),
        )
        .route("/api/v1/admin/stats", get(handlers::admin::stats))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::admin_middleware,
        ));

    let cors = cors_layer(&state.config.frontend_base_url);

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow the SPA origin; fall back to any origin if it is not a valid header value.
fn cors_layer(frontend_base_url: &str) -> CorsLayer {
    let origin = match HeaderValue::from_str(frontend_base_url.trim_end_matches('/')) {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(frontend_base_url, "Invalid FRONTEND_BASE_URL, allowing any origin");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}
