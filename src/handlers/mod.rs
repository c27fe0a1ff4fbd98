//! HTTP request handlers (route handlers).
//!
//! Handlers stay thin: extract the request, call a service, wrap the result.
//! Owner handlers read the caller from the `AuthContext` the auth middleware
//! injects; admin handlers read `AdminContext`.

pub mod admin;
pub mod auth;
pub mod businesses;
pub mod health;
pub mod offers;
pub mod payhere;
pub mod subscriptions;
pub mod users;
