//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They own database transactions, plan enforcement and PayHere calls.

pub mod admin_service;
pub mod business_service;
pub mod lifecycle;
pub mod offer_service;
pub mod payhere;
pub mod payment_service;
pub mod reset_tokens;
pub mod subscription_service;
pub mod user_service;
