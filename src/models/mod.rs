//! Data models representing database entities and API payloads.

/// Admin dashboard views
pub mod admin;
/// Business directory entries
pub mod business;
/// Offers and their review state
pub mod offer;
/// PayHere checkout and notification payloads
pub mod payment;
/// Subscriptions, plan tiers and lifecycle rules
pub mod subscription;
/// Users and admins
pub mod user;
