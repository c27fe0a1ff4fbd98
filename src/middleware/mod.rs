//! HTTP middleware components.
//!
//! Middleware run before route handlers. They authenticate requests and
//! short-circuit unauthorized ones.

/// Bearer token authentication for users and admins
pub mod auth;
