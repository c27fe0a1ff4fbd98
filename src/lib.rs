//! Offers directory server.
//!
//! A REST API where businesses list themselves and publish time-limited
//! offers. Owners subscribe to a Free or Premium plan billed monthly through
//! PayHere; admins review every offer before it goes public.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;
