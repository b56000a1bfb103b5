//! mealdash-server: HTTP API for the mealdash food-delivery platform
//!
//! Storefront routes (menu, checkout, orders, subscriptions, wallet), admin
//! back-office routes (orders, deliveries, coupons, settings, kitchen prep),
//! and inbound webhooks from Stripe and Shipday.

pub mod checkout;
pub mod db;
pub mod http;
pub mod integrations;
pub mod lifecycle;
pub mod models;
pub mod state;

pub use http::{build_router, run_server, ApiError};
pub use state::AppState;
