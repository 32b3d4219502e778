pub mod ai;
pub mod api;
pub mod auth;
pub mod cache;
pub mod database;
pub mod route;

use once_cell::sync::Lazy;

pub static APP_NAME: Lazy<String> =
    Lazy::new(|| std::env::var("APP_NAME").unwrap_or_else(|_| "colloquy".to_string()));

/// Minimum token balance required before a turn is dispatched to a provider.
pub static MIN_BALANCE_THRESHOLD: Lazy<i64> = Lazy::new(|| {
    std::env::var("MIN_BALANCE_THRESHOLD")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(100)
});
