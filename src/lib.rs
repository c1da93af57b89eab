// Library exports for the API binary, seed tool, and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use sqlx::PgPool;

use config::Config;
use middleware::{cache::TtlCache, rate_limit::FixedWindowLimiter};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    /// In-process login limiter (the persistent path lives in the
    /// rate_limit_records table).
    pub login_limiter: Arc<FixedWindowLimiter>,
    /// Short-TTL cache in front of the hot list endpoints.
    pub list_cache: Arc<TtlCache>,
}

impl AppState {
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        let login_limiter = Arc::new(FixedWindowLimiter::new(
            config.login_max_attempts,
            config.login_window_seconds,
        ));
        let list_cache = Arc::new(TtlCache::new(config.list_cache_ttl_seconds));
        Self { db, config, login_limiter, list_cache }
    }
}
