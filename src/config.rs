use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub host: String,
    pub port: u16,
    /// Stage number of the milestone awarded for regular attendance.
    pub attendance_stage_number: i32,
    /// Number of Sundays attended before that milestone is auto-completed.
    pub attendance_goal: i64,
    /// When true, login rate limiting uses the rate_limit_records table so the
    /// limit holds across instances; otherwise an in-process counter is used.
    pub rate_limit_persistent: bool,
    pub login_max_attempts: u32,
    pub login_window_seconds: i64,
    pub list_cache_ttl_seconds: i64,
    pub app_base_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "28800".into())
                .parse()?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            attendance_stage_number: env::var("ATTENDANCE_STAGE_NUMBER")
                .unwrap_or_else(|_| "18".into())
                .parse()?,
            attendance_goal: env::var("ATTENDANCE_GOAL")
                .unwrap_or_else(|_| "26".into())
                .parse()?,
            rate_limit_persistent: env::var("RATE_LIMIT_PERSISTENT")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            login_max_attempts: env::var("LOGIN_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
            login_window_seconds: env::var("LOGIN_WINDOW_SECONDS")
                .unwrap_or_else(|_| "900".into())
                .parse()?,
            list_cache_ttl_seconds: env::var("LIST_CACHE_TTL_SECONDS")
                .unwrap_or_else(|_| "15".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
        })
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
