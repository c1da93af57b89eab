pub mod attendance;
pub mod audit_log;
pub mod auth;
pub mod converts;
pub mod export;
pub mod groups;
pub mod health;
pub mod milestones;
pub mod progress;
pub mod users;

use axum::http::HeaderMap;

/// Best-effort client address for audit entries (the API sits behind a
/// reverse proxy in deployment).
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
