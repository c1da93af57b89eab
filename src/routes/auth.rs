use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    middleware::rate_limit::check_persistent,
    models::auth::{AuthenticatedUser, LoginRequest, MeResponse},
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        auth::AuthService,
    },
    AppState,
};

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let key = body.username.trim().to_lowercase();
    if state.config.rate_limit_persistent {
        check_persistent(
            &state.db,
            &key,
            "login",
            state.config.login_max_attempts,
            state.config.login_window_seconds,
        )
        .await?;
    } else {
        state.login_limiter.check(&format!("login:{key}"))?;
    }

    let response = AuthService::login(&state.db, &state.config, &body.username, &body.password)
        .await?;

    audit::log(
        state.db.clone(),
        AuditEntry {
            user_id: Some(response.user.id),
            username: Some(response.user.username.clone()),
            action: "auth.login".into(),
            resource_type: None,
            resource_id: None,
            resource_label: None,
            ip_address: client_ip(&headers),
        },
    );

    Ok(Json(serde_json::to_value(response).unwrap_or_else(|_| json!({}))))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MeResponse>, ApiError> {
    let (first_name, last_name): (String, String) =
        sqlx::query_as("SELECT first_name, last_name FROM users WHERE id = $1")
            .bind(user.user_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".into()))?;

    Ok(Json(MeResponse {
        id: user.user_id,
        username: user.username,
        first_name,
        last_name,
        role: user.role,
        group_id: user.group_id,
    }))
}
