use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        user::{CreateUserRequest, UpdateUserRequest},
    },
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        users::UserService,
    },
    AppState,
};

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let users = UserService::list(&state.db).await?;
    Ok(Json(serde_json::to_value(users).unwrap_or_else(|_| json!([]))))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_superadmin()?;
    let created = UserService::create(&state.db, &body).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "user.create")
            .resource("user", created.id)
            .label(created.username.clone())
            .ip(client_ip(&headers)),
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(created).unwrap_or_default())))
}

pub async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let updated = UserService::update(&state.db, id, &body).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "user.update")
            .resource("user", id)
            .label(updated.username.clone())
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(updated).unwrap_or_default()))
}
