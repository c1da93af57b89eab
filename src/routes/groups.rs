use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        group::{CreateGroupRequest, UpdateGroupRequest},
    },
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        groups::GroupService,
    },
    AppState,
};

const CACHE_KEY: &str = "/groups";

#[derive(Deserialize)]
pub struct ListQuery {
    /// Archived groups are hidden unless ?all=true.
    #[serde(default)]
    pub all: bool,
}

pub async fn list_groups(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let cache_key = if params.all { "/groups?all=true" } else { CACHE_KEY };
    if let Some(cached) = state.list_cache.get(cache_key) {
        return Ok(Json(cached));
    }
    let groups = GroupService::list(&state.db, params.all).await?;
    let value = serde_json::to_value(groups).unwrap_or_else(|_| json!([]));
    state.list_cache.put(cache_key, value.clone());
    Ok(Json(value))
}

pub async fn create_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_superadmin()?;
    let group = GroupService::create(&state.db, &body).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "group.create")
            .resource("group", group.id)
            .label(format!("{} ({})", group.name, group.year))
            .ip(client_ip(&headers)),
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(group).unwrap_or_default())))
}

pub async fn update_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateGroupRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let group = GroupService::update(&state.db, id, &body).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "group.update")
            .resource("group", id)
            .label(format!("{} ({})", group.name, group.year))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(group).unwrap_or_default()))
}

pub async fn delete_group(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_superadmin()?;
    GroupService::delete(&state.db, id).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "group.delete")
            .resource("group", id)
            .ip(client_ip(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
