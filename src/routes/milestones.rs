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
        milestone::{CreateMilestoneRequest, SetActiveRequest, UpdateMilestoneRequest},
    },
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        milestones::MilestoneService,
    },
    AppState,
};

const CACHE_KEY: &str = "/milestones";

pub async fn list_milestones(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    if let Some(cached) = state.list_cache.get(CACHE_KEY) {
        return Ok(Json(cached));
    }
    let milestones = MilestoneService::list(&state.db).await?;
    let value = serde_json::to_value(milestones).unwrap_or_else(|_| json!([]));
    state.list_cache.put(CACHE_KEY, value.clone());
    Ok(Json(value))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<CreateMilestoneRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    user.require_superadmin()?;
    let milestone = MilestoneService::create(&state.db, &body).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "milestone.create")
            .resource("milestone", milestone.id)
            .label(milestone.stage_name.clone())
            .ip(client_ip(&headers)),
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(milestone).unwrap_or_default())))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMilestoneRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let milestone = MilestoneService::update(&state.db, id, &body).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "milestone.update")
            .resource("milestone", id)
            .label(milestone.stage_name.clone())
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(milestone).unwrap_or_default()))
}

/// Toggling a milestone active backfills missing progress records for every
/// eligible convert; the response reports how many were created.
pub async fn set_milestone_active(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let (milestone, backfilled) =
        MilestoneService::set_active(&state.db, id, body.is_active, user.user_id).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    let action = if body.is_active { "milestone.activate" } else { "milestone.deactivate" };
    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, action)
            .resource("milestone", id)
            .label(milestone.stage_name.clone())
            .ip(client_ip(&headers)),
    );

    Ok(Json(json!({
        "milestone": milestone,
        "backfilled": backfilled,
    })))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    user.require_superadmin()?;
    MilestoneService::delete(&state.db, id).await?;
    state.list_cache.invalidate_prefix(CACHE_KEY);

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "milestone.delete")
            .resource("milestone", id)
            .ip(client_ip(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}
