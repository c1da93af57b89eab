use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        progress::{BulkProgressRequest, UpsertProgressRequest},
    },
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        converts::ConvertService,
        progress::ProgressService,
    },
    AppState,
};

/// Leaders may only touch converts inside their own group.
async fn ensure_access(
    state: &AppState,
    user: &AuthenticatedUser,
    convert_id: Uuid,
) -> Result<(), ApiError> {
    let convert = ConvertService::get(&state.db, convert_id).await?;
    user.ensure_group_access(convert.group_id)
}

pub async fn get_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(convert_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    ensure_access(&state, &user, convert_id).await?;
    let records = ProgressService::get(&state.db, convert_id).await?;
    let rate = ProgressService::completion_rate(&state.db, convert_id).await?;
    Ok(Json(json!({
        "records": records,
        "completion": rate,
    })))
}

pub async fn upsert_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(convert_id): Path<Uuid>,
    Json(body): Json<UpsertProgressRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_access(&state, &user, convert_id).await?;
    let record = ProgressService::upsert(
        &state.db,
        convert_id,
        body.stage_number,
        body.is_completed,
        user.user_id,
    )
    .await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "progress.upsert")
            .resource("convert", convert_id)
            .label(format!("stage {} -> {}", body.stage_number, body.is_completed))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

#[derive(serde::Deserialize)]
pub struct ToggleProgressRequest {
    pub stage_number: i32,
}

/// Reads the current flag and inverts it. Concurrent toggles are
/// last-write-wins.
pub async fn toggle_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(convert_id): Path<Uuid>,
    Json(body): Json<ToggleProgressRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_access(&state, &user, convert_id).await?;
    let record =
        ProgressService::toggle(&state.db, convert_id, body.stage_number, user.user_id).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "progress.toggle")
            .resource("convert", convert_id)
            .label(format!("stage {} -> {}", record.stage_number, record.is_completed))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(record).unwrap_or_default()))
}

/// Applies every update in one transaction; a bad row rolls back all of
/// them.
pub async fn bulk_update_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(convert_id): Path<Uuid>,
    Json(body): Json<BulkProgressRequest>,
) -> Result<Json<Value>, ApiError> {
    ensure_access(&state, &user, convert_id).await?;
    if body.updates.is_empty() {
        return Err(ApiError::Validation("updates must not be empty".into()));
    }
    let records =
        ProgressService::bulk_update(&state.db, convert_id, &body.updates, user.user_id).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "progress.bulk_update")
            .resource("convert", convert_id)
            .label(format!("{} stage(s)", records.len()))
            .ip(client_ip(&headers)),
    );

    Ok(Json(json!({ "updated": records })))
}
