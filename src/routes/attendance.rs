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
        attendance::{BulkAttendanceRequest, RecordAttendanceRequest},
        auth::AuthenticatedUser,
    },
    routes::client_ip,
    services::{
        attendance::{AttendanceService, AutoCompleteRule},
        audit::{self, AuditEntry},
        converts::ConvertService,
    },
    AppState,
};

fn rule(state: &AppState) -> AutoCompleteRule {
    AutoCompleteRule {
        stage_number: state.config.attendance_stage_number,
        goal: state.config.attendance_goal,
    }
}

async fn ensure_access(
    state: &AppState,
    user: &AuthenticatedUser,
    convert_id: Uuid,
) -> Result<(), ApiError> {
    let convert = ConvertService::get(&state.db, convert_id).await?;
    user.ensure_group_access(convert.group_id)
}

pub async fn list_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(convert_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    ensure_access(&state, &user, convert_id).await?;
    let records = AttendanceService::list_for_convert(&state.db, convert_id).await?;
    let count = records.len();
    Ok(Json(json!({ "records": records, "count": count })))
}

pub async fn record_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<RecordAttendanceRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ensure_access(&state, &user, body.convert_id).await?;
    let record = AttendanceService::record(
        &state.db,
        rule(&state),
        body.convert_id,
        body.attendance_date,
        user.user_id,
    )
    .await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "attendance.record")
            .resource("convert", body.convert_id)
            .label(body.attendance_date.to_string())
            .ip(client_ip(&headers)),
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(record).unwrap_or_default())))
}

/// Lenient import: every row is attempted, failures come back per row.
pub async fn bulk_record_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<BulkAttendanceRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.records.is_empty() {
        return Err(ApiError::Validation("records must not be empty".into()));
    }
    for entry in &body.records {
        ensure_access(&state, &user, entry.convert_id).await?;
    }
    let report =
        AttendanceService::bulk_record(&state.db, rule(&state), &body.records, user.user_id)
            .await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "attendance.bulk_record")
            .label(format!("{} created, {} failed", report.created.len(), report.errors.len()))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}

pub async fn remove_attendance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let deleted = AttendanceService::remove(&state.db, id).await?;

    if deleted {
        audit::log(
            state.db.clone(),
            AuditEntry::new(&user, "attendance.remove")
                .resource("attendance", id)
                .ip(client_ip(&headers)),
        );
    }

    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
pub struct WeeklyStatsQuery {
    pub group_id: Option<Uuid>,
    pub weeks: Option<u32>,
}

pub async fn weekly_stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<WeeklyStatsQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require_reporting()?;
    let weeks = params.weeks.unwrap_or(12).min(104);
    let buckets = AttendanceService::weekly_stats(&state.db, params.group_id, weeks).await?;
    Ok(Json(json!({ "weeks": buckets })))
}
