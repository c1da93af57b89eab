use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{error::ApiError, models::auth::AuthenticatedUser, AppState};

#[derive(Deserialize)]
pub struct AuditQuery {
    pub page:   Option<i64>,
    pub limit:  Option<i64>,
    pub action: Option<String>,
}

#[derive(Serialize, sqlx::FromRow)]
pub struct AuditLogRow {
    pub id:             Uuid,
    pub user_id:        Option<Uuid>,
    pub username:       Option<String>,
    pub action:         String,
    pub resource_type:  Option<String>,
    pub resource_id:    Option<String>,
    pub resource_label: Option<String>,
    pub ip_address:     Option<String>,
    pub created_at:     DateTime<Utc>,
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;

    let limit  = params.limit.unwrap_or(50).clamp(1, 200);
    let page   = params.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit;
    let action_filter = params.action.map(|a| format!("{a}%"));

    let entries: Vec<AuditLogRow> = sqlx::query_as(
        "SELECT id, user_id, username, action, resource_type, resource_id,
                resource_label, ip_address, created_at
         FROM audit_log
         WHERE $1::text IS NULL OR action LIKE $1
         ORDER BY created_at DESC
         LIMIT $2 OFFSET $3",
    )
    .bind(&action_filter)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM audit_log WHERE $1::text IS NULL OR action LIKE $1",
    )
    .bind(&action_filter)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(json!({
        "entries": entries,
        "total": total,
        "page": page,
        "limit": limit,
    })))
}
