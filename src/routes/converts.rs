use axum::{
    extract::{Multipart, Path, Query, State},
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
        convert::{BulkDeleteRequest, CreateConvertRequest, UpdateConvertRequest},
        user::Role,
    },
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        converts::ConvertService,
    },
    AppState,
};

#[derive(Deserialize)]
pub struct ListQuery {
    pub group_id: Option<Uuid>,
}

pub async fn list_converts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let converts = ConvertService::list(&state.db, &user, params.group_id).await?;
    Ok(Json(serde_json::to_value(converts).unwrap_or_else(|_| json!([]))))
}

pub async fn register_convert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(mut body): Json<CreateConvertRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    // Leaders register into their own group, whatever the payload says.
    if user.role == Role::Leader {
        body.group_id = user.group_id;
    }
    let convert = ConvertService::create(&state.db, &body, user.user_id).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "convert.register")
            .resource("convert", convert.id)
            .label(format!("{} {}", convert.first_name, convert.last_name))
            .ip(client_ip(&headers)),
    );

    Ok((StatusCode::CREATED, Json(serde_json::to_value(convert).unwrap_or_default())))
}

pub async fn update_convert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateConvertRequest>,
) -> Result<Json<Value>, ApiError> {
    let existing = ConvertService::get(&state.db, id).await?;
    user.ensure_group_access(existing.group_id)?;

    let convert = ConvertService::update(&state.db, id, &body).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "convert.update")
            .resource("convert", id)
            .label(format!("{} {}", convert.first_name, convert.last_name))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(convert).unwrap_or_default()))
}

pub async fn bulk_delete_converts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;
    let deleted = ConvertService::bulk_delete(&state.db, &body.ids).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "convert.bulk_delete")
            .label(format!("{deleted} convert(s)"))
            .ip(client_ip(&headers)),
    );

    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
pub struct ImportQuery {
    pub group_id: Option<Uuid>,
}

/// Multipart upload of a CSV or XLSX sheet of converts. Row failures are
/// reported back individually; valid rows still land.
pub async fn import_converts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Query(params): Query<ImportQuery>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    user.require_superadmin()?;

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("Invalid multipart payload: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload.csv").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::Validation(format!("Unreadable upload: {e}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::Validation("Missing \"file\" field".into()))?;

    let report =
        ConvertService::import(&state.db, &bytes, &filename, user.user_id, params.group_id)
            .await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "convert.import")
            .label(format!("{} created, {} failed", report.created, report.errors.len()))
            .ip(client_ip(&headers)),
    );

    Ok(Json(serde_json::to_value(report).unwrap_or_default()))
}
