use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::auth::AuthenticatedUser,
    routes::client_ip,
    services::{
        audit::{self, AuditEntry},
        export::{render_csv, render_json, ExportService, ExportType},
    },
    AppState,
};

#[derive(Deserialize)]
pub struct ExportQuery {
    #[serde(rename = "type")]
    pub kind: String,
    pub format: Option<String>,
    pub group_id: Option<Uuid>,
}

pub async fn export(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Query(params): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    user.require_reporting()?;

    let kind = ExportType::parse(&params.kind)?;
    let sections = ExportService::export(&state.db, kind, params.group_id).await?;

    audit::log(
        state.db.clone(),
        AuditEntry::new(&user, "export.download")
            .label(params.kind.clone())
            .ip(client_ip(&headers)),
    );

    let format = params.format.as_deref().unwrap_or("json");
    let response = match format {
        "csv" => {
            let body = render_csv(&sections)?;
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
                .header(
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.csv\"", params.kind),
                )
                .body(Body::from(body))
                .map_err(|e| ApiError::Internal(e.into()))?
        }
        "json" => {
            let body = render_json(&sections).to_string();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .map_err(|e| ApiError::Internal(e.into()))?
        }
        other => {
            return Err(ApiError::Validation(format!("Unknown export format: {other}")));
        }
    };
    Ok(response)
}
