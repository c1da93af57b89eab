use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::ApiError;

/// One titled table in an export. CSV output delimits sections with
/// `=== NAME ===` header lines; JSON output keys them by name.
pub struct Section {
    pub name: &'static str,
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    Converts,
    Progress,
    Attendance,
    Summary,
}

impl ExportType {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "converts" => Ok(Self::Converts),
            "progress" => Ok(Self::Progress),
            "attendance" => Ok(Self::Attendance),
            "summary" => Ok(Self::Summary),
            other => Err(ApiError::Validation(format!("Unknown export type: {other}"))),
        }
    }
}

#[derive(FromRow)]
struct ConvertRow {
    first_name: String,
    last_name: String,
    phone_number: String,
    date_of_birth: Option<String>,
    gender: Option<String>,
    residential_location: Option<String>,
    group_name: Option<String>,
    registered_by: Option<String>,
}

#[derive(FromRow)]
struct ProgressRow {
    first_name: String,
    last_name: String,
    stage_number: i32,
    stage_name: String,
    is_completed: bool,
    date_completed: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(FromRow)]
struct AttendanceRow {
    first_name: String,
    last_name: String,
    attendance_date: chrono::NaiveDate,
    marked_by: Option<String>,
}

#[derive(FromRow)]
struct SummaryRow {
    first_name: String,
    last_name: String,
    phone_number: String,
    group_name: Option<String>,
    completed: i64,
    total: i64,
    attendance_count: i64,
}

pub struct ExportService;

impl ExportService {
    pub async fn export(
        pool: &PgPool,
        kind: ExportType,
        group_id: Option<Uuid>,
    ) -> Result<Vec<Section>, ApiError> {
        let section = match kind {
            ExportType::Converts => Self::converts_section(pool, group_id).await?,
            ExportType::Progress => Self::progress_section(pool, group_id).await?,
            ExportType::Attendance => Self::attendance_section(pool, group_id).await?,
            ExportType::Summary => Self::summary_section(pool, group_id).await?,
        };
        Ok(vec![section])
    }

    async fn converts_section(
        pool: &PgPool,
        group_id: Option<Uuid>,
    ) -> Result<Section, ApiError> {
        let rows: Vec<ConvertRow> = sqlx::query_as(
            "SELECT c.first_name, c.last_name, c.phone_number, c.date_of_birth,
                    c.gender, c.residential_location,
                    g.name AS group_name, u.username AS registered_by
             FROM converts c
             LEFT JOIN groups g ON g.id = c.group_id
             LEFT JOIN users u ON u.id = c.registered_by
             WHERE $1::uuid IS NULL OR c.group_id = $1
             ORDER BY c.last_name, c.first_name",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(Section {
            name: "CONVERTS",
            headers: vec![
                "first_name", "last_name", "phone_number", "date_of_birth",
                "gender", "residential_location", "group", "registered_by",
            ],
            rows: rows
                .into_iter()
                .map(|r| {
                    vec![
                        r.first_name,
                        r.last_name,
                        r.phone_number,
                        r.date_of_birth.unwrap_or_default(),
                        r.gender.unwrap_or_default(),
                        r.residential_location.unwrap_or_default(),
                        r.group_name.unwrap_or_default(),
                        r.registered_by.unwrap_or_default(),
                    ]
                })
                .collect(),
        })
    }

    async fn progress_section(
        pool: &PgPool,
        group_id: Option<Uuid>,
    ) -> Result<Section, ApiError> {
        let rows: Vec<ProgressRow> = sqlx::query_as(
            "SELECT c.first_name, c.last_name, p.stage_number, p.stage_name,
                    p.is_completed, p.date_completed
             FROM progress_records p
             JOIN converts c ON c.id = p.convert_id
             WHERE $1::uuid IS NULL OR c.group_id = $1
             ORDER BY c.last_name, c.first_name, p.stage_number",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(Section {
            name: "PROGRESS",
            headers: vec![
                "first_name", "last_name", "stage_number", "stage_name",
                "is_completed", "date_completed",
            ],
            rows: rows
                .into_iter()
                .map(|r| {
                    vec![
                        r.first_name,
                        r.last_name,
                        r.stage_number.to_string(),
                        r.stage_name,
                        r.is_completed.to_string(),
                        r.date_completed.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    ]
                })
                .collect(),
        })
    }

    async fn attendance_section(
        pool: &PgPool,
        group_id: Option<Uuid>,
    ) -> Result<Section, ApiError> {
        let rows: Vec<AttendanceRow> = sqlx::query_as(
            "SELECT c.first_name, c.last_name, a.attendance_date,
                    u.username AS marked_by
             FROM attendance_records a
             JOIN converts c ON c.id = a.convert_id
             LEFT JOIN users u ON u.id = a.marked_by
             WHERE $1::uuid IS NULL OR c.group_id = $1
             ORDER BY a.attendance_date DESC, c.last_name",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(Section {
            name: "ATTENDANCE",
            headers: vec!["first_name", "last_name", "attendance_date", "marked_by"],
            rows: rows
                .into_iter()
                .map(|r| {
                    vec![
                        r.first_name,
                        r.last_name,
                        r.attendance_date.to_string(),
                        r.marked_by.unwrap_or_default(),
                    ]
                })
                .collect(),
        })
    }

    async fn summary_section(
        pool: &PgPool,
        group_id: Option<Uuid>,
    ) -> Result<Section, ApiError> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT c.first_name, c.last_name, c.phone_number,
                    g.name AS group_name,
                    COUNT(p.id) FILTER (WHERE p.is_completed) AS completed,
                    COUNT(p.id) AS total,
                    (SELECT COUNT(*) FROM attendance_records a
                      WHERE a.convert_id = c.id) AS attendance_count
             FROM converts c
             LEFT JOIN groups g ON g.id = c.group_id
             LEFT JOIN progress_records p ON p.convert_id = c.id
             WHERE $1::uuid IS NULL OR c.group_id = $1
             GROUP BY c.id, g.name
             ORDER BY c.last_name, c.first_name",
        )
        .bind(group_id)
        .fetch_all(pool)
        .await?;

        Ok(Section {
            name: "SUMMARY",
            headers: vec![
                "first_name", "last_name", "phone_number", "group",
                "milestones_completed", "milestones_total", "attendance_count",
            ],
            rows: rows
                .into_iter()
                .map(|r| {
                    vec![
                        r.first_name,
                        r.last_name,
                        r.phone_number,
                        r.group_name.unwrap_or_default(),
                        r.completed.to_string(),
                        r.total.to_string(),
                        r.attendance_count.to_string(),
                    ]
                })
                .collect(),
        })
    }
}

/// Render sections as one CSV document: `=== NAME ===`, header row, data
/// rows (RFC4180 quoting via the csv writer), blank line between sections.
pub fn render_csv(sections: &[Section]) -> Result<String, ApiError> {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&format!("=== {} ===\n", section.name));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&section.headers)
            .map_err(|e| ApiError::Internal(e.into()))?;
        for row in &section.rows {
            writer
                .write_record(row)
                .map_err(|e| ApiError::Internal(e.into()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("csv write failed: {e}")))?;
        out.push_str(&String::from_utf8_lossy(&bytes));
    }
    Ok(out)
}

pub fn render_json(sections: &[Section]) -> Value {
    let mut root = serde_json::Map::new();
    for section in sections {
        let rows: Vec<Value> = section
            .rows
            .iter()
            .map(|row| {
                let obj: serde_json::Map<String, Value> = section
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.to_string(), json!(v)))
                    .collect();
                Value::Object(obj)
            })
            .collect();
        root.insert(section.name.to_lowercase(), Value::Array(rows));
    }
    Value::Object(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> Section {
        Section {
            name: "CONVERTS",
            headers: vec!["first_name", "last_name", "phone_number"],
            rows: vec![
                vec!["Ama".into(), "Mensah, Jr".into(), "0244000001".into()],
                vec!["Kofi".into(), "He said \"yes\"".into(), "0244000002".into()],
            ],
        }
    }

    #[test]
    fn csv_has_section_header_and_quoting() {
        let out = render_csv(&[section()]).unwrap();
        assert!(out.starts_with("=== CONVERTS ===\n"));
        assert!(out.contains("first_name,last_name,phone_number"));
        // Embedded comma forces quotes; embedded quotes are doubled.
        assert!(out.contains("\"Mensah, Jr\""));
        assert!(out.contains("\"He said \"\"yes\"\"\""));
    }

    #[test]
    fn json_zips_headers_with_rows() {
        let value = render_json(&[section()]);
        let rows = value["converts"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["first_name"], "Ama");
        assert_eq!(rows[1]["phone_number"], "0244000002");
    }

    #[test]
    fn unknown_export_type_is_a_validation_error() {
        assert!(ExportType::parse("everything").is_err());
        assert_eq!(ExportType::parse("summary").unwrap(), ExportType::Summary);
    }
}
