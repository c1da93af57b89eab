use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub convert_id: Uuid,
    pub attendance_date: NaiveDate,
    pub marked_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordAttendanceRequest {
    pub convert_id: Uuid,
    pub attendance_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct BulkAttendanceRequest {
    pub records: Vec<RecordAttendanceRequest>,
}

#[derive(Debug, Serialize)]
pub struct BulkRowError {
    pub row: usize,
    pub message: String,
}

/// Lenient bulk import result: failed rows are reported, the rest land.
#[derive(Debug, Serialize)]
pub struct BulkAttendanceReport {
    pub created: Vec<AttendanceRecord>,
    pub errors: Vec<BulkRowError>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct WeeklyBucket {
    pub week_start: NaiveDate,
    pub count: i64,
}
