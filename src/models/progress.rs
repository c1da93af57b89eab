use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProgressRecord {
    pub id: Uuid,
    pub convert_id: Uuid,
    pub stage_number: i32,
    /// Denormalized from the milestone at write time.
    pub stage_name: String,
    pub is_completed: bool,
    pub date_completed: Option<DateTime<Utc>>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertProgressRequest {
    pub stage_number: i32,
    pub is_completed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressUpdate {
    pub stage_number: i32,
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkProgressRequest {
    pub updates: Vec<ProgressUpdate>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct CompletionRate {
    pub completed: i64,
    pub total: i64,
    pub percentage: i32,
}
