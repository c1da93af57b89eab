use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Milestone {
    pub id: Uuid,
    pub stage_number: i32,
    pub stage_name: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
    pub is_auto_calculated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateMilestoneRequest {
    pub stage_number: i32,
    pub stage_name: String,
    pub short_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_auto_calculated: bool,
}

/// stage_number is immutable once a milestone exists; updates only touch
/// the descriptive fields.
#[derive(Debug, Deserialize)]
pub struct UpdateMilestoneRequest {
    pub stage_name: Option<String>,
    pub short_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}
