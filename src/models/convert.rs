use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Convert {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    /// "DD-MM" — the year is not collected.
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub residential_location: Option<String>,
    pub group_id: Option<Uuid>,
    pub registered_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConvertRequest {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub residential_location: Option<String>,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConvertRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub residential_location: Option<String>,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ImportRowError {
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub errors: Vec<ImportRowError>,
}

/// Validates a "DD-MM" birthday string (day 1-31, month 1-12).
pub fn is_valid_day_month(s: &str) -> bool {
    let mut parts = s.split('-');
    let (Some(day), Some(month), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let (Ok(d), Ok(m)) = (day.parse::<u32>(), month.parse::<u32>()) else {
        return false;
    };
    (1..=31).contains(&d) && (1..=12).contains(&m)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_day_month() {
        assert!(is_valid_day_month("01-01"));
        assert!(is_valid_day_month("31-12"));
        assert!(is_valid_day_month("5-7"));
    }

    #[test]
    fn rejects_malformed_day_month() {
        assert!(!is_valid_day_month(""));
        assert!(!is_valid_day_month("1990-01-01"));
        assert!(!is_valid_day_month("32-01"));
        assert!(!is_valid_day_month("15-13"));
        assert!(!is_valid_day_month("0-5"));
        assert!(!is_valid_day_month("aa-bb"));
    }
}
