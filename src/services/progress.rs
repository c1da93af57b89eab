use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::progress::{CompletionRate, ProgressRecord, ProgressUpdate},
};

pub struct ProgressService;

impl ProgressService {
    pub async fn get(pool: &PgPool, convert_id: Uuid) -> Result<Vec<ProgressRecord>, ApiError> {
        let records = sqlx::query_as::<_, ProgressRecord>(
            "SELECT * FROM progress_records WHERE convert_id = $1 ORDER BY stage_number",
        )
        .bind(convert_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Idempotent upsert keyed on (convert_id, stage_number).
    ///
    /// The milestone's current name is copied into the record at write time;
    /// if the stage has no catalog entry a synthetic "Stage {n}" is used.
    /// date_completed is set on the transition to completed, kept as-is when
    /// already completed, and cleared when un-completed.
    pub async fn upsert(
        pool: &PgPool,
        convert_id: Uuid,
        stage_number: i32,
        is_completed: bool,
        updated_by: Uuid,
    ) -> Result<ProgressRecord, ApiError> {
        let mut conn = pool.acquire().await?;
        Self::upsert_on(&mut conn, convert_id, stage_number, is_completed, updated_by).await
    }

    /// Connection-level variant so bulk updates and the attendance rule can
    /// run it inside their own transactions.
    pub async fn upsert_on(
        conn: &mut PgConnection,
        convert_id: Uuid,
        stage_number: i32,
        is_completed: bool,
        updated_by: Uuid,
    ) -> Result<ProgressRecord, ApiError> {
        let stage_name: Option<String> =
            sqlx::query_scalar("SELECT stage_name FROM milestones WHERE stage_number = $1")
                .bind(stage_number)
                .fetch_optional(&mut *conn)
                .await?;
        let stage_name = stage_name.unwrap_or_else(|| format!("Stage {stage_number}"));

        let current: Option<(bool, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT is_completed, date_completed FROM progress_records
             WHERE convert_id = $1 AND stage_number = $2",
        )
        .bind(convert_id)
        .bind(stage_number)
        .fetch_optional(&mut *conn)
        .await?;
        let date_completed = next_date_completed(is_completed, current, Utc::now());

        let record = sqlx::query_as::<_, ProgressRecord>(
            "INSERT INTO progress_records
                (convert_id, stage_number, stage_name, is_completed, date_completed, updated_by)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (convert_id, stage_number) DO UPDATE
             SET stage_name     = EXCLUDED.stage_name,
                 is_completed   = EXCLUDED.is_completed,
                 date_completed = EXCLUDED.date_completed,
                 updated_by     = EXCLUDED.updated_by,
                 updated_at     = NOW()
             RETURNING *",
        )
        .bind(convert_id)
        .bind(stage_number)
        .bind(&stage_name)
        .bind(is_completed)
        .bind(date_completed)
        .bind(updated_by)
        .fetch_one(&mut *conn)
        .await?;
        Ok(record)
    }

    /// Reads the current flag and writes its inverse. Two actors toggling
    /// the same stage concurrently is last-write-wins; no version token.
    pub async fn toggle(
        pool: &PgPool,
        convert_id: Uuid,
        stage_number: i32,
        updated_by: Uuid,
    ) -> Result<ProgressRecord, ApiError> {
        let current: Option<bool> = sqlx::query_scalar(
            "SELECT is_completed FROM progress_records
             WHERE convert_id = $1 AND stage_number = $2",
        )
        .bind(convert_id)
        .bind(stage_number)
        .fetch_optional(pool)
        .await?;

        Self::upsert(pool, convert_id, stage_number, !current.unwrap_or(false), updated_by).await
    }

    /// All-or-nothing: every update lands in one transaction, or none do.
    pub async fn bulk_update(
        pool: &PgPool,
        convert_id: Uuid,
        updates: &[ProgressUpdate],
        updated_by: Uuid,
    ) -> Result<Vec<ProgressRecord>, ApiError> {
        let mut tx = pool.begin().await?;
        let mut records = Vec::with_capacity(updates.len());
        for u in updates {
            let record =
                Self::upsert_on(&mut tx, convert_id, u.stage_number, u.is_completed, updated_by)
                    .await?;
            records.push(record);
        }
        tx.commit().await?;
        Ok(records)
    }

    /// Completion over the records that exist for this convert, not over the
    /// whole catalog.
    pub async fn completion_rate(
        pool: &PgPool,
        convert_id: Uuid,
    ) -> Result<CompletionRate, ApiError> {
        let (total, completed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_completed)
             FROM progress_records WHERE convert_id = $1",
        )
        .bind(convert_id)
        .fetch_one(pool)
        .await?;
        Ok(rate(completed, total))
    }
}

/// The completion-timestamp transition. The timestamp tracks the most
/// recent completion *event*: set on false -> true, kept unchanged while the
/// record stays completed (so a repeated upsert is a no-op), cleared the
/// moment the record is un-completed.
fn next_date_completed(
    new_completed: bool,
    current: Option<(bool, Option<DateTime<Utc>>)>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !new_completed {
        return None;
    }
    match current {
        Some((true, existing)) => existing,
        _ => Some(now),
    }
}

fn rate(completed: i64, total: i64) -> CompletionRate {
    let percentage = if total == 0 {
        0
    } else {
        ((completed as f64 / total as f64) * 100.0).round() as i32
    };
    CompletionRate { completed, total, percentage }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn completing_sets_the_timestamp() {
        assert_eq!(next_date_completed(true, None, t(9)), Some(t(9)));
        assert_eq!(next_date_completed(true, Some((false, None)), t(9)), Some(t(9)));
    }

    #[test]
    fn repeated_completion_is_a_no_op() {
        // Same inputs twice leave the stored timestamp untouched.
        let first = next_date_completed(true, Some((false, None)), t(9));
        let second = next_date_completed(true, Some((true, first)), t(12));
        assert_eq!(second, first);
    }

    #[test]
    fn uncompleting_clears_the_timestamp() {
        assert_eq!(next_date_completed(false, Some((true, Some(t(9)))), t(12)), None);
        assert_eq!(next_date_completed(false, None, t(12)), None);
    }

    #[test]
    fn recompleting_after_a_reset_takes_the_new_time() {
        assert_eq!(next_date_completed(true, Some((false, None)), t(12)), Some(t(12)));
    }

    #[test]
    fn rounds_to_nearest_integer() {
        assert_eq!(rate(2, 3).percentage, 67);
        assert_eq!(rate(1, 3).percentage, 33);
        assert_eq!(rate(1, 2).percentage, 50);
        assert_eq!(rate(18, 18).percentage, 100);
    }

    #[test]
    fn zero_records_is_zero_percent() {
        assert_eq!(rate(0, 0), CompletionRate { completed: 0, total: 0, percentage: 0 });
    }
}
