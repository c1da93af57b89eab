use chrono::{Datelike, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, ApiError},
    models::attendance::{
        AttendanceRecord, BulkAttendanceReport, BulkRowError, RecordAttendanceRequest,
        WeeklyBucket,
    },
    services::progress::ProgressService,
};

/// Configuration for the attendance-driven milestone: which stage is
/// awarded, and after how many Sundays.
#[derive(Debug, Clone, Copy)]
pub struct AutoCompleteRule {
    pub stage_number: i32,
    pub goal: i64,
}

pub struct AttendanceService;

impl AttendanceService {
    pub async fn list_for_convert(
        pool: &PgPool,
        convert_id: Uuid,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let records = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT * FROM attendance_records
             WHERE convert_id = $1 ORDER BY attendance_date DESC",
        )
        .bind(convert_id)
        .fetch_all(pool)
        .await?;
        Ok(records)
    }

    /// Records one Sunday and re-evaluates the attendance milestone inside
    /// the same transaction. The evaluation is idempotent, so re-running it
    /// on a later insert is always safe.
    pub async fn record(
        pool: &PgPool,
        rule: AutoCompleteRule,
        convert_id: Uuid,
        date: NaiveDate,
        marked_by: Uuid,
    ) -> Result<AttendanceRecord, ApiError> {
        let mut tx = pool.begin().await?;

        let duplicate: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM attendance_records
              WHERE convert_id = $1 AND attendance_date = $2)",
        )
        .bind(convert_id)
        .bind(date)
        .fetch_one(&mut *tx)
        .await?;
        if duplicate {
            return Err(ApiError::Conflict(format!(
                "Attendance already recorded for {date}"
            )));
        }

        let record = sqlx::query_as::<_, AttendanceRecord>(
            "INSERT INTO attendance_records (convert_id, attendance_date, marked_by)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(convert_id)
        .bind(date)
        .bind(marked_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict(format!("Attendance already recorded for {date}"))
            } else {
                e.into()
            }
        })?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance_records WHERE convert_id = $1",
        )
        .bind(convert_id)
        .fetch_one(&mut *tx)
        .await?;

        // One-way transition: once the goal is reached the milestone is
        // completed and never retracted, even if records are later deleted.
        if count >= rule.goal {
            ProgressService::upsert_on(&mut tx, convert_id, rule.stage_number, true, marked_by)
                .await?;
        }

        tx.commit().await?;
        Ok(record)
    }

    /// Lenient bulk import: rows fail independently and are reported back;
    /// the rest are recorded. Deliberately the opposite of the atomic bulk
    /// progress update.
    pub async fn bulk_record(
        pool: &PgPool,
        rule: AutoCompleteRule,
        entries: &[RecordAttendanceRequest],
        marked_by: Uuid,
    ) -> Result<BulkAttendanceReport, ApiError> {
        let mut created = Vec::new();
        let mut errors = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            match Self::record(pool, rule, entry.convert_id, entry.attendance_date, marked_by)
                .await
            {
                Ok(record) => created.push(record),
                Err(e) => errors.push(BulkRowError { row: i, message: e.to_string() }),
            }
        }
        Ok(BulkAttendanceReport { created, errors })
    }

    pub async fn count_for_convert(pool: &PgPool, convert_id: Uuid) -> Result<i64, ApiError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance_records WHERE convert_id = $1",
        )
        .bind(convert_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Deleting a missing record is not an error; returns whether anything
    /// was removed. Completion of the attendance milestone is never
    /// retracted here.
    pub async fn remove(pool: &PgPool, id: Uuid) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM attendance_records WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attendance bucketed into Monday-aligned weeks over the trailing
    /// `weeks` weeks, optionally scoped to one group.
    pub async fn weekly_stats(
        pool: &PgPool,
        group_id: Option<Uuid>,
        weeks: u32,
    ) -> Result<Vec<WeeklyBucket>, ApiError> {
        let today = Utc::now().date_naive();
        let weeks = weeks.max(1);
        let from = week_start(today) - Duration::weeks(weeks as i64 - 1);

        let dates: Vec<(NaiveDate,)> = match group_id {
            Some(gid) => {
                sqlx::query_as(
                    "SELECT a.attendance_date
                     FROM attendance_records a
                     JOIN converts c ON c.id = a.convert_id
                     WHERE a.attendance_date >= $1 AND c.group_id = $2",
                )
                .bind(from)
                .bind(gid)
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT attendance_date FROM attendance_records WHERE attendance_date >= $1",
                )
                .bind(from)
                .fetch_all(pool)
                .await?
            }
        };

        Ok(bucket_weeks(dates.into_iter().map(|(d,)| d), today, weeks))
    }
}

/// Monday of the ISO week containing `date`.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Every trailing week gets a bucket, zero-count weeks included.
fn bucket_weeks(
    dates: impl Iterator<Item = NaiveDate>,
    today: NaiveDate,
    weeks: u32,
) -> Vec<WeeklyBucket> {
    let current = week_start(today);
    let first = current - Duration::weeks(weeks as i64 - 1);

    let mut buckets: Vec<WeeklyBucket> = (0..weeks)
        .map(|i| WeeklyBucket { week_start: first + Duration::weeks(i as i64), count: 0 })
        .collect();

    for date in dates {
        let start = week_start(date);
        if start < first || start > current {
            continue;
        }
        let idx = ((start - first).num_days() / 7) as usize;
        buckets[idx].count += 1;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn week_start_is_monday() {
        // 2025-06-04 is a Wednesday.
        assert_eq!(week_start(d(2025, 6, 4)), d(2025, 6, 2));
        // A Monday maps to itself.
        assert_eq!(week_start(d(2025, 6, 2)), d(2025, 6, 2));
        // Sunday belongs to the week that started the previous Monday.
        assert_eq!(week_start(d(2025, 6, 8)), d(2025, 6, 2));
    }

    #[test]
    fn buckets_cover_trailing_weeks_with_zeroes() {
        let today = d(2025, 6, 15); // Sunday, week of June 9
        let dates = vec![d(2025, 6, 15), d(2025, 6, 8), d(2025, 6, 8)];
        let buckets = bucket_weeks(dates.into_iter(), today, 3);

        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0], WeeklyBucket { week_start: d(2025, 5, 26), count: 0 });
        assert_eq!(buckets[1], WeeklyBucket { week_start: d(2025, 6, 2), count: 2 });
        assert_eq!(buckets[2], WeeklyBucket { week_start: d(2025, 6, 9), count: 1 });
    }

    #[test]
    fn out_of_range_dates_are_ignored() {
        let today = d(2025, 6, 15);
        let buckets = bucket_weeks(vec![d(2025, 1, 5)].into_iter(), today, 2);
        assert!(buckets.iter().all(|b| b.count == 0));
    }
}
