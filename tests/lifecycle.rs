//! Database-backed lifecycle tests. Ignored by default; run them against a
//! local Postgres with
//!
//!     DATABASE_URL=postgres://... cargo test -- --ignored
//!
//! Each test gets its own throwaway database with migrations applied.

use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use shepherd_api::error::ApiError;
use shepherd_api::services::attendance::{AttendanceService, AutoCompleteRule};
use shepherd_api::services::milestones::MilestoneService;
use shepherd_api::services::progress::ProgressService;

async fn seed_user(pool: &PgPool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (username, password_hash, first_name, last_name, role)
         VALUES ($1, 'not-a-real-hash', 'Ama', 'Mensah', 'leader')
         RETURNING id",
    )
    .bind(format!("leader-{}", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_group(pool: &PgPool, archived: bool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO groups (name, year, archived) VALUES ($1, 2025, $2) RETURNING id",
    )
    .bind(format!("Group {}", Uuid::new_v4()))
    .bind(archived)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_convert(pool: &PgPool, group_id: Option<Uuid>) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO converts (first_name, last_name, phone_number, group_id)
         VALUES ('Kofi', 'Asante', $1, $2)
         RETURNING id",
    )
    .bind(format!("+233{}", &Uuid::new_v4().simple().to_string()[..9]))
    .bind(group_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn seed_milestone(pool: &PgPool, stage_number: i32, is_active: bool) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO milestones (stage_number, stage_name, is_active)
         VALUES ($1, $2, $3)
         RETURNING id",
    )
    .bind(stage_number)
    .bind(format!("Stage {stage_number}"))
    .bind(is_active)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test]
#[ignore]
async fn progress_upsert_is_idempotent_and_keeps_the_completion_date(pool: PgPool) {
    let user = seed_user(&pool).await;
    let convert = seed_convert(&pool, None).await;
    seed_milestone(&pool, 2, true).await;

    let first = ProgressService::upsert(&pool, convert, 2, true, user)
        .await
        .unwrap();
    assert!(first.is_completed);
    let completed_at = first.date_completed.expect("completion sets the date");

    // Same payload again: same row, same completion date.
    let second = ProgressService::upsert(&pool, convert, 2, true, user)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.date_completed, Some(completed_at));
    assert_eq!(ProgressService::get(&pool, convert).await.unwrap().len(), 1);

    // Un-completing clears the date but keeps the row.
    let reset = ProgressService::upsert(&pool, convert, 2, false, user)
        .await
        .unwrap();
    assert_eq!(reset.id, first.id);
    assert!(!reset.is_completed);
    assert!(reset.date_completed.is_none());
}

#[sqlx::test]
#[ignore]
async fn duplicate_attendance_conflicts_and_leaves_the_first_record_alone(pool: PgPool) {
    let user = seed_user(&pool).await;
    let convert = seed_convert(&pool, None).await;
    let rule = AutoCompleteRule { stage_number: 18, goal: 26 };
    let sunday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

    let first = AttendanceService::record(&pool, rule, convert, sunday, user)
        .await
        .unwrap();

    let err = AttendanceService::record(&pool, rule, convert, sunday, user)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    let records = AttendanceService::list_for_convert(&pool, convert).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, first.id);
    assert_eq!(records[0].created_at, first.created_at);
}

#[sqlx::test]
#[ignore]
async fn attendance_milestone_is_never_retracted(pool: PgPool) {
    let user = seed_user(&pool).await;
    let convert = seed_convert(&pool, None).await;
    seed_milestone(&pool, 18, true).await;
    let rule = AutoCompleteRule { stage_number: 18, goal: 2 };

    let first = AttendanceService::record(
        &pool,
        rule,
        convert,
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        user,
    )
    .await
    .unwrap();
    AttendanceService::record(
        &pool,
        rule,
        convert,
        NaiveDate::from_ymd_opt(2025, 6, 8).unwrap(),
        user,
    )
    .await
    .unwrap();

    let progress = ProgressService::get(&pool, convert).await.unwrap();
    let stage = progress.iter().find(|p| p.stage_number == 18).unwrap();
    assert!(stage.is_completed);
    let awarded_at = stage.date_completed;

    // Dropping below the goal leaves the milestone untouched.
    assert!(AttendanceService::remove(&pool, first.id).await.unwrap());
    assert_eq!(AttendanceService::count_for_convert(&pool, convert).await.unwrap(), 1);

    let progress = ProgressService::get(&pool, convert).await.unwrap();
    let stage = progress.iter().find(|p| p.stage_number == 18).unwrap();
    assert!(stage.is_completed);
    assert_eq!(stage.date_completed, awarded_at);
}

#[sqlx::test]
#[ignore]
async fn activation_backfill_skips_graduates_and_archived_groups(pool: PgPool) {
    let user = seed_user(&pool).await;
    seed_milestone(&pool, 1, true).await;
    seed_milestone(&pool, 2, true).await;
    let new_stage = seed_milestone(&pool, 3, false).await;

    // Completed everything that was active: graduated, left alone.
    let graduate = seed_convert(&pool, None).await;
    ProgressService::upsert(&pool, graduate, 1, true, user).await.unwrap();
    ProgressService::upsert(&pool, graduate, 2, true, user).await.unwrap();

    // Still working through the catalog: gets the new stage.
    let active_group = seed_group(&pool, false).await;
    let behind = seed_convert(&pool, Some(active_group)).await;
    ProgressService::upsert(&pool, behind, 1, true, user).await.unwrap();

    // Archived group: frozen, skipped even though otherwise eligible.
    let archived_group = seed_group(&pool, true).await;
    let frozen = seed_convert(&pool, Some(archived_group)).await;

    let (milestone, backfilled) =
        MilestoneService::set_active(&pool, new_stage, true, user).await.unwrap();
    assert!(milestone.is_active);
    assert_eq!(backfilled, 1);

    let behind_progress = ProgressService::get(&pool, behind).await.unwrap();
    let created = behind_progress.iter().find(|p| p.stage_number == 3).unwrap();
    assert!(!created.is_completed);
    assert!(created.date_completed.is_none());

    let graduate_progress = ProgressService::get(&pool, graduate).await.unwrap();
    assert!(graduate_progress.iter().all(|p| p.stage_number != 3));
    assert!(ProgressService::get(&pool, frozen).await.unwrap().is_empty());
}

#[sqlx::test]
#[ignore]
async fn milestone_in_use_cannot_be_deleted(pool: PgPool) {
    let user = seed_user(&pool).await;
    let convert = seed_convert(&pool, None).await;
    let milestone = seed_milestone(&pool, 5, true).await;
    ProgressService::upsert(&pool, convert, 5, true, user).await.unwrap();

    let err = MilestoneService::delete(&pool, milestone).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    assert_eq!(MilestoneService::list(&pool).await.unwrap().len(), 1);
}
