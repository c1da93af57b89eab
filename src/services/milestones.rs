use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, ApiError},
    models::milestone::{CreateMilestoneRequest, Milestone, UpdateMilestoneRequest},
};

pub struct MilestoneService;

impl MilestoneService {
    pub async fn list(pool: &PgPool) -> Result<Vec<Milestone>, ApiError> {
        let milestones = sqlx::query_as::<_, Milestone>(
            "SELECT * FROM milestones ORDER BY stage_number",
        )
        .fetch_all(pool)
        .await?;
        Ok(milestones)
    }

    pub async fn create(
        pool: &PgPool,
        req: &CreateMilestoneRequest,
    ) -> Result<Milestone, ApiError> {
        if req.stage_name.trim().is_empty() {
            return Err(ApiError::Validation("stage_name is required".into()));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM milestones WHERE stage_number = $1)",
        )
        .bind(req.stage_number)
        .fetch_one(pool)
        .await?;
        if taken {
            return Err(ApiError::Conflict(format!(
                "Stage number {} already exists",
                req.stage_number
            )));
        }

        let milestone = sqlx::query_as::<_, Milestone>(
            "INSERT INTO milestones (stage_number, stage_name, short_name, description, is_auto_calculated)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(req.stage_number)
        .bind(req.stage_name.trim())
        .bind(&req.short_name)
        .bind(&req.description)
        .bind(req.is_auto_calculated)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            // Race between the pre-check and the insert.
            if is_unique_violation(&e) {
                ApiError::Conflict(format!("Stage number {} already exists", req.stage_number))
            } else {
                e.into()
            }
        })?;
        Ok(milestone)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateMilestoneRequest,
    ) -> Result<Milestone, ApiError> {
        let milestone = sqlx::query_as::<_, Milestone>(
            "UPDATE milestones
             SET stage_name  = COALESCE($1, stage_name),
                 short_name  = COALESCE($2, short_name),
                 description = COALESCE($3, description),
                 updated_at  = NOW()
             WHERE id = $4
             RETURNING *",
        )
        .bind(&req.stage_name)
        .bind(&req.short_name)
        .bind(&req.description)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Milestone not found".into()))?;
        Ok(milestone)
    }

    /// Deletion is blocked while any progress record references the stage,
    /// so historical records keep their meaning.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), ApiError> {
        let milestone = Self::get(pool, id).await?;

        let references: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM progress_records WHERE stage_number = $1",
        )
        .bind(milestone.stage_number)
        .fetch_one(pool)
        .await?;
        if references > 0 {
            // Same shape as the group delete guard: a blocked delete is a 400.
            return Err(ApiError::Validation(format!(
                "Milestone is in use by {references} progress record(s) and cannot be deleted"
            )));
        }

        sqlx::query("DELETE FROM milestones WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Flips is_active. Activation backfills missing progress records for
    /// every eligible convert and returns how many were created;
    /// deactivation only flips the flag.
    pub async fn set_active(
        pool: &PgPool,
        id: Uuid,
        is_active: bool,
        acting_user: Uuid,
    ) -> Result<(Milestone, u64), ApiError> {
        let milestone = sqlx::query_as::<_, Milestone>(
            "UPDATE milestones SET is_active = $1, updated_at = NOW()
             WHERE id = $2
             RETURNING *",
        )
        .bind(is_active)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("Milestone not found".into()))?;

        let backfilled = if is_active {
            Self::backfill(pool, &milestone, acting_user).await?
        } else {
            0
        };
        Ok((milestone, backfilled))
    }

    async fn get(pool: &PgPool, id: Uuid) -> Result<Milestone, ApiError> {
        sqlx::query_as::<_, Milestone>("SELECT * FROM milestones WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Milestone not found".into()))
    }

    /// Creates missing progress records for a freshly (re)activated
    /// milestone. Converts in archived groups are frozen and skipped;
    /// converts who already completed every active milestone have graduated
    /// and are not resurrected.
    async fn backfill(
        pool: &PgPool,
        milestone: &Milestone,
        acting_user: Uuid,
    ) -> Result<u64, ApiError> {
        // Graduation is judged against the catalog as it stood before this
        // activation; counting the new milestone itself would let a fully
        // graduated convert slip past the guard.
        let previously_active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM milestones WHERE is_active = TRUE AND id <> $1",
        )
        .bind(milestone.id)
        .fetch_one(pool)
        .await?;

        let candidates: Vec<(Uuid, i64, i64)> = sqlx::query_as(
            "SELECT c.id,
                    COUNT(p.id) FILTER (WHERE p.stage_number = $1) AS has_stage,
                    COUNT(p.id) FILTER (WHERE p.is_completed)      AS completed
             FROM converts c
             LEFT JOIN groups g ON g.id = c.group_id
             LEFT JOIN progress_records p ON p.convert_id = c.id
             WHERE c.group_id IS NULL OR g.archived = FALSE
             GROUP BY c.id",
        )
        .bind(milestone.stage_number)
        .fetch_all(pool)
        .await?;

        let eligible: Vec<Uuid> = candidates
            .into_iter()
            .filter(|(_, has_stage, completed)| {
                eligible_for_backfill(*has_stage > 0, *completed, previously_active)
            })
            .map(|(id, _, _)| id)
            .collect();

        if eligible.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        for convert_id in &eligible {
            sqlx::query(
                "INSERT INTO progress_records
                    (convert_id, stage_number, stage_name, is_completed, updated_by)
                 VALUES ($1, $2, $3, FALSE, $4)
                 ON CONFLICT (convert_id, stage_number) DO NOTHING",
            )
            .bind(convert_id)
            .bind(milestone.stage_number)
            .bind(&milestone.stage_name)
            .bind(acting_user)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(eligible.len() as u64)
    }
}

/// A convert gets a backfilled record only if they do not already have one
/// for this stage and they have not graduated: completed everything that was
/// active before this activation. With nothing previously active the
/// graduation guard excludes nobody; only the existing-record check applies.
fn eligible_for_backfill(has_stage_record: bool, completed: i64, previously_active: i64) -> bool {
    if has_stage_record {
        return false;
    }
    previously_active == 0 || completed < previously_active
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_record_and_not_graduated_is_eligible() {
        assert!(eligible_for_backfill(false, 3, 10));
        assert!(eligible_for_backfill(false, 0, 1));
    }

    #[test]
    fn existing_record_is_skipped() {
        assert!(!eligible_for_backfill(true, 3, 10));
    }

    #[test]
    fn graduated_convert_is_skipped() {
        assert!(!eligible_for_backfill(false, 10, 10));
        assert!(!eligible_for_backfill(false, 12, 10));
    }

    #[test]
    fn convert_who_completed_every_prior_stage_is_not_resurrected() {
        // Reactivating an 11th stage must not hand a record to someone who
        // finished all 10 stages that were active before the flip.
        let previously_active = 10;
        let completed = 10;
        assert!(!eligible_for_backfill(false, completed, previously_active));
    }

    #[test]
    fn first_activation_with_empty_catalog_backfills_everyone() {
        // Nothing was active before, so only the existing-record check bites.
        assert!(eligible_for_backfill(false, 0, 0));
        assert!(!eligible_for_backfill(true, 0, 0));
    }
}
