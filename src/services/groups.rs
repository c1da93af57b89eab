use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, ApiError},
    models::group::{CreateGroupRequest, Group, UpdateGroupRequest},
};

pub struct GroupService;

impl GroupService {
    pub async fn list(pool: &PgPool, include_archived: bool) -> Result<Vec<Group>, ApiError> {
        let sql = if include_archived {
            "SELECT * FROM groups ORDER BY year DESC, name"
        } else {
            "SELECT * FROM groups WHERE archived = FALSE ORDER BY year DESC, name"
        };
        let groups = sqlx::query_as::<_, Group>(sql).fetch_all(pool).await?;
        Ok(groups)
    }

    pub async fn create(pool: &PgPool, req: &CreateGroupRequest) -> Result<Group, ApiError> {
        if req.name.trim().is_empty() {
            return Err(ApiError::Validation("Group name is required".into()));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM groups WHERE name = $1 AND year = $2)",
        )
        .bind(req.name.trim())
        .bind(req.year)
        .fetch_one(pool)
        .await?;
        if taken {
            return Err(ApiError::Conflict(format!(
                "Group \"{}\" already exists for {}",
                req.name.trim(),
                req.year
            )));
        }

        let group = sqlx::query_as::<_, Group>(
            "INSERT INTO groups (name, year, leader_id, description)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(req.name.trim())
        .bind(req.year)
        .bind(req.leader_id)
        .bind(&req.description)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Group name and year already taken".into())
            } else {
                e.into()
            }
        })?;
        Ok(group)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateGroupRequest,
    ) -> Result<Group, ApiError> {
        let group = sqlx::query_as::<_, Group>(
            "UPDATE groups
             SET name        = COALESCE($1, name),
                 year        = COALESCE($2, year),
                 leader_id   = COALESCE($3, leader_id),
                 archived    = COALESCE($4, archived),
                 description = COALESCE($5, description),
                 updated_at  = NOW()
             WHERE id = $6
             RETURNING *",
        )
        .bind(&req.name)
        .bind(req.year)
        .bind(req.leader_id)
        .bind(req.archived)
        .bind(&req.description)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Group name and year already taken".into())
            } else {
                ApiError::from(e)
            }
        })?
        .ok_or_else(|| ApiError::NotFound("Group not found".into()))?;
        Ok(group)
    }

    /// Deletion is blocked while converts are still assigned.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), ApiError> {
        let members: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM converts WHERE group_id = $1")
                .bind(id)
                .fetch_one(pool)
                .await?;
        if members > 0 {
            return Err(ApiError::Validation(format!(
                "Group still has {members} convert(s); reassign them first"
            )));
        }

        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Group not found".into()));
        }
        Ok(())
    }
}
