use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{is_unique_violation, ApiError},
    models::user::{CreateUserRequest, Role, UpdateUserRequest, User},
};

pub struct UserService;

impl UserService {
    pub async fn list(pool: &PgPool) -> Result<Vec<User>, ApiError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT * FROM users ORDER BY last_name, first_name",
        )
        .fetch_all(pool)
        .await?;
        Ok(users)
    }

    pub async fn find_active_by_username(
        pool: &PgPool,
        username: &str,
    ) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(username) = LOWER($1) AND is_active = TRUE",
        )
        .bind(username)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub async fn create(pool: &PgPool, req: &CreateUserRequest) -> Result<User, ApiError> {
        if req.username.trim().is_empty() {
            return Err(ApiError::Validation("Username is required".into()));
        }
        if req.password.len() < 8 {
            return Err(ApiError::Validation(
                "Password must be at least 8 characters".into(),
            ));
        }

        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(username) = LOWER($1))",
        )
        .bind(req.username.trim())
        .fetch_one(pool)
        .await?;
        if taken {
            return Err(ApiError::Conflict("Username is already taken".into()));
        }

        let password_hash = bcrypt::hash(&req.password, bcrypt::DEFAULT_COST)
            .map_err(|e| ApiError::Internal(e.into()))?;

        let user = sqlx::query_as::<_, User>(
            "INSERT INTO users (username, password_hash, first_name, last_name, role, group_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING *",
        )
        .bind(req.username.trim().to_lowercase())
        .bind(password_hash)
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(req.role.to_string())
        .bind(req.group_id)
        .fetch_one(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::Conflict("Username is already taken".into())
            } else {
                e.into()
            }
        })?;
        Ok(user)
    }

    /// Superadmin accounts cannot be demoted or deactivated through this
    /// path.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        req: &UpdateUserRequest,
    ) -> Result<User, ApiError> {
        let current_role: Option<String> =
            sqlx::query_scalar("SELECT role FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        let current_role =
            current_role.ok_or_else(|| ApiError::NotFound("User not found".into()))?;

        if current_role == Role::SuperAdmin.to_string()
            && (req.role.is_some_and(|r| r != Role::SuperAdmin)
                || req.is_active == Some(false))
        {
            return Err(ApiError::Forbidden(
                "The super admin account cannot be demoted or deactivated".into(),
            ));
        }

        let password_hash = match &req.password {
            Some(p) if p.len() < 8 => {
                return Err(ApiError::Validation(
                    "Password must be at least 8 characters".into(),
                ))
            }
            Some(p) => Some(
                bcrypt::hash(p, bcrypt::DEFAULT_COST)
                    .map_err(|e| ApiError::Internal(e.into()))?,
            ),
            None => None,
        };

        let user = sqlx::query_as::<_, User>(
            "UPDATE users
             SET first_name    = COALESCE($1, first_name),
                 last_name     = COALESCE($2, last_name),
                 role          = COALESCE($3, role),
                 group_id      = COALESCE($4, group_id),
                 is_active     = COALESCE($5, is_active),
                 password_hash = COALESCE($6, password_hash),
                 updated_at    = NOW()
             WHERE id = $7
             RETURNING *",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(req.role.map(|r| r.to_string()))
        .bind(req.group_id)
        .bind(req.is_active)
        .bind(password_hash)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
        Ok(user)
    }
}
