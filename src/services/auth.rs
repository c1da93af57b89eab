use std::str::FromStr;

use sqlx::PgPool;

use crate::{
    config::Config,
    error::ApiError,
    middleware::auth::issue_access_token,
    models::{
        auth::{LoginResponse, MeResponse},
        user::Role,
    },
    services::users::UserService,
};

pub struct AuthService;

impl AuthService {
    /// Password login. The same generic message covers unknown usernames
    /// and wrong passwords.
    pub async fn login(
        pool: &PgPool,
        config: &Config,
        username: &str,
        password: &str,
    ) -> Result<LoginResponse, ApiError> {
        let invalid = || ApiError::Unauthorized("Invalid username or password".into());

        let user = UserService::find_active_by_username(pool, username)
            .await?
            .ok_or_else(invalid)?;

        let ok = bcrypt::verify(password, &user.password_hash)
            .map_err(|e| ApiError::Internal(e.into()))?;
        if !ok {
            return Err(invalid());
        }

        let role = Role::from_str(&user.role)?;
        let token = issue_access_token(
            user.id,
            &user.username,
            role,
            user.group_id,
            &config.jwt_secret,
            config.jwt_expiry_seconds,
        )?;

        Ok(LoginResponse {
            token,
            user: MeResponse {
                id: user.id,
                username: user.username,
                first_name: user.first_name,
                last_name: user.last_name,
                role,
                group_id: user.group_id,
            },
        })
    }
}
