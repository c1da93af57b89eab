use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::user::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

/// Identity decoded from the bearer token; available to handlers as an
/// axum extractor (see middleware::auth).
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
}

impl AuthenticatedUser {
    pub fn require_superadmin(&self) -> Result<(), ApiError> {
        match self.role {
            Role::SuperAdmin => Ok(()),
            _ => Err(ApiError::Forbidden("Super admin access required".into())),
        }
    }

    /// Reporting surfaces (exports, weekly stats) are for oversight roles.
    pub fn require_reporting(&self) -> Result<(), ApiError> {
        match self.role {
            Role::SuperAdmin | Role::LeadPastor => Ok(()),
            _ => Err(ApiError::Forbidden("Insufficient role for this report".into())),
        }
    }

    /// Leaders only touch converts in their own group; pastors and admins
    /// see everything.
    pub fn can_access_group(&self, group_id: Option<Uuid>) -> bool {
        match self.role {
            Role::SuperAdmin | Role::LeadPastor => true,
            Role::Leader => self.group_id.is_some() && self.group_id == group_id,
        }
    }

    pub fn ensure_group_access(&self, group_id: Option<Uuid>) -> Result<(), ApiError> {
        if self.can_access_group(group_id) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Convert is outside your group".into()))
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: MeResponse,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub group_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role, group_id: Option<Uuid>) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: Uuid::new_v4(),
            username: "t".into(),
            role,
            group_id,
        }
    }

    #[test]
    fn leader_is_scoped_to_own_group() {
        let g = Uuid::new_v4();
        let leader = user(Role::Leader, Some(g));
        assert!(leader.can_access_group(Some(g)));
        assert!(!leader.can_access_group(Some(Uuid::new_v4())));
        assert!(!leader.can_access_group(None));
    }

    #[test]
    fn leader_without_group_accesses_nothing() {
        let leader = user(Role::Leader, None);
        assert!(!leader.can_access_group(None));
        assert!(!leader.can_access_group(Some(Uuid::new_v4())));
    }

    #[test]
    fn oversight_roles_access_everything() {
        for role in [Role::SuperAdmin, Role::LeadPastor] {
            let u = user(role, None);
            assert!(u.can_access_group(None));
            assert!(u.can_access_group(Some(Uuid::new_v4())));
        }
    }

    #[test]
    fn reporting_policy() {
        assert!(user(Role::LeadPastor, None).require_reporting().is_ok());
        assert!(user(Role::Leader, None).require_reporting().is_err());
        assert!(user(Role::Leader, None).require_superadmin().is_err());
        assert!(user(Role::SuperAdmin, None).require_superadmin().is_ok());
    }
}
