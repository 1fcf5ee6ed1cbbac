use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, verify_password, AuthError, AuthService, TokenResponse};
use crate::entities::{user, UserModel, UserRole};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub token: TokenResponse,
    pub user: UserModel,
}

#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 64))]
    pub username: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub role: UserRole,
}

/// Staff accounts and login.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserModel>, ServiceError> {
        Ok(user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db.as_ref())
            .await?)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<UserModel>, ServiceError> {
        Ok(user::Entity::find_by_id(id).one(self.db.as_ref()).await?)
    }

    #[instrument(skip(self, input), fields(username = %input.username, role = %input.role))]
    pub async fn create_user(&self, input: NewUser) -> Result<UserModel, ServiceError> {
        input.validate()?;
        if self.find_by_username(&input.username).await?.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "username '{}' is already taken",
                input.username
            )));
        }

        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(input.username),
            password_hash: Set(hash_password(&input.password)?),
            name: Set(input.name),
            role: Set(input.role),
            created_at: Set(Utc::now()),
        }
        .insert(self.db.as_ref())
        .await?;

        info!(user_id = %created.id, "User created");
        Ok(created)
    }

    /// Checks the password and issues an access token. Unknown users and
    /// wrong passwords fail the same way.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, ServiceError> {
        request.validate()?;

        let user = match self.find_by_username(&request.username).await? {
            Some(user) if verify_password(&user.password_hash, &request.password) => user,
            _ => {
                warn!("Login rejected");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        let token = self.auth.issue_token(&user)?;
        info!(user_id = %user.id, role = %user.role, "Login succeeded");
        Ok(LoginResponse { token, user })
    }
}
