use serde::{Deserialize, Serialize};

use crate::auth::{repo_types::Role, PublicUser};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: PublicUser,
    pub message: String,
}
