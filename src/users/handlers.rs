use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{CreateUserRequest, SetRoleRequest, UserResponse};
use crate::{
    auth::{
        extractors::AdminUser,
        repo::DuplicateEmail,
        repo_types::{NewUser, Role},
        services::{hash_password, is_valid_email, normalize_email, MIN_PASSWORD_LEN},
        session::SessionEvent,
        PublicUser,
    },
    error::AppError,
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/role", put(set_role))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, _admin, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("email", "Invalid email"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        warn!("password too short");
        return Err(AppError::validation("password", "Password too short"));
    }

    let user = state
        .users
        .create(NewUser {
            email: email.clone(),
            password_hash: hash_password(&payload.password)?,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
            role: payload.role,
        })
        .await
        .map_err(|e| {
            if e.is::<DuplicateEmail>() {
                warn!(email = %email, "email already registered");
                AppError::Conflict("Email already registered".into())
            } else {
                AppError::Internal(e)
            }
        })?;
    info!(user_id = %user.id, email = %user.email, role = user.role.as_str(), "user created");
    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            user: PublicUser::from(&user),
            message: "User added successfully!".into(),
        }),
    ))
}

#[instrument(skip(state, admin, payload))]
pub async fn set_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if id == admin.user.id && payload.role != Role::Admin {
        return Err(AppError::validation("role", "You cannot remove your own admin role."));
    }
    let user = state
        .users
        .set_role(id, payload.role)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    state.sessions.publish(SessionEvent::RoleChanged {
        user_id: user.id,
        role: user.role,
    });
    info!(user_id = %user.id, role = user.role.as_str(), by = %admin.user.id, "role changed");
    Ok(Json(UserResponse {
        user: PublicUser::from(&user),
        message: "Role updated successfully!".into(),
    }))
}
