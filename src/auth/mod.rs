use crate::state::AppState;
use axum::Router;

mod dto;
pub mod extractors;
pub mod handlers;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;

pub use dto::PublicUser;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::auth_routes())
}
