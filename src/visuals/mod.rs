mod dto;
pub mod handlers;
pub mod repo_types;
mod services;

use crate::crud::handlers::routes;
use crate::state::AppState;
use axum::{routing::get, Router};

pub use repo_types::Visual;
pub(crate) use services::linked_to as visuals_linked_to;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/visuals/orphans", get(handlers::orphans))
        .merge(routes::<Visual>())
}
