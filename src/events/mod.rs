pub mod repo_types;
mod services;

use crate::crud::handlers::routes;
use crate::state::AppState;
use axum::Router;

pub use repo_types::Event;

pub fn router() -> Router<AppState> {
    routes::<Event>()
}
