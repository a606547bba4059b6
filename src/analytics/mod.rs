use axum::{routing::get, Router};

use crate::state::AppState;

pub mod handlers;
pub mod kinds;
pub mod shaping;
pub mod source;

pub fn router() -> Router<AppState> {
    Router::new().route("/analytics", get(handlers::dashboard))
}
