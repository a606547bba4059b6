use axum::{
    extract::{Query, State},
    Json,
};
use tracing::{info, instrument};

use super::dto::{OrphanParams, OrphanReport};
use super::services::orphan_report;
use crate::{auth::extractors::AdminUser, category::Category, error::AppError, state::AppState};

#[instrument(skip(state, _admin))]
pub async fn orphans(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<OrphanParams>,
) -> Result<Json<OrphanReport>, AppError> {
    let category = match params.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<Category>()
                .map_err(|e| AppError::BadRequest(e.to_string()))?,
        ),
    };
    let report = orphan_report(&state, category).await?;
    info!(
        orphaned = report.orphaned_objects.len(),
        missing = report.missing_objects.len(),
        "visuals reconciled"
    );
    Ok(Json(report))
}
