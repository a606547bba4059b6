use axum::{extract::State, Json};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{error, info, instrument};

use super::kinds::KpiKind;
use super::shaping::{registry, ChartData};
use crate::{auth::extractors::AdminUser, error::AppError, state::AppState};

#[derive(Debug, Serialize)]
pub struct AnalyticsResponse {
    pub status: &'static str,
    pub total_users: usize,
    pub charts: Vec<ChartData>,
}

/// Fetches every KPI concurrently. Either all charts render or the panel errors;
/// the first failure drops the fetches still in flight.
#[instrument(skip(state, session))]
pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(session): AdminUser,
) -> Result<Json<AnalyticsResponse>, AppError> {
    let specs = registry();
    let datasets = try_join_all(specs.iter().map(|spec| state.kpi.fetch(spec.kind)))
        .await
        .map_err(|e| {
            error!(error = %e, "analytics fetch failed");
            AppError::from(e)
        })?;

    let total_users = specs
        .iter()
        .zip(&datasets)
        .find(|(spec, _)| spec.kind == KpiKind::Mobile)
        .map(|(_, rows)| rows.len())
        .unwrap_or_default();
    let charts = specs
        .iter()
        .zip(&datasets)
        .map(|(spec, rows)| spec.render(rows))
        .collect();

    info!(user_id = %session.user.id, total_users, "analytics rendered");
    Ok(Json(AnalyticsResponse {
        status: "rendered",
        total_users,
        charts,
    }))
}

#[cfg(test)]
mod tests {
    use crate::analytics::kinds::KpiKind;
    use crate::app::build_app;
    use crate::state::testing::{admin_token, member_token};
    use crate::state::AppState;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    async fn get(state: &AppState, token: &str) -> (StatusCode, Value) {
        let res = build_app(state.clone())
            .oneshot(
                Request::get("/api/v1/analytics")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn all_kpis_render_in_registry_order() {
        let (state, fakes) = AppState::fake_with();
        fakes.kpi.set_rows(
            KpiKind::Mobile,
            vec![
                json!({"device": {"operating_system": "Android"}}),
                json!({"device": {"operating_system": "iOS"}}),
            ],
        );
        let token = admin_token(&state).await;

        let (status, body) = get(&state, &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "rendered");
        assert_eq!(body["total_users"], 2);
        let charts = body["charts"].as_array().unwrap();
        assert_eq!(charts.len(), KpiKind::ALL.len());
        assert_eq!(charts[0]["kind"], "mobile");
        assert_eq!(charts[0]["datasets"][0]["data"], json!([1.0, 1.0, 0.0]));
        assert_eq!(fakes.kpi.calls.load(Ordering::SeqCst), KpiKind::ALL.len());
    }

    #[tokio::test]
    async fn one_failed_kpi_fails_the_whole_panel() {
        let (state, fakes) = AppState::fake_with();
        fakes.kpi.set_rows(KpiKind::Geo, vec![json!({"geo": {"city": "Durban"}})]);
        fakes.kpi.fail_on(KpiKind::UserRetention);
        let token = admin_token(&state).await;

        let (status, body) = get(&state, &token).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "There was a problem fetching analytics data.");
        assert!(body.get("charts").is_none());
    }

    #[tokio::test]
    async fn non_admin_never_reaches_analytics() {
        let (state, fakes) = AppState::fake_with();
        let token = member_token(&state).await;
        let (status, _) = get(&state, &token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(fakes.kpi.calls.load(Ordering::SeqCst), 0);
    }
}
