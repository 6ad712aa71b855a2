//! Pack and rule management.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use nudge_app::ports::{PackSummary, RuleRepository};
use nudge_app::services::rule_service::ReloadReport;
use nudge_domain::id::RuleId;

use crate::error::ApiError;
use crate::state::AppState;

pub enum ReloadResponse {
    Ok(Json<ReloadReport>),
}

impl IntoResponse for ReloadResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
        }
    }
}

/// `GET /api/packs`
pub async fn list_packs<R>(
    State(state): State<AppState<R>>,
) -> Result<Json<Vec<PackSummary>>, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    Ok(Json(state.rules.list_packs().await?))
}

/// `POST /api/packs/{id}/activate`
pub async fn activate<R>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
) -> Result<ReloadResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    let report = state.rules.switch_pack(&id).await?;
    Ok(ReloadResponse::Ok(Json(report)))
}

/// `POST /api/rules/reload`
pub async fn reload<R>(State(state): State<AppState<R>>) -> Result<ReloadResponse, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    let report = state.rules.reload().await?;
    Ok(ReloadResponse::Ok(Json(report)))
}

/// `POST /api/rules/{id}/reset`
pub async fn reset<R>(
    State(state): State<AppState<R>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    state.rules.reset_rule(RuleId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/rules/reset`
pub async fn reset_all<R>(State(state): State<AppState<R>>) -> Result<StatusCode, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    state.rules.reset_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use tower::ServiceExt;

    use crate::router;
    use crate::test_support::{self, empty_request, json_body};

    #[tokio::test]
    async fn should_list_packs() {
        let (state, _engine) = test_support::state();
        let app = router::build(state);

        let response = app.oneshot(empty_request("GET", "/api/packs")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], "cat");
        assert_eq!(body[1]["name"], "DOG");
    }

    #[tokio::test]
    async fn should_reload_active_pack() {
        let (state, _engine) = test_support::state();
        let app = router::build(state);

        let response = app
            .oneshot(empty_request("POST", "/api/rules/reload"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["pack_id"], "cat");
        assert_eq!(body["loaded"], 1);
    }

    #[tokio::test]
    async fn should_activate_known_pack() {
        let (state, _engine) = test_support::state();
        let rules = std::sync::Arc::clone(&state.rules);
        let app = router::build(state);

        let response = app
            .oneshot(empty_request("POST", "/api/packs/dog/activate"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["loaded"], 2);
        assert_eq!(rules.active_pack(), "dog");
    }

    #[tokio::test]
    async fn should_return_404_for_unknown_pack() {
        let (state, _engine) = test_support::state();
        let app = router::build(state);

        let response = app
            .oneshot(empty_request("POST", "/api/packs/ghost/activate"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error"], "Pack ghost not found");
    }

    #[tokio::test]
    async fn should_reset_rule_state() {
        let (state, _engine) = test_support::state();
        let app = router::build(state);

        let response = app
            .oneshot(empty_request("POST", "/api/rules/meow/reset"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
