//! Engine status and sensor snapshot.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use nudge_app::engine::EngineStatus;
use nudge_app::ports::RuleRepository;
use nudge_domain::snapshot::SensorSnapshot;

use crate::state::AppState;

#[derive(Serialize)]
pub struct StatusBody {
    #[serde(flatten)]
    pub engine: EngineStatus,
    pub active_pack: String,
}

/// `GET /api/status`
pub async fn status<R>(State(state): State<AppState<R>>) -> Json<StatusBody>
where
    R: RuleRepository + Send + Sync + 'static,
{
    Json(StatusBody {
        engine: state.engine.status(),
        active_pack: state.rules.active_pack(),
    })
}

pub enum SnapshotResponse {
    Ok(Json<SensorSnapshot>),
    /// No sampling cycle ran yet.
    NotYet,
}

impl IntoResponse for SnapshotResponse {
    fn into_response(self) -> Response {
        match self {
            Self::Ok(json) => json.into_response(),
            Self::NotYet => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// `GET /api/snapshot`
pub async fn snapshot<R>(State(state): State<AppState<R>>) -> SnapshotResponse
where
    R: RuleRepository + Send + Sync + 'static,
{
    match state.engine.latest_snapshot() {
        Some(snapshot) => SnapshotResponse::Ok(Json(snapshot)),
        None => SnapshotResponse::NotYet,
    }
}
