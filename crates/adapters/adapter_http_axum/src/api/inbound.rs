//! Collaborator notifications.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use nudge_app::ports::RuleRepository;
use nudge_domain::signal::Inbound;

use crate::error::ApiError;
use crate::state::AppState;

/// `POST /api/inbound`: playback/request completion, UI status, pointer
/// events, weather and user queries.
///
/// Accepted for asynchronous processing by the engine.
pub async fn submit<R>(
    State(state): State<AppState<R>>,
    Json(inbound): Json<Inbound>,
) -> Result<StatusCode, ApiError>
where
    R: RuleRepository + Send + Sync + 'static,
{
    tracing::debug!(?inbound, "inbound event");
    state.engine.send(inbound).await?;
    Ok(StatusCode::ACCEPTED)
}
