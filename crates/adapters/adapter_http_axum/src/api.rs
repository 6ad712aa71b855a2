//! JSON REST API handlers mounted under `/api`.
//!
//! - `GET  /api/status`              : busy flags and engine state
//! - `GET  /api/snapshot`            : last sensor snapshot
//! - `GET  /api/signals/stream`      : SSE stream of outbound signals
//! - `POST /api/inbound`             : collaborator notifications
//! - `GET  /api/packs`               : available character packs
//! - `POST /api/packs/{id}/activate` : switch pack and reload
//! - `POST /api/rules/reload`        : reload the active pack
//! - `POST /api/rules/{id}/reset`    : clear one rule's cumulative state
//! - `POST /api/rules/reset`         : clear every cumulative state

pub mod inbound;
pub mod rules;
pub mod signals;
pub mod status;

use axum::Router;
use axum::routing::{get, post};

use nudge_app::ports::RuleRepository;

use crate::state::AppState;

/// Build the `/api` sub-router.
pub fn routes<R>() -> Router<AppState<R>>
where
    R: RuleRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/status", get(status::status::<R>))
        .route("/snapshot", get(status::snapshot::<R>))
        .route("/signals/stream", get(signals::stream::<R>))
        .route("/inbound", post(inbound::submit::<R>))
        .route("/packs", get(rules::list_packs::<R>))
        .route("/packs/{id}/activate", post(rules::activate::<R>))
        .route("/rules/reload", post(rules::reload::<R>))
        .route("/rules/reset", post(rules::reset_all::<R>))
        .route("/rules/{id}/reset", post(rules::reset::<R>))
}
