//! Server-Sent Events stream of outbound engine signals.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use nudge_app::ports::RuleRepository;

use crate::state::AppState;

/// `GET /api/signals/stream`
///
/// Each signal is one JSON `data:` frame tagged by its `signal` field. The
/// stream runs until the client disconnects or the bus closes.
pub async fn stream<R>(
    State(state): State<AppState<R>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>
where
    R: RuleRepository + Send + Sync + 'static,
{
    let rx = state.signals.subscribe();
    let signals = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(signal) => match serde_json::to_string(&signal) {
            Ok(json) => Some(Ok(Event::default().data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize signal for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "SSE subscriber lagged, some signals were dropped");
            None
        }
    });

    Sse::new(signals).keep_alive(KeepAlive::default())
}
