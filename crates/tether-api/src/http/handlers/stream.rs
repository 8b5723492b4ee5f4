//! SSE snapshot stream.
//!
//! GET /api/v1/hosts/{ip}/sessions/{sid}/events
//!
//! Attaches an observer loop to the session and forwards every snapshot as
//! a `snapshot` event whose data is the JSON `SessionSnapshot`. The observer
//! is cancelled when the client disconnects or the server shuts down.

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::Stream;

use crate::http::error::AppError;
use crate::http::extractors::Target;
use crate::state::AppState;

pub const SNAPSHOT_EVENT: &str = "snapshot";

pub async fn stream_events(
    State(state): State<AppState>,
    Target(key): Target,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let cancel = state.shutdown.child_token();
    let mut snapshots = state.hub.observe(key.clone(), cancel.clone());
    tracing::info!(key = %key, "observer attached");

    let sse_stream = async_stream::stream! {
        // Dropped with the stream when the client goes away.
        let _guard = cancel.drop_guard();

        while let Some(snapshot) = snapshots.recv().await {
            match Event::default().event(SNAPSHOT_EVENT).json_data(&snapshot) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => tracing::warn!(key = %key, error = %e, "failed to encode snapshot"),
            }
        }
        tracing::info!(key = %key, "observer detached");
    };

    Ok(Sse::new(sse_stream)
        .keep_alive(KeepAlive::new().interval(state.config().stream.keep_alive())))
}
