//! Server-sent event stream of processing and queue events

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{stream, Stream, StreamExt};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;

use crate::server::state::AppState;

/// GET /api/events
///
/// Processing events arrive with their own `type` as the SSE event name;
/// queue changes are sent under `queue`. Lagging clients silently drop events.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let processing = BroadcastStream::new(state.orchestrator().subscribe()).filter_map(|event| async move {
        let event = event.ok()?;
        let json = serde_json::to_value(&event).ok()?;
        let name = json.get("type")?.as_str()?.to_string();
        Some(Ok::<_, Infallible>(Event::default().event(name).data(json.to_string())))
    });

    let queue = BroadcastStream::new(state.queue().subscribe()).filter_map(|event| async move {
        let event = event.ok()?;
        let data = serde_json::to_string(&event).ok()?;
        Some(Ok::<_, Infallible>(Event::default().event("queue").data(data)))
    });

    Sse::new(stream::select(processing, queue)).keep_alive(KeepAlive::default())
}
