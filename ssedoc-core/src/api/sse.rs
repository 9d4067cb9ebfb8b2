//! Server-Sent Events delivery sink endpoint
//!
//! `GET /sse?guid=<session id>` attaches the single reader of an upload session
//! and streams its events as `data: <json>` records until the session completes.

use crate::error::ApiResult;
use crate::session::DeliverySink;
use crate::AppState;
use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use ssedoc_common::sse::{into_stream_response, to_sse_event};
use std::convert::Infallible;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    pub guid: Option<String>,
}

/// GET /sse - event stream for one upload session
pub async fn session_event_stream(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
) -> ApiResult<Response> {
    let settings = state.sessions.settings();
    let session_id = query.guid.unwrap_or_default();

    let mut sink =
        DeliverySink::attach(&state.registry, &session_id, settings.attach_grace).await?;
    let deadline = settings.deadline_from(Instant::now());
    info!(session_id = %sink.session_id(), "SSE client connected");

    let stream = async_stream::stream! {
        while let Some(notification) = sink.recv_until(deadline).await {
            match to_sse_event(&notification) {
                Ok(event) => {
                    debug!(session_id = %notification.guid, state = %notification.event, "SSE: sending event");
                    yield Ok::<_, Infallible>(event);
                }
                Err(e) => {
                    warn!(state = %notification.event, error = %e, "SSE: failed to serialize event");
                }
            }
        }
        debug!(session_id = %sink.session_id(), "SSE: stream finished");
    };

    Ok(into_stream_response(stream))
}

/// Build SSE routes
pub fn sse_routes() -> Router<AppState> {
    Router::new().route("/sse", get(session_event_stream))
}
