//! Server-Sent Events (SSE) utilities
//!
//! Every notification is rendered as one line-oriented record:
//! `data: <json-encoded notification>\n\n`.

use crate::events::Notification;
use crate::Result;
use axum::http::{header::HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;

/// Keep-alive interval for long-lived streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Build the axum SSE event for a notification
pub fn to_sse_event(notification: &Notification) -> Result<Event> {
    let json = serde_json::to_string(notification)?;
    Ok(Event::default().data(json))
}

/// Wrap a stream into an SSE response with heartbeat and proxy buffering disabled
pub fn into_stream_response<S>(stream: S) -> Response
where
    S: Stream<Item = std::result::Result<Event, Infallible>> + Send + 'static,
{
    let sse = Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    );

    (
        [(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        )],
        sse,
    )
        .into_response()
}
