//! Upload endpoint
//!
//! `POST /upload` takes multipart `file` parts plus an optional `guid` field. Every
//! part is spooled to a temporary file before the session starts. The response is
//! an SSE stream mirroring the session's events, from `upload_started` to
//! `completed`. The session keeps running if the uploading client goes away.

use crate::error::{ApiError, ApiResult};
use crate::session::SubmittedFile;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::Response,
    routing::post,
    Router,
};
use ssedoc_common::sse::{into_stream_response, to_sse_event};
use std::convert::Infallible;
use tracing::{debug, info, warn};

/// Multipart field carrying an uploaded file
const FILE_FIELD: &str = "file";
/// Multipart field carrying the caller's session id
const SESSION_FIELD: &str = "guid";

/// POST /upload
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> ApiResult<Response> {
    let settings = state.sessions.settings();

    let mut session_id: Option<String> = None;
    let mut files = Vec::new();
    let mut submitted = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(SESSION_FIELD) => {
                session_id = Some(field.text().await.map_err(multipart_error)?);
            }
            Some(FILE_FIELD) => {
                submitted += 1;
                if submitted > settings.max_files {
                    // Counted for the size check, never spooled
                    continue;
                }

                let filename = field.file_name().unwrap_or("upload").to_string();
                let declared_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                debug!(file_name = %filename, size = bytes.len(), "Spooling uploaded file");

                let file = tokio::task::spawn_blocking(move || {
                    SubmittedFile::from_bytes(&filename, declared_type.as_deref(), &bytes)
                })
                .await
                .map_err(|e| ApiError::Internal(format!("spooling task failed: {}", e)))??;
                files.push(file);
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    settings.validate_batch(submitted)?;
    let mut session = state.sessions.open(session_id.as_deref(), files)?;
    let mut mirror = session.mirror();
    info!(session_id = %session.id(), files = session.file_count(), "Upload accepted");

    tokio::spawn(async move {
        let report = session.run().await;
        debug!(
            session_id = %report.session_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            deadline_elapsed = report.deadline_elapsed,
            "Session report"
        );
    });

    let stream = async_stream::stream! {
        while let Some(notification) = mirror.recv().await {
            match to_sse_event(&notification) {
                Ok(event) => {
                    yield Ok::<_, Infallible>(event);
                }
                Err(e) => {
                    warn!(state = %notification.event, error = %e, "Upload stream: failed to serialize event");
                }
            }
        }
    };

    Ok(into_stream_response(stream))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build upload routes
pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload))
}
