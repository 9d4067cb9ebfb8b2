//! Event types for the upload progress stream
//!
//! A [`Notification`] is the immutable record produced by session start, by a file
//! task transition, or by session completion. The same value travels through the
//! relay queue, the registry channel and finally onto the SSE wire as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State label carried by a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    /// Session accepted, workers about to launch
    UploadStarted,
    /// File accepted into the batch
    FileQueued,
    /// Worker picked the file up
    FileProcessingStarted,
    /// Extraction produced non-empty content
    FileProcessed,
    /// Unsupported type, extraction failure or empty content
    FileProcessingError,
    /// Task finished, whatever the outcome
    FileCompleted,
    /// Every task of the session reached `FileCompleted`
    Completed,
}

impl EventState {
    /// Wire label, identical to the serde representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventState::UploadStarted => "upload_started",
            EventState::FileQueued => "file_queued",
            EventState::FileProcessingStarted => "file_processing_started",
            EventState::FileProcessed => "file_processed",
            EventState::FileProcessingError => "file_processing_error",
            EventState::FileCompleted => "file_completed",
            EventState::Completed => "completed",
        }
    }

    /// Milestones are streamed even when progress streaming is disabled
    pub fn is_milestone(&self) -> bool {
        matches!(
            self,
            EventState::FileProcessed
                | EventState::FileProcessingError
                | EventState::FileCompleted
                | EventState::Completed
        )
    }

    /// Terminal for the whole stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventState::Completed)
    }
}

impl std::fmt::Display for EventState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress notification
///
/// Wire shape: `{"guid": .., "uuid": .., "event": .., "data": <file name|null>, "timestamp": ..}`
/// plus `"reason"` on processing errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Session identifier
    pub guid: String,
    /// Task identifier, empty for session-level events
    pub uuid: String,
    /// State label
    pub event: EventState,
    /// Original file name, if the event concerns a file
    #[serde(rename = "data", default)]
    pub file_name: Option<String>,
    /// Failure reason for `file_processing_error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Session-level notification
    pub fn session(session_id: &str, event: EventState) -> Self {
        Self {
            guid: session_id.to_string(),
            uuid: String::new(),
            event,
            file_name: None,
            reason: None,
            timestamp: Utc::now(),
        }
    }

    /// Notification for one file task
    pub fn task(session_id: &str, task_id: Uuid, event: EventState, file_name: &str) -> Self {
        Self {
            guid: session_id.to_string(),
            uuid: task_id.to_string(),
            event,
            file_name: Some(file_name.to_string()),
            reason: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_session_level(&self) -> bool {
        self.uuid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels_match_serde() {
        for state in [
            EventState::UploadStarted,
            EventState::FileQueued,
            EventState::FileProcessingStarted,
            EventState::FileProcessed,
            EventState::FileProcessingError,
            EventState::FileCompleted,
            EventState::Completed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn test_milestones() {
        assert!(!EventState::UploadStarted.is_milestone());
        assert!(!EventState::FileQueued.is_milestone());
        assert!(!EventState::FileProcessingStarted.is_milestone());
        assert!(EventState::FileProcessed.is_milestone());
        assert!(EventState::FileProcessingError.is_milestone());
        assert!(EventState::FileCompleted.is_milestone());
        assert!(EventState::Completed.is_milestone());
    }

    #[test]
    fn test_session_notification_wire_shape() {
        let n = Notification::session("abc", EventState::Completed);
        let value: serde_json::Value = serde_json::to_value(&n).unwrap();

        assert_eq!(value["guid"], "abc");
        assert_eq!(value["uuid"], "");
        assert_eq!(value["event"], "completed");
        assert!(value["data"].is_null());
        assert!(value.get("reason").is_none());
        assert!(n.is_session_level());
    }

    #[test]
    fn test_task_notification_carries_reason() {
        let task_id = Uuid::new_v4();
        let n = Notification::task("abc", task_id, EventState::FileProcessingError, "a.bin")
            .with_reason("unsupported content");
        let value: serde_json::Value = serde_json::to_value(&n).unwrap();

        assert_eq!(value["uuid"], task_id.to_string());
        assert_eq!(value["data"], "a.bin");
        assert_eq!(value["reason"], "unsupported content");
        assert!(!n.is_session_level());
    }
}
