//! File task state machine
//!
//! QUEUED → PROCESSING_STARTED → {PROCESSED | PROCESSING_ERROR} → COMPLETED
//!
//! Every accepted transition yields exactly one [`Notification`]. COMPLETED is
//! terminal whatever the extraction result.

use crate::extractors::ExtractionError;
use serde::Serialize;
use ssedoc_common::{EventState, Notification};
use thiserror::Error;
use uuid::Uuid;

/// File task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    ProcessingStarted,
    Processed,
    ProcessingError,
    Completed,
}

impl TaskState {
    /// Wire label announcing entry into this state
    pub fn event(&self) -> EventState {
        match self {
            TaskState::Queued => EventState::FileQueued,
            TaskState::ProcessingStarted => EventState::FileProcessingStarted,
            TaskState::Processed => EventState::FileProcessed,
            TaskState::ProcessingError => EventState::FileProcessingError,
            TaskState::Completed => EventState::FileCompleted,
        }
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Queued, TaskState::ProcessingStarted)
                | (TaskState::ProcessingStarted, TaskState::Processed)
                | (TaskState::ProcessingStarted, TaskState::ProcessingError)
                | (TaskState::Processed, TaskState::Completed)
                | (TaskState::ProcessingError, TaskState::Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed)
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Invalid task transition: {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: TaskState,
    pub to: TaskState,
}

/// Terminal result of a file task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    ProcessingError,
    EmptyContentError,
}

/// Why a task ended in PROCESSING_ERROR
///
/// The display text is the `reason` carried on the wire.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("cannot open uploaded file: {0}")]
    Open(#[source] std::io::Error),

    #[error("cannot read uploaded file: {0}")]
    Sniff(#[source] std::io::Error),

    #[error("unsupported content")]
    Unsupported,

    #[error("{extractor} extraction failed: {source}")]
    Extraction {
        extractor: &'static str,
        #[source]
        source: ExtractionError,
    },

    #[error("empty content")]
    EmptyContent,

    #[error("extractor panicked: {0}")]
    Panicked(String),

    #[error("worker aborted")]
    Aborted,
}

impl TaskFailure {
    pub fn outcome(&self) -> TaskOutcome {
        match self {
            TaskFailure::EmptyContent => TaskOutcome::EmptyContentError,
            _ => TaskOutcome::ProcessingError,
        }
    }
}

/// Per-task result returned through the worker's join handle
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub task_id: Uuid,
    pub filename: String,
    pub declared_type: Option<String>,
    pub detected_type: Option<String>,
    pub state: TaskState,
    pub outcome: Option<TaskOutcome>,
    pub content: Option<String>,
    pub reason: Option<String>,
}

/// One submitted file's unit of work
#[derive(Debug)]
pub struct FileTask {
    session_id: String,
    task_id: Uuid,
    filename: String,
    declared_type: Option<String>,
    detected_type: Option<String>,
    state: TaskState,
    outcome: Option<TaskOutcome>,
    content: Option<String>,
    reason: Option<String>,
}

impl FileTask {
    /// New task in QUEUED
    pub fn new(session_id: &str, filename: &str, declared_type: Option<&str>) -> Self {
        Self {
            session_id: session_id.to_string(),
            task_id: ssedoc_common::uuid_utils::new_task_id(),
            filename: filename.to_string(),
            declared_type: declared_type.map(str::to_string),
            detected_type: None,
            state: TaskState::Queued,
            outcome: None,
            content: None,
            reason: None,
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_type(&self) -> Option<&str> {
        self.declared_type.as_deref()
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn set_detected_type(&mut self, mime: Option<String>) {
        self.detected_type = mime;
    }

    /// Notification for the current state, used for the initial QUEUED event
    pub fn current_event(&self) -> Notification {
        self.notification(self.state)
    }

    /// Move to `next`, returning the event announcing it
    pub fn transition_to(&mut self, next: TaskState) -> Result<Notification, TransitionError> {
        if !self.state.can_transition_to(next) {
            return Err(TransitionError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(self.notification(next))
    }

    /// PROCESSING_STARTED → PROCESSED with extracted content
    pub fn succeed(&mut self, content: String) -> Result<Notification, TransitionError> {
        let event = self.transition_to(TaskState::Processed)?;
        self.outcome = Some(TaskOutcome::Success);
        self.content = Some(content);
        Ok(event)
    }

    /// PROCESSING_STARTED → PROCESSING_ERROR with a reason
    pub fn fail(&mut self, failure: &TaskFailure) -> Result<Notification, TransitionError> {
        let event = self.transition_to(TaskState::ProcessingError)?;
        let reason = failure.to_string();
        self.outcome = Some(failure.outcome());
        self.reason = Some(reason.clone());
        Ok(event.with_reason(reason))
    }

    pub fn report(&self) -> TaskReport {
        TaskReport {
            task_id: self.task_id,
            filename: self.filename.clone(),
            declared_type: self.declared_type.clone(),
            detected_type: self.detected_type.clone(),
            state: self.state,
            outcome: self.outcome,
            content: self.content.clone(),
            reason: self.reason.clone(),
        }
    }

    fn notification(&self, state: TaskState) -> Notification {
        Notification::task(&self.session_id, self.task_id, state.event(), &self.filename)
    }
}
