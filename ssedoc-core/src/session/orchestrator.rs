//! Session orchestration
//!
//! Validates a batch, opens the registry entry, fans out one worker per file and
//! waits on the completion barrier. Once every worker has finished it forwards the
//! session COMPLETED event behind all task events, stops the relay and closes the
//! registry entry.
//!
//! The session deadline is fixed when the session starts running. It bounds event
//! delivery only; workers are never cancelled by it.

use super::barrier::CompletionBarrier;
use super::registry::{ChannelHandle, DeliveryOutcome, RegistryError, SessionRegistry};
use super::relay::{queue_capacity, ProgressFilter, RelayStats, StateRelay};
use super::spool::SubmittedFile;
use super::task::{FileTask, TaskOutcome, TaskReport, TaskState};
use super::worker::{panic_message, run_file_task};
use crate::extractors::ExtractorTable;
use ssedoc_common::config::UploadConfig;
use ssedoc_common::uuid_utils::resolve_session_id;
use ssedoc_common::{EventState, Notification};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Batch validation and session start errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("at least 1 file required")]
    NoFiles,

    #[error("only {max} files maximum allowed")]
    TooManyFiles { max: usize, submitted: usize },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Upper bound on any session deadline (about 30 years)
pub const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Per-session tunables
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Delivery deadline, from session start
    pub timeout: Duration,
    pub max_files: usize,
    /// Forward every event, not only milestones
    pub stream_progress: bool,
    /// How long a sink waits for its session to appear
    pub attach_grace: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&UploadConfig::default())
    }
}

impl SessionSettings {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_files: config.max_files,
            stream_progress: config.stream_progress,
            attach_grace: config.attach_grace(),
        }
    }

    /// Delivery deadline for a session starting at `start`
    ///
    /// Saturates at [`FAR_FUTURE`] past `start` instead of overflowing.
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start
            .checked_add(self.timeout.min(FAR_FUTURE))
            .unwrap_or(start + FAR_FUTURE)
    }

    pub fn validate_batch(&self, submitted: usize) -> Result<(), SessionError> {
        if submitted == 0 {
            return Err(SessionError::NoFiles);
        }
        if submitted > self.max_files {
            return Err(SessionError::TooManyFiles {
                max: self.max_files,
                submitted,
            });
        }
        Ok(())
    }
}

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    /// One report per file, in submission order
    pub tasks: Vec<TaskReport>,
    pub relay: RelayStats,
    /// Completion signals seen by the barrier
    pub completions: usize,
    pub deadline_elapsed: bool,
    /// Delivery of the session COMPLETED event
    pub completed_delivery: DeliveryOutcome,
    pub elapsed: Duration,
}

impl SessionReport {
    pub fn succeeded(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.outcome == Some(TaskOutcome::Success))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.tasks.len() - self.succeeded()
    }
}

/// Starts upload sessions
#[derive(Clone)]
pub struct SessionOrchestrator {
    registry: SessionRegistry,
    extractors: Arc<ExtractorTable>,
    settings: SessionSettings,
}

impl SessionOrchestrator {
    pub fn new(
        registry: SessionRegistry,
        extractors: Arc<ExtractorTable>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            registry,
            extractors,
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Validate the batch and open the session's registry entry
    ///
    /// Nothing is spawned until [`PreparedSession::run`].
    pub fn open(
        &self,
        session_id: Option<&str>,
        files: Vec<SubmittedFile>,
    ) -> Result<PreparedSession, SessionError> {
        self.settings.validate_batch(files.len())?;

        let session_id = resolve_session_id(session_id);
        let channel = self.registry.open(&session_id)?;

        Ok(PreparedSession {
            session_id,
            channel,
            files,
            extractors: Arc::clone(&self.extractors),
            settings: self.settings.clone(),
            mirror: None,
        })
    }

    /// Open and run a session to completion
    pub async fn process(
        &self,
        session_id: Option<&str>,
        files: Vec<SubmittedFile>,
    ) -> Result<SessionReport, SessionError> {
        Ok(self.open(session_id, files)?.run().await)
    }
}

/// Validated session holding its registry entry, not yet running
pub struct PreparedSession {
    session_id: String,
    channel: ChannelHandle,
    files: Vec<SubmittedFile>,
    extractors: Arc<ExtractorTable>,
    settings: SessionSettings,
    mirror: Option<mpsc::Sender<Notification>>,
}

impl PreparedSession {
    pub fn id(&self) -> &str {
        &self.session_id
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Receive a copy of every admitted event as it is enqueued
    ///
    /// The receiver ends once the session entry is closed.
    pub fn mirror(&mut self) -> mpsc::Receiver<Notification> {
        let (tx, rx) = mpsc::channel(queue_capacity(self.files.len()));
        self.mirror = Some(tx);
        rx
    }

    /// Run every file task and close the session
    pub async fn run(self) -> SessionReport {
        let PreparedSession {
            session_id,
            channel,
            files,
            extractors,
            settings,
            mirror,
        } = self;

        // Closes the entry even if this future panics or is dropped
        let entry = EntryGuard {
            channel: channel.clone(),
        };
        let started = Instant::now();
        let deadline = settings.deadline_from(started);
        let file_count = files.len();
        // Mirror readers see end-of-stream only once the entry is closed
        let mirror_hold = mirror.clone();

        let (relay, queue) = StateRelay::spawn(
            channel.clone(),
            deadline,
            queue_capacity(file_count),
            ProgressFilter::from_stream_progress(settings.stream_progress),
            mirror,
        );

        info!(
            session_id = %session_id,
            files = file_count,
            timeout_secs = settings.timeout.as_secs(),
            "Upload session started"
        );
        queue.emit(Notification::session(&session_id, EventState::UploadStarted));

        let queued: Vec<_> = files
            .into_iter()
            .map(|file| {
                let (filename, declared_type, spool) = file.into_parts();
                let task = FileTask::new(&session_id, &filename, declared_type.as_deref());
                queue.emit(task.current_event());
                (task, spool)
            })
            .collect();

        let barrier = CompletionBarrier::new();
        let mut workers = Vec::with_capacity(file_count);
        for (task, spool) in queued {
            let identity = (
                task.task_id(),
                task.filename().to_string(),
                task.declared_type().map(str::to_string),
            );
            let handle = tokio::spawn(run_file_task(
                task,
                spool,
                Arc::clone(&extractors),
                queue.clone(),
                barrier.enter(),
            ));
            workers.push((identity, handle));
        }
        drop(queue);

        let watch = barrier.watch();
        let wait = barrier.wait();
        tokio::pin!(wait);
        let (completions, deadline_elapsed) = match tokio::time::timeout_at(deadline, &mut wait).await {
            Ok(completions) => (completions, false),
            Err(_) => {
                warn!(
                    session_id = %session_id,
                    outstanding = watch.outstanding(),
                    completed = watch.completed(),
                    "Session deadline elapsed, waiting for remaining workers"
                );
                channel.close();
                (wait.await, true)
            }
        };

        let mut tasks = Vec::with_capacity(file_count);
        for ((task_id, filename, declared_type), handle) in workers {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    let reason = panic_message(e);
                    error!(task_id = %task_id, file_name = %filename, reason = %reason, "Worker panicked");
                    aborted_report(task_id, filename, declared_type)
                }
            };
            tasks.push(report);
        }

        let completed_delivery = relay
            .forward_sync(Notification::session(&session_id, EventState::Completed))
            .await;
        let relay_stats = relay.shutdown().await;
        drop(entry);
        drop(mirror_hold);

        let elapsed = started.elapsed();
        info!(
            session_id = %session_id,
            completions,
            delivered = relay_stats.delivered,
            dropped = relay_stats.dropped,
            elapsed_ms = elapsed.as_millis() as u64,
            "Upload session completed"
        );

        SessionReport {
            session_id,
            tasks,
            relay: relay_stats,
            completions,
            deadline_elapsed,
            completed_delivery,
            elapsed,
        }
    }
}

struct EntryGuard {
    channel: ChannelHandle,
}

impl Drop for EntryGuard {
    fn drop(&mut self) {
        self.channel.close();
    }
}

fn aborted_report(task_id: Uuid, filename: String, declared_type: Option<String>) -> TaskReport {
    TaskReport {
        task_id,
        filename,
        declared_type,
        detected_type: None,
        state: TaskState::Completed,
        outcome: Some(TaskOutcome::ProcessingError),
        content: None,
        reason: Some("worker aborted".to_string()),
    }
}
