//! File worker
//!
//! One tokio task per submitted file. The worker moves its task through the state
//! machine, runs a single extraction on the blocking pool and emits at most four
//! events. A [`TaskGuard`] owns the task, the queue producer and the barrier ticket,
//! so COMPLETED is emitted and the barrier signalled on every exit path.

use super::barrier::BarrierTicket;
use super::relay::EventQueue;
use super::task::{FileTask, TaskFailure, TaskReport, TaskState};
use crate::extractors::{detect, ContentProbe, ExtractorTable};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Run one file task to completion
pub(crate) async fn run_file_task(
    task: FileTask,
    spool: NamedTempFile,
    extractors: Arc<ExtractorTable>,
    queue: EventQueue,
    ticket: BarrierTicket,
) -> TaskReport {
    let mut guard = TaskGuard::new(task, queue, ticket);
    guard.advance(TaskState::ProcessingStarted);

    let filename = guard.task.filename().to_string();
    let declared = guard.task.declared_type().map(str::to_string);

    let (detected, result) = match tokio::task::spawn_blocking(move || {
        extract_spooled(spool, &extractors, &filename, declared.as_deref())
    })
    .await
    {
        Ok(pair) => pair,
        Err(e) => (None, Err(TaskFailure::Panicked(panic_message(e)))),
    };
    guard.task.set_detected_type(detected);

    match result {
        Ok(content) if !content.trim().is_empty() => guard.succeed(content),
        Ok(_) => guard.fail(TaskFailure::EmptyContent),
        Err(failure) => guard.fail(failure),
    }

    guard.complete()
}

/// Sniff, route and extract; the spool file is removed when this returns
fn extract_spooled(
    spool: NamedTempFile,
    extractors: &ExtractorTable,
    filename: &str,
    declared_type: Option<&str>,
) -> (Option<String>, Result<String, TaskFailure>) {
    let mut file = match spool.reopen() {
        Ok(file) => file,
        Err(e) => return (None, Err(TaskFailure::Open(e))),
    };

    let detected = match detect::sniff_file(&mut file) {
        Ok(detected) => detected,
        Err(e) => return (None, Err(TaskFailure::Sniff(e))),
    };
    let mime = Some(detected.mime().to_string());

    let probe = ContentProbe {
        filename,
        declared_type,
        detected: &detected,
    };
    let Some(extractor) = extractors.route(&probe) else {
        return (mime, Err(TaskFailure::Unsupported));
    };

    debug!(
        file_name = %filename,
        detected = %detected,
        extractor = extractor.name(),
        "Extractor selected"
    );

    let result = extractor
        .extract(&mut file)
        .map_err(|source| TaskFailure::Extraction {
            extractor: extractor.name(),
            source,
        });
    (mime, result)
}

/// Human-readable panic payload of a failed blocking task
pub(crate) fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "extraction cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Finalizer for one file task
struct TaskGuard {
    task: FileTask,
    queue: EventQueue,
    finished: bool,
    // Dropped after `Drop::drop` has emitted the final events
    _ticket: BarrierTicket,
}

impl TaskGuard {
    fn new(task: FileTask, queue: EventQueue, ticket: BarrierTicket) -> Self {
        Self {
            task,
            queue,
            finished: false,
            _ticket: ticket,
        }
    }

    fn advance(&mut self, next: TaskState) {
        match self.task.transition_to(next) {
            Ok(event) => {
                self.queue.emit(event);
            }
            Err(e) => warn!(task_id = %self.task.task_id(), error = %e, "Transition rejected"),
        }
    }

    fn succeed(&mut self, content: String) {
        let size = content.len();
        match self.task.succeed(content) {
            Ok(event) => {
                info!(
                    task_id = %self.task.task_id(),
                    file_name = %self.task.filename(),
                    chars = size,
                    "File processed"
                );
                self.queue.emit(event);
            }
            Err(e) => warn!(task_id = %self.task.task_id(), error = %e, "Transition rejected"),
        }
    }

    fn fail(&mut self, failure: TaskFailure) {
        match self.task.fail(&failure) {
            Ok(event) => {
                warn!(
                    task_id = %self.task.task_id(),
                    file_name = %self.task.filename(),
                    reason = %failure,
                    "File processing failed"
                );
                self.queue.emit(event);
            }
            Err(e) => warn!(task_id = %self.task.task_id(), error = %e, "Transition rejected"),
        }
    }

    /// Emit COMPLETED and hand back the report
    fn complete(mut self) -> TaskReport {
        self.advance(TaskState::Completed);
        self.finished = true;
        self.task.report()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        // Unwound before COMPLETED: close the sequence as an aborted task
        if self.task.state() == TaskState::Queued {
            self.advance(TaskState::ProcessingStarted);
        }
        if self.task.state() == TaskState::ProcessingStarted {
            self.fail(TaskFailure::Aborted);
        }
        if !self.task.state().is_terminal() {
            self.advance(TaskState::Completed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::mock::MockExtractor;
    use crate::session::barrier::CompletionBarrier;
    use crate::session::registry::SessionRegistry;
    use crate::session::relay::{ProgressFilter, StateRelay};
    use crate::session::spool::SubmittedFile;
    use ssedoc_common::{EventState, Notification};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct Harness {
        relay: StateRelay,
        queue: EventQueue,
        mirror: mpsc::Receiver<Notification>,
        barrier: CompletionBarrier,
    }

    fn harness() -> Harness {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();
        let (mirror_tx, mirror) = mpsc::channel(32);
        let deadline = Instant::now() + Duration::from_millis(10);
        let (relay, queue) =
            StateRelay::spawn(channel, deadline, 32, ProgressFilter::All, Some(mirror_tx));
        Harness {
            relay,
            queue,
            mirror,
            barrier: CompletionBarrier::new(),
        }
    }

    async fn run_one(table: ExtractorTable, name: &str, body: &[u8]) -> (TaskReport, Vec<Notification>) {
        let mut h = harness();
        let (filename, declared, spool) =
            SubmittedFile::from_bytes(name, None, body).unwrap().into_parts();
        let task = FileTask::new("s1", &filename, declared.as_deref());
        let ticket = h.barrier.enter();

        let report = run_file_task(task, spool, Arc::new(table), h.queue.clone(), ticket).await;
        assert_eq!(h.barrier.wait().await, 1);

        drop(h.queue);
        h.relay.shutdown().await;
        let mut events = Vec::new();
        while let Some(event) = h.mirror.recv().await {
            events.push(event);
        }
        (report, events)
    }

    fn labels(events: &[Notification]) -> Vec<EventState> {
        events.iter().map(|e| e.event).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_extraction() {
        let (report, events) =
            run_one(ExtractorTable::standard(10), "notes.txt", b"some notes\n").await;

        assert_eq!(report.content.as_deref(), Some("some notes\n"));
        assert_eq!(report.detected_type.as_deref(), Some(detect::TEXT_PLAIN_UTF8));
        assert_eq!(
            labels(&events),
            vec![
                EventState::FileProcessingStarted,
                EventState::FileProcessed,
                EventState::FileCompleted
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unsupported_content() {
        let (report, events) =
            run_one(ExtractorTable::standard(10), "blob.bin", &[0u8, 1, 2, 3]).await;

        assert_eq!(report.reason.as_deref(), Some("unsupported content"));
        assert_eq!(events[1].event, EventState::FileProcessingError);
        assert_eq!(events[1].reason.as_deref(), Some("unsupported content"));
        assert_eq!(events[2].event, EventState::FileCompleted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_content() {
        let (report, events) = run_one(ExtractorTable::standard(10), "empty.txt", b"  \n").await;

        assert_eq!(report.outcome, Some(crate::session::task::TaskOutcome::EmptyContentError));
        assert_eq!(
            labels(&events),
            vec![
                EventState::FileProcessingStarted,
                EventState::FileProcessingError,
                EventState::FileCompleted
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_extractor_panic_is_recovered() {
        let table = ExtractorTable::new().with_route(|_| true, MockExtractor::panicking());
        let (report, events) = run_one(table, "boom.txt", b"boom").await;

        assert!(report.reason.unwrap().contains("mock extractor panic"));
        assert_eq!(events.last().unwrap().event, EventState::FileCompleted);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_extractor_error_names_route() {
        let table = ExtractorTable::new().with_route(|_| true, MockExtractor::failing());
        let (report, _) = run_one(table, "bad.txt", b"bad").await;

        assert_eq!(
            report.reason.as_deref(),
            Some("mock extraction failed: malformed document: mock failure")
        );
    }

    #[tokio::test]
    async fn test_dropped_guard_completes_sequence() {
        let mut h = harness();
        let task = FileTask::new("s1", "a.txt", None);
        let guard = TaskGuard::new(task, h.queue.clone(), h.barrier.enter());
        drop(guard);

        assert_eq!(h.barrier.wait().await, 1);
        drop(h.queue);
        h.relay.shutdown().await;

        let mut events = Vec::new();
        while let Some(event) = h.mirror.recv().await {
            events.push(event);
        }
        assert_eq!(
            labels(&events),
            vec![
                EventState::FileProcessingStarted,
                EventState::FileProcessingError,
                EventState::FileCompleted
            ]
        );
        assert_eq!(events[1].reason.as_deref(), Some("worker aborted"));
    }
}
