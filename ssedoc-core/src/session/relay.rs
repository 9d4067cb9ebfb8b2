//! State relay
//!
//! One relay task per session drains the session's event queue in FIFO order and
//! forwards each event to the registry channel, bounded by the session deadline.
//! Events that cannot be delivered in time are dropped and logged.
//!
//! The queue is sized so producers never block: workers emit with `try_send`.
//! The upload stream mirror is fed at enqueue time, so it never waits on
//! registry delivery.

use super::registry::{ChannelHandle, DeliveryOutcome};
use ssedoc_common::Notification;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Events a session with `file_count` files can emit, plus control headroom
pub fn queue_capacity(file_count: usize) -> usize {
    4 * file_count + 4
}

/// Delivery counters reported on shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelayStats {
    /// Accepted by an attached reader
    pub delivered: usize,
    /// Timed out or closed before delivery
    pub dropped: usize,
    /// Filtered out by the progress filter
    pub suppressed: usize,
    /// Copied to the upload response stream
    pub mirrored: usize,
}

/// Which events reach observers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressFilter {
    /// Every event
    All,
    /// Only milestone events
    MilestonesOnly,
}

impl ProgressFilter {
    pub fn from_stream_progress(stream_progress: bool) -> Self {
        if stream_progress {
            ProgressFilter::All
        } else {
            ProgressFilter::MilestonesOnly
        }
    }

    pub fn admits(&self, event: &Notification) -> bool {
        match self {
            ProgressFilter::All => true,
            ProgressFilter::MilestonesOnly => event.event.is_milestone(),
        }
    }
}

enum RelayCommand {
    Forward(Notification),
    ForwardSync {
        event: Notification,
        ack: oneshot::Sender<DeliveryOutcome>,
    },
    Stop {
        ack: oneshot::Sender<RelayStats>,
    },
}

/// Non-blocking copy of admitted events for the upload response
#[derive(Clone)]
struct UploadMirror {
    tx: mpsc::Sender<Notification>,
    filter: ProgressFilter,
    mirrored: Arc<AtomicUsize>,
}

impl UploadMirror {
    fn copy(&self, event: &Notification) {
        if !self.filter.admits(event) {
            return;
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => {
                self.mirrored.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                debug!(session_id = %event.guid, "Upload stream lagging, mirror copy skipped");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(session_id = %event.guid, "Upload stream closed");
            }
        }
    }

    fn count(&self) -> usize {
        self.mirrored.load(Ordering::Relaxed)
    }
}

/// Producer side of the session queue
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<RelayCommand>,
    mirror: Option<UploadMirror>,
}

impl EventQueue {
    /// Enqueue without blocking
    ///
    /// Returns `false` if the queue is full or the relay has stopped.
    pub fn emit(&self, event: Notification) -> bool {
        if let Some(mirror) = &self.mirror {
            mirror.copy(&event);
        }
        match self.tx.try_send(RelayCommand::Forward(event)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Session event queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Relay stopped, event dropped");
                false
            }
        }
    }
}

/// Handle on a running relay task
pub struct StateRelay {
    tx: mpsc::Sender<RelayCommand>,
    task: JoinHandle<RelayStats>,
    mirror: Option<UploadMirror>,
}

impl StateRelay {
    /// Start the relay task for one session
    ///
    /// `mirror` receives a non-blocking copy of every admitted event as it is
    /// enqueued.
    pub fn spawn(
        channel: ChannelHandle,
        deadline: Instant,
        capacity: usize,
        filter: ProgressFilter,
        mirror: Option<mpsc::Sender<Notification>>,
    ) -> (Self, EventQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mirror = mirror.map(|tx| UploadMirror {
            tx,
            filter,
            mirrored: Arc::new(AtomicUsize::new(0)),
        });
        let task = tokio::spawn(run_relay(rx, channel, deadline, filter));
        let queue = EventQueue {
            tx: tx.clone(),
            mirror: mirror.clone(),
        };
        (Self { tx, task, mirror }, queue)
    }

    /// Enqueue behind every pending event and wait for its delivery outcome
    pub async fn forward_sync(&self, event: Notification) -> DeliveryOutcome {
        if let Some(mirror) = &self.mirror {
            mirror.copy(&event);
        }
        let (ack, outcome) = oneshot::channel();
        if self
            .tx
            .send(RelayCommand::ForwardSync { event, ack })
            .await
            .is_err()
        {
            return DeliveryOutcome::Closed;
        }
        outcome.await.unwrap_or(DeliveryOutcome::Closed)
    }

    /// Signal stop and wait for the relay's acknowledgement
    pub async fn shutdown(self) -> RelayStats {
        let (ack, stats) = oneshot::channel();
        let acked = match self.tx.send(RelayCommand::Stop { ack }).await {
            Ok(()) => stats.await.ok(),
            Err(_) => None,
        };

        // Queue is closed to producers once the task has exited
        let mut stats = match self.task.await {
            Ok(stats) => acked.unwrap_or(stats),
            Err(e) => {
                warn!(error = %e, "Relay task failed");
                acked.unwrap_or_default()
            }
        };
        stats.mirrored = self.mirror.as_ref().map_or(0, UploadMirror::count);
        stats
    }
}

async fn run_relay(
    mut rx: mpsc::Receiver<RelayCommand>,
    channel: ChannelHandle,
    deadline: Instant,
    filter: ProgressFilter,
) -> RelayStats {
    let mut stats = RelayStats::default();

    while let Some(command) = rx.recv().await {
        match command {
            RelayCommand::Forward(event) => {
                relay_one(&channel, deadline, filter, &mut stats, event).await;
            }
            RelayCommand::ForwardSync { event, ack } => {
                let outcome = relay_one(&channel, deadline, filter, &mut stats, event).await;
                let _ = ack.send(outcome);
            }
            RelayCommand::Stop { ack } => {
                debug!(
                    session_id = %channel.session_id(),
                    delivered = stats.delivered,
                    dropped = stats.dropped,
                    "Relay stopping"
                );
                let _ = ack.send(stats);
                return stats;
            }
        }
    }

    stats
}

async fn relay_one(
    channel: &ChannelHandle,
    deadline: Instant,
    filter: ProgressFilter,
    stats: &mut RelayStats,
    event: Notification,
) -> DeliveryOutcome {
    if !filter.admits(&event) {
        stats.suppressed += 1;
        return DeliveryOutcome::Suppressed;
    }

    let state = event.event;
    let task_id = event.uuid.clone();
    let outcome = channel.send_until(event, deadline).await;
    match outcome {
        DeliveryOutcome::Delivered => {
            stats.delivered += 1;
            debug!(session_id = %channel.session_id(), task_id = %task_id, state = %state, "Event forwarded");
        }
        _ => {
            stats.dropped += 1;
            warn!(
                session_id = %channel.session_id(),
                task_id = %task_id,
                state = %state,
                outcome = ?outcome,
                "Event dropped"
            );
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::registry::SessionRegistry;
    use ssedoc_common::EventState;
    use std::time::Duration;
    use uuid::Uuid;

    fn task_event(state: EventState) -> Notification {
        Notification::task("s1", Uuid::nil(), state, "a.txt")
    }

    #[tokio::test]
    async fn test_forwards_in_fifo_order() {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();
        let mut rx = channel.take_receiver().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let (relay, queue) = StateRelay::spawn(channel, deadline, 8, ProgressFilter::All, None);

        assert!(queue.emit(task_event(EventState::FileQueued)));
        assert!(queue.emit(task_event(EventState::FileProcessingStarted)));
        let reader = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(event) = rx.recv().await {
                seen.push(event.event);
                if event.event.is_terminal() {
                    break;
                }
            }
            seen
        });

        let outcome = relay
            .forward_sync(Notification::session("s1", EventState::Completed))
            .await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);

        let stats = relay.shutdown().await;
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.dropped, 0);
        assert_eq!(
            reader.await.unwrap(),
            vec![
                EventState::FileQueued,
                EventState::FileProcessingStarted,
                EventState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_drops_after_deadline_without_reader() {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        let (relay, queue) = StateRelay::spawn(channel, deadline, 8, ProgressFilter::All, None);

        queue.emit(task_event(EventState::FileQueued));
        let outcome = relay
            .forward_sync(Notification::session("s1", EventState::Completed))
            .await;
        assert_eq!(outcome, DeliveryOutcome::TimedOut);

        let stats = relay.shutdown().await;
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped, 2);
    }

    #[tokio::test]
    async fn test_milestone_filter_and_mirror() {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();
        let _rx = channel.take_receiver();

        let (mirror_tx, mut mirror_rx) = mpsc::channel(8);
        let deadline = Instant::now() + Duration::from_millis(100);
        let (relay, queue) = StateRelay::spawn(
            channel,
            deadline,
            8,
            ProgressFilter::MilestonesOnly,
            Some(mirror_tx),
        );

        queue.emit(Notification::session("s1", EventState::UploadStarted));
        queue.emit(task_event(EventState::FileQueued));
        relay
            .forward_sync(task_event(EventState::FileProcessed))
            .await;

        let stats = relay.shutdown().await;
        assert_eq!(stats.suppressed, 2);
        assert_eq!(stats.mirrored, 1);
        assert_eq!(mirror_rx.recv().await.unwrap().event, EventState::FileProcessed);
    }

    #[tokio::test]
    async fn test_mirror_does_not_wait_for_registry_delivery() {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();

        let (mirror_tx, mut mirror_rx) = mpsc::channel(8);
        let deadline = Instant::now() + Duration::from_secs(3);
        let (relay, queue) =
            StateRelay::spawn(channel, deadline, 8, ProgressFilter::All, Some(mirror_tx));

        // No reader: the first event holds the relay until the deadline
        let started = Instant::now();
        queue.emit(Notification::session("s1", EventState::UploadStarted));
        queue.emit(task_event(EventState::FileQueued));
        queue.emit(task_event(EventState::FileProcessed));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(mirror_rx.recv().await.unwrap().event);
        }
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(
            seen,
            vec![
                EventState::UploadStarted,
                EventState::FileQueued,
                EventState::FileProcessed
            ]
        );

        registry.close("s1");
        let stats = relay.shutdown().await;
        assert_eq!(stats.mirrored, 3);
    }

    #[tokio::test]
    async fn test_emit_after_shutdown_is_rejected() {
        let registry = SessionRegistry::new();
        let channel = registry.open("s1").unwrap();
        let deadline = Instant::now() + Duration::from_millis(10);
        let (relay, queue) = StateRelay::spawn(channel, deadline, 4, ProgressFilter::All, None);

        relay.shutdown().await;
        assert!(!queue.emit(task_event(EventState::FileQueued)));
    }

    #[test]
    fn test_queue_capacity_covers_every_event() {
        // upload_started + 4 per file + completed
        assert!(queue_capacity(10) >= 1 + 4 * 10 + 1);
    }
}
