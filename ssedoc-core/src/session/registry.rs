//! Session registry
//!
//! Process-wide store mapping a session id to its event channel. The map itself is
//! private; `open`, `lookup` and `close` are the only ways in.
//!
//! Each entry owns:
//! - a bounded channel (capacity 1) written by the session relay and read by at
//!   most one delivery sink,
//! - an attach flag, raised when a sink takes the receiver,
//! - a close token, cancelled when the entry is removed so in-flight sends abort.
//!
//! Entries carry an epoch. A [`ChannelHandle`] can only close the entry it was
//! issued for, so a stale handle never removes a newer session that reuses the id.

use parking_lot::Mutex;
use ssedoc_common::Notification;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Registry channel capacity: one event may wait for a reader
const CHANNEL_CAPACITY: usize = 1;

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A session with this id is still open
    #[error("Session already open: {0}")]
    AlreadyOpen(String),
}

/// Result of one bounded delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the channel with a reader attached
    Delivered,
    /// Session deadline elapsed first
    TimedOut,
    /// Entry closed or reader gone
    Closed,
    /// Filtered out by the relay, never attempted
    Suppressed,
}

struct EntryShared {
    session_id: String,
    epoch: u64,
    tx: mpsc::Sender<Notification>,
    rx: Mutex<Option<mpsc::Receiver<Notification>>>,
    attached: watch::Sender<bool>,
    closed: CancellationToken,
}

#[derive(Default)]
struct RegistryInner {
    entries: Mutex<HashMap<String, Arc<EntryShared>>>,
    next_epoch: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, session_id: &str, epoch: Option<u64>) -> bool {
        let removed = {
            let mut entries = self.entries.lock();
            match entries.get(session_id) {
                Some(entry) if epoch.map_or(true, |e| e == entry.epoch) => {
                    entries.remove(session_id)
                }
                _ => None,
            }
        };

        match removed {
            Some(entry) => {
                entry.closed.cancel();
                debug!(session_id = %session_id, "Registry entry closed");
                true
            }
            None => false,
        }
    }
}

/// Concurrency-safe session registry
///
/// Cheap to clone; all clones share the same map.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry for a new session
    pub fn open(&self, session_id: &str) -> Result<ChannelHandle, RegistryError> {
        let mut entries = self.inner.entries.lock();
        if entries.contains_key(session_id) {
            return Err(RegistryError::AlreadyOpen(session_id.to_string()));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (attached, _) = watch::channel(false);
        let shared = Arc::new(EntryShared {
            session_id: session_id.to_string(),
            epoch: self.inner.next_epoch.fetch_add(1, Ordering::Relaxed),
            tx,
            rx: Mutex::new(Some(rx)),
            attached,
            closed: CancellationToken::new(),
        });
        entries.insert(session_id.to_string(), Arc::clone(&shared));
        debug!(session_id = %session_id, "Registry entry opened");

        Ok(ChannelHandle {
            shared,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// Find the channel of an open session
    pub fn lookup(&self, session_id: &str) -> Option<ChannelHandle> {
        self.inner
            .entries
            .lock()
            .get(session_id)
            .map(|shared| ChannelHandle {
                shared: Arc::clone(shared),
                registry: Arc::downgrade(&self.inner),
            })
    }

    /// Remove a session entry
    ///
    /// Returns `false` when there was nothing to close.
    pub fn close(&self, session_id: &str) -> bool {
        self.inner.remove(session_id, None)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.entries.lock().contains_key(session_id)
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle on one registry entry
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Arc<EntryShared>,
    registry: Weak<RegistryInner>,
}

impl ChannelHandle {
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Take the single consumer slot
    ///
    /// Returns `None` if another reader already holds it.
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Notification>> {
        let rx = self.shared.rx.lock().take();
        if rx.is_some() {
            self.shared.attached.send_replace(true);
        }
        rx
    }

    pub fn is_attached(&self) -> bool {
        *self.shared.attached.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.is_cancelled()
    }

    /// Resolves once the entry has been closed
    pub async fn closed(&self) {
        self.shared.closed.cancelled().await
    }

    /// Deliver one event, waiting for a reader, bounded by `deadline`
    ///
    /// Aborts as soon as the entry is closed; never sends into a removed entry.
    pub async fn send_until(&self, event: Notification, deadline: Instant) -> DeliveryOutcome {
        if self.is_closed() {
            return DeliveryOutcome::Closed;
        }

        let shared = &self.shared;
        let mut attached = shared.attached.subscribe();
        let delivery = async move {
            if attached.wait_for(|a| *a).await.is_err() {
                return false;
            }
            shared.tx.send(event).await.is_ok()
        };

        tokio::select! {
            biased;
            _ = shared.closed.cancelled() => DeliveryOutcome::Closed,
            _ = tokio::time::sleep_until(deadline) => DeliveryOutcome::TimedOut,
            sent = delivery => {
                if sent {
                    DeliveryOutcome::Delivered
                } else {
                    DeliveryOutcome::Closed
                }
            }
        }
    }

    /// Close the entry this handle was issued for
    ///
    /// Returns `false` if it was already closed or replaced.
    pub fn close(&self) -> bool {
        match self.registry.upgrade() {
            Some(inner) => inner.remove(&self.shared.session_id, Some(self.shared.epoch)),
            None => {
                self.shared.closed.cancel();
                false
            }
        }
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("session_id", &self.shared.session_id)
            .field("epoch", &self.shared.epoch)
            .field("closed", &self.is_closed())
            .finish()
    }
}
