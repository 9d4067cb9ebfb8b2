//! Delivery sink
//!
//! The single reader of a session's registry channel. A sink may show up before the
//! upload request has opened the session, so attaching polls the registry for a
//! short grace period. Dropping the sink closes its registry entry.

use super::registry::{ChannelHandle, SessionRegistry};
use ssedoc_common::Notification;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Registry poll interval while waiting for a session to appear
pub const ATTACH_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("empty guid param")]
    MissingSessionId,

    #[error("empty stream")]
    UnknownSession(String),

    #[error("stream {0} already has a reader")]
    AlreadyAttached(String),
}

pub struct DeliverySink {
    handle: ChannelHandle,
    rx: mpsc::Receiver<Notification>,
    finished: bool,
}

impl DeliverySink {
    /// Attach to an open session, waiting up to `grace` for it to exist
    pub async fn attach(
        registry: &SessionRegistry,
        session_id: &str,
        grace: Duration,
    ) -> Result<Self, SinkError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(SinkError::MissingSessionId);
        }

        let give_up = Instant::now() + grace;
        loop {
            if let Some(handle) = registry.lookup(session_id) {
                let rx = handle
                    .take_receiver()
                    .ok_or_else(|| SinkError::AlreadyAttached(session_id.to_string()))?;
                debug!(session_id = %session_id, "Delivery sink attached");
                return Ok(Self {
                    handle,
                    rx,
                    finished: false,
                });
            }

            if Instant::now() >= give_up {
                return Err(SinkError::UnknownSession(session_id.to_string()));
            }
            tokio::time::sleep(ATTACH_POLL_INTERVAL).await;
        }
    }

    pub fn session_id(&self) -> &str {
        self.handle.session_id()
    }

    /// Next event, or `None` once the stream is over
    ///
    /// The stream ends after the session COMPLETED event, when the entry closes,
    /// or at `deadline`.
    pub async fn recv_until(&mut self, deadline: Instant) -> Option<Notification> {
        if self.finished {
            return None;
        }

        let next = tokio::select! {
            biased;
            event = self.rx.recv() => event,
            _ = self.handle.closed() => self.rx.try_recv().ok(),
            _ = tokio::time::sleep_until(deadline) => {
                debug!(session_id = %self.handle.session_id(), "Delivery sink deadline reached");
                None
            }
        };

        match &next {
            Some(event) if event.event.is_terminal() => self.finished = true,
            None => self.finished = true,
            Some(_) => {}
        }
        next
    }
}

impl Drop for DeliverySink {
    fn drop(&mut self) {
        if self.handle.close() {
            debug!(session_id = %self.handle.session_id(), "Delivery sink closed session entry");
        }
    }
}
