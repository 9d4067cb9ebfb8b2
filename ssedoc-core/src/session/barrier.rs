//! Completion barrier
//!
//! Counts outstanding file workers. Each worker holds a [`BarrierTicket`]; dropping
//! the ticket is its completion signal, so a panicking worker still counts.
//! [`CompletionBarrier::wait`] consumes the barrier and can therefore unblock once.

use std::sync::Arc;
use tokio::sync::watch;

/// Snapshot of barrier counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierCounts {
    pub outstanding: usize,
    pub completed: usize,
}

#[derive(Debug)]
pub struct CompletionBarrier {
    counts: Arc<watch::Sender<BarrierCounts>>,
}

impl Default for CompletionBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBarrier {
    pub fn new() -> Self {
        let (counts, _) = watch::channel(BarrierCounts::default());
        Self {
            counts: Arc::new(counts),
        }
    }

    /// Register one outstanding unit of work
    pub fn enter(&self) -> BarrierTicket {
        self.counts.send_modify(|c| c.outstanding += 1);
        BarrierTicket {
            counts: Arc::clone(&self.counts),
        }
    }

    /// Read-only view for progress logging
    pub fn watch(&self) -> BarrierWatch {
        BarrierWatch {
            rx: self.counts.subscribe(),
        }
    }

    /// Wait until every ticket has been dropped
    ///
    /// Returns the number of completion signals observed.
    pub async fn wait(self) -> usize {
        let mut rx = self.counts.subscribe();
        // Sender is owned by self, so the channel cannot close here
        let done = rx
            .wait_for(|c| c.outstanding == 0)
            .await
            .map(|c| c.completed)
            .ok();
        done.unwrap_or_else(|| rx.borrow().completed)
    }
}

/// One outstanding worker; drop to signal completion
#[derive(Debug)]
pub struct BarrierTicket {
    counts: Arc<watch::Sender<BarrierCounts>>,
}

impl Drop for BarrierTicket {
    fn drop(&mut self) {
        self.counts.send_modify(|c| {
            c.outstanding = c.outstanding.saturating_sub(1);
            c.completed += 1;
        });
    }
}

#[derive(Debug, Clone)]
pub struct BarrierWatch {
    rx: watch::Receiver<BarrierCounts>,
}

impl BarrierWatch {
    pub fn counts(&self) -> BarrierCounts {
        *self.rx.borrow()
    }

    pub fn outstanding(&self) -> usize {
        self.counts().outstanding
    }

    pub fn completed(&self) -> usize {
        self.counts().completed
    }
}
