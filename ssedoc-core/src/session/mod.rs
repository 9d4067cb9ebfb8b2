//! Upload session pipeline
//!
//! # Flow
//! 1. [`SessionOrchestrator::open`] validates the batch and opens a registry entry
//! 2. [`PreparedSession::run`] starts the relay and one worker per file
//! 3. Workers emit task events into the relay queue
//! 4. The relay forwards them to the registry channel under the session deadline
//! 5. A [`DeliverySink`] (0 or 1) drains the channel onto the SSE transport
//! 6. The completion barrier unblocks, COMPLETED is forwarded, the relay stops and
//!    the registry entry is closed

pub mod barrier;
pub mod orchestrator;
pub mod registry;
pub mod relay;
pub mod sink;
pub mod spool;
pub mod task;
mod worker;

pub use barrier::{BarrierTicket, BarrierWatch, CompletionBarrier};
pub use orchestrator::{
    PreparedSession, SessionError, SessionOrchestrator, SessionReport, SessionSettings,
};
pub use registry::{ChannelHandle, DeliveryOutcome, RegistryError, SessionRegistry};
pub use relay::{EventQueue, ProgressFilter, RelayStats, StateRelay};
pub use sink::{DeliverySink, SinkError};
pub use spool::SubmittedFile;
pub use task::{FileTask, TaskFailure, TaskOutcome, TaskReport, TaskState, TransitionError};
