//! # ssedoc Common Library
//!
//! Shared code for the ssedoc service crates:
//! - Progress notification types (Notification, EventState)
//! - SSE record rendering
//! - TOML configuration loading
//! - Identifier helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::{EventState, Notification};
