//! HTTP API handlers for ssedoc-core
//!
//! - `POST /upload` accepts a multipart batch and streams its session events back
//! - `GET /sse?guid=` is the delivery sink for an upload session
//! - `GET /health` reports liveness

pub mod health;
pub mod sse;
pub mod upload;

pub use health::health_routes;
pub use sse::sse_routes;
pub use upload::upload_routes;
