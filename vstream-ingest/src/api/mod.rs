//! HTTP API handlers for vstream-ingest
//!
//! REST ingest/completion endpoints plus the SSE supervisor stream.

pub mod health;
pub mod ingest;
pub mod sse;

pub use health::health_routes;
pub use ingest::call_routes;
pub use sse::event_stream;
