//! HTTP API handlers

pub mod health;
pub mod notifications;
pub mod sse;

pub use health::health_routes;
pub use notifications::notification_routes;
pub use sse::bridge_event_stream;
