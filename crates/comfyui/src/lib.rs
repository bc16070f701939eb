//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed event parsing, WebSocket connection management,
//! HTTP API wrappers, execution monitoring, and liveness-gated
//! reconnection for driving a single generation job against a
//! ComfyUI image/video-generation server.

pub mod api;
pub mod client;
pub mod messages;
pub mod monitor;
pub mod reconnect;
