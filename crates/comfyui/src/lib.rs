//! ComfyUI WebSocket and REST client library.
//!
//! Provides typed message parsing, binary payload decoding, WebSocket
//! connection management, HTTP API wrappers and reconnection logic,
//! plus the job tracker that correlates ComfyUI events with submitted
//! jobs.

pub mod api;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod frames;
pub mod manager;
pub mod messages;
pub mod processor;
pub mod reconnect;
pub mod supervisor;
pub mod tracker;
