//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `kv_store` - Key/value persistence for the active session
//! - `submission` - HTTP client for the submit-session endpoint
//! - `status_surface` - Persistent status entry for a running timer
//! - `tick_channel` - Typed channel for the cross-process time signal
//! - `tick_publisher` - MQTT publisher for the time signal
//! - `http_status` - Metrics, health and session snapshot over HTTP

pub mod http_status;
pub mod kv_store;
pub mod status_surface;
pub mod submission;
pub mod tick_channel;
pub mod tick_publisher;

// Re-export commonly used types
pub use kv_store::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use status_surface::{FileStatusSurface, StatusSurface};
pub use submission::{SessionSubmitter, SubmissionClient, SubmitResponse};
pub use tick_channel::{create_tick_channel, BroadcastMessage, TickSender};
pub use tick_publisher::TickPublisher;
