//! Domain models - core business types and session billing
//!
//! This module contains the canonical data types used throughout the system:
//! - `LocationRecord` - a scanned check-in location
//! - `SessionState` - the single persisted active session
//! - `SessionSummary` - the immutable billing record of a finished session
//! - `SubmissionStatus` - three-state (plus idle) submission indicator
//! - `SessionError` - typed failure taxonomy

pub mod error;
pub mod session;
pub mod types;

// Re-export commonly used types at module level
pub use error::SessionError;
pub use session::{epoch_ms, format_elapsed, SessionSummary};
pub use types::{LocationRecord, SessionState, SubmissionStatus, TimerTick};
