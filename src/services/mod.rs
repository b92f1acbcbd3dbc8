//! Services - business logic and state management
//!
//! This module contains the core business logic services:
//! - `validator` - Scan payload sanitizing and parsing
//! - `session_store` - Single-slot persistence of the active session
//! - `timer` - Background ticking process with attachable observers
//! - `coordinator` - Session lifecycle state machine
//! - `host` - Bridge executing coordinator timer intents

pub mod coordinator;
pub mod host;
pub mod session_store;
pub mod timer;
pub mod validator;

// Re-export commonly used types
pub use coordinator::{
    ConnectionState, CoordinatorDeps, CoordinatorInput, CoordinatorState, SessionCoordinator,
    SubmissionUpdate, UiEvent,
};
pub use host::TimerHost;
pub use session_store::SessionStore;
pub use timer::{ProcessProbe, TimerOptions, TimerProcess};
