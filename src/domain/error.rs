//! Error taxonomy for session handling

/// All errors that can occur while validating, persisting, billing or
/// submitting a session.
///
/// None of these cross the coordinator boundary: the coordinator turns them
/// into warning events or a failed submission status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// Malformed or incomplete scan data
    #[error("invalid location data: {0}")]
    ValidationFailure(String),

    /// Start time requested while no session is persisted
    #[error("no active session: start time has not been set")]
    NoActiveSession,

    /// Billing attempted for a location without a price
    #[error("location has no price per minute")]
    MissingPrice,

    /// Network or server failure while submitting a summary
    #[error("session submission failed: {0}")]
    Submission(String),

    /// The key/value store could not be read or written
    #[error("session storage error: {0}")]
    Storage(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::ValidationFailure(err.to_string())
    }
}
