//! Session billing and elapsed-time formatting

use crate::domain::error::SessionError;
use crate::domain::types::{LocationRecord, SessionState};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Format elapsed seconds as `HH:MM:SS`.
///
/// The hour field is not clamped: 100 hours renders as `100:00:00`.
pub fn format_elapsed(elapsed_seconds: u64) -> String {
    let hours = elapsed_seconds / 3600;
    let minutes = (elapsed_seconds % 3600) / 60;
    let seconds = elapsed_seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Billing record of a finished session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub location_id: String,
    pub end_epoch_millis: i64,
    pub elapsed_minutes: i64,
    pub total_price: f64,
}

impl SessionSummary {
    /// Bill a session ending at `end_epoch_millis`.
    ///
    /// Whole minutes only (floor); a negative span bills as zero.
    pub fn compute(
        location: &LocationRecord,
        start_epoch_millis: i64,
        end_epoch_millis: i64,
    ) -> Result<Self, SessionError> {
        let price = location.price_per_minute.ok_or(SessionError::MissingPrice)?;
        let elapsed_ms = (end_epoch_millis - start_epoch_millis).max(0);
        let elapsed_minutes = elapsed_ms / MILLIS_PER_MINUTE;

        Ok(Self {
            location_id: location.id_or_empty().to_string(),
            end_epoch_millis,
            elapsed_minutes,
            total_price: elapsed_minutes as f64 * price,
        })
    }

    /// Bill the given persisted session
    pub fn for_session(state: &SessionState, end_epoch_millis: i64) -> Result<Self, SessionError> {
        Self::compute(&state.location, state.start_epoch_millis, end_epoch_millis)
    }

    /// End time as RFC 3339 (UTC), for display
    pub fn ended_at_rfc3339(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.end_epoch_millis)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default()
    }
}
