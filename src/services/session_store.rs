//! Single-slot store for the active session
//!
//! Owns the two persisted keys and is the only writer to them. The location
//! payload and the start time live under separate keys so that saving a
//! location never touches the start time.

use crate::domain::error::SessionError;
use crate::domain::types::{LocationRecord, SessionState};
use crate::io::kv_store::KeyValueStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const LOCATION_KEY: &str = "session-location-json";
pub const START_TIME_KEY: &str = "session-start-epoch-millis";

pub struct SessionStore {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// True iff a non-empty location payload is persisted
    pub fn is_active(&self) -> bool {
        self.current().is_some()
    }

    /// Persist `location` as the active session. The start time is left as is.
    pub fn save(&self, location: &LocationRecord) -> Result<(), SessionError> {
        let json = serde_json::to_string(location)
            .map_err(|e| SessionError::Storage(format!("encode location: {}", e)))?;
        self.kv.put_string(LOCATION_KEY, &json)?;
        info!(location_id = %location.id_or_empty(), "session_saved");
        Ok(())
    }

    /// Serialized location of the active session, `None` when there is none
    pub fn current(&self) -> Option<String> {
        self.kv.get_string(LOCATION_KEY).filter(|json| !json.is_empty())
    }

    /// Decoded location of the active session.
    ///
    /// A payload that no longer decodes is logged and treated as absent.
    pub fn current_location(&self) -> Option<LocationRecord> {
        let json = self.current()?;
        match serde_json::from_str(&json) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!(error = %e, "session_location_undecodable");
                None
            }
        }
    }

    pub fn set_start_time(&self, epoch_millis: i64) -> Result<(), SessionError> {
        self.kv.put_long(START_TIME_KEY, epoch_millis)?;
        debug!(start_epoch_millis = %epoch_millis, "session_start_time_set");
        Ok(())
    }

    /// Start time of the active session; `NoActiveSession` when none is set
    pub fn start_time(&self) -> Result<i64, SessionError> {
        self.kv.get_long(START_TIME_KEY).ok_or(SessionError::NoActiveSession)
    }

    /// Location and start time together
    pub fn session_state(&self) -> Result<SessionState, SessionError> {
        let location = self.current_location().ok_or(SessionError::NoActiveSession)?;
        let start_epoch_millis = self.start_time()?;
        Ok(SessionState { location, start_epoch_millis })
    }

    /// Remove both keys in a single write
    pub fn clear(&self) -> Result<(), SessionError> {
        self.kv.remove_all(&[LOCATION_KEY, START_TIME_KEY])?;
        info!("session_cleared");
        Ok(())
    }
}
