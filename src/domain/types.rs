//! Shared types for the check-in gateway

use serde::{Deserialize, Serialize};

/// A check-in location as encoded in the scanned code.
///
/// Every field is optional on the wire; a record is only usable for a
/// session once [`LocationRecord::is_complete`] holds. Equality is structural
/// and is what matches an end-of-session re-scan to the active session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    #[serde(rename = "location_details", default)]
    pub address: Option<String>,
    #[serde(rename = "location_id", default)]
    pub id: Option<String>,
    #[serde(rename = "price_per_min", default)]
    pub price_per_minute: Option<f64>,
}

impl LocationRecord {
    pub fn new(address: &str, id: &str, price_per_minute: f64) -> Self {
        Self {
            address: Some(address.to_string()),
            id: Some(id.to_string()),
            price_per_minute: Some(price_per_minute),
        }
    }

    /// All three fields present and both text fields non-empty
    pub fn is_complete(&self) -> bool {
        let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        non_empty(&self.address) && non_empty(&self.id) && self.price_per_minute.is_some()
    }

    /// Location id for display, empty when absent
    pub fn id_or_empty(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

impl std::fmt::Display for LocationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Location - {}", self.id.as_deref().unwrap_or("-"))?;
        writeln!(f, "Address - {}", self.address.as_deref().unwrap_or("-"))?;
        match self.price_per_minute {
            Some(price) => write!(f, "Price Per Min - {:.2}", price),
            None => write!(f, "Price Per Min - -"),
        }
    }
}

/// The single active session as held by the session store
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub location: LocationRecord,
    pub start_epoch_millis: i64,
}

/// Submission indicator owned by the coordinator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Idle,
    Loading,
    Succeeded {
        accepted: bool,
    },
    Failed {
        code: i32,
    },
}

impl SubmissionStatus {
    /// Error code reported for any failed submission
    pub const FAILURE_CODE: i32 = -1;

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Idle => "idle",
            SubmissionStatus::Loading => "loading",
            SubmissionStatus::Succeeded { .. } => "succeeded",
            SubmissionStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Succeeded { .. } | SubmissionStatus::Failed { .. })
    }
}

/// One elapsed-time notification from the timer process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub elapsed_seconds: u64,
}

impl TimerTick {
    pub fn formatted(&self) -> String {
        crate::domain::session::format_elapsed(self.elapsed_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_complete() {
        let record = LocationRecord::new("80 Feet Rd", "Lib-1234", 5.5);
        assert!(record.is_complete());
    }

    #[test]
    fn test_location_incomplete() {
        let mut record = LocationRecord::new("80 Feet Rd", "Lib-1234", 5.5);
        record.price_per_minute = None;
        assert!(!record.is_complete());

        let record = LocationRecord::new("", "Lib-1234", 5.5);
        assert!(!record.is_complete());

        let record = LocationRecord::new("80 Feet Rd", "", 5.5);
        assert!(!record.is_complete());

        assert!(!LocationRecord::default().is_complete());
    }

    #[test]
    fn test_location_wire_names() {
        let record = LocationRecord::new("80 Feet Rd", "Lib-1234", 5.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["location_details"], "80 Feet Rd");
        assert_eq!(json["location_id"], "Lib-1234");
        assert_eq!(json["price_per_min"], 5.5);
    }

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let record: LocationRecord = serde_json::from_str(r#"{"location_id":"A"}"#).unwrap();
        assert_eq!(record.id.as_deref(), Some("A"));
        assert_eq!(record.address, None);
        assert_eq!(record.price_per_minute, None);
    }

    #[test]
    fn test_submission_status_serialization() {
        let json = serde_json::to_value(SubmissionStatus::Succeeded { accepted: true }).unwrap();
        assert_eq!(json["state"], "succeeded");
        assert_eq!(json["accepted"], true);

        let json = serde_json::to_value(SubmissionStatus::Failed { code: -1 }).unwrap();
        assert_eq!(json["code"], -1);
        assert!(SubmissionStatus::Failed { code: -1 }.is_terminal());
        assert!(!SubmissionStatus::Loading.is_terminal());
    }
}
