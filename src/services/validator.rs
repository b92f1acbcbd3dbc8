//! Scan payload validation
//!
//! The scanner hands over a JSON document wrapped in one extra layer of
//! string escaping, e.g. `"{\"location_id\":\"A\",...}"`. `sanitize` peels
//! that layer off, `parse_record` decodes the location and `validate` ties
//! both together without ever returning an error.

use crate::domain::error::SessionError;
use crate::domain::types::LocationRecord;
use tracing::debug;

/// Validate a raw scan payload.
///
/// Returns `(true, Some(record))` only for a complete record. A payload that
/// decodes but misses a field returns `(false, Some(partial))`; anything that
/// does not decode returns `(false, None)`.
pub fn validate(raw: Option<&str>) -> (bool, Option<LocationRecord>) {
    let raw = match raw {
        Some(raw) if !raw.is_empty() => raw,
        _ => return (false, None),
    };

    let record = match sanitize(raw).and_then(|json| parse_record(&json)) {
        Ok(record) => record,
        Err(e) => {
            debug!(error = %e, raw_len = %raw.len(), "scan_rejected");
            return (false, None);
        }
    };

    if record.is_complete() {
        (true, Some(record))
    } else {
        debug!(record = ?record, "scan_incomplete");
        (false, Some(record))
    }
}

/// Strip the scanner's extra escaping layer.
///
/// Removes every backslash, drops the first character, then one leading and
/// one trailing double quote if present. Fails when fewer than two characters
/// remain after removing backslashes.
pub fn sanitize(raw: &str) -> Result<String, SessionError> {
    let unescaped: String = raw.chars().filter(|&c| c != '\\').collect();
    if unescaped.chars().count() < 2 {
        return Err(SessionError::ValidationFailure(format!(
            "scan payload too short: {} chars",
            unescaped.chars().count()
        )));
    }

    let mut rest = unescaped.chars();
    rest.next();
    let mut data = rest.as_str();
    data = data.strip_prefix('"').unwrap_or(data);
    data = data.strip_suffix('"').unwrap_or(data);
    Ok(data.to_string())
}

/// Decode a bare JSON object into a location. Missing fields become `None`.
pub fn parse_record(json: &str) -> Result<LocationRecord, SessionError> {
    Ok(serde_json::from_str(json)?)
}

/// Encode a location into the scanner wire format
pub fn encode_scan_payload(record: &LocationRecord) -> Result<String, SessionError> {
    let json = serde_json::to_string(record)?;
    Ok(serde_json::to_string(&json)?)
}
