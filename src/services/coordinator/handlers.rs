//! Input handlers for the SessionCoordinator
//!
//! Handlers never return errors. Failures end up in `submission_status`, in
//! a `Warning` event, or in the log.

use super::{ConnectionState, SessionCoordinator, SubmissionUpdate, UiEvent};
use crate::domain::error::SessionError;
use crate::domain::session::SessionSummary;
use crate::domain::types::{LocationRecord, SubmissionStatus};
use crate::services::validator;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const INVALID_SCAN_AT: &str = "Invalid QR Code scanned, Please Scan the one at";
const INVALID_SCAN_UNKNOWN: &str =
    "Invalid QR Code has been scanned, Please check with librarian for further assistance";

impl SessionCoordinator {
    /// Bring in-memory state in line with the store and the timer process
    pub(crate) fn initialise(&mut self) {
        if self.state_tx.borrow().current_location.is_none() {
            let location = self.store.current_location();
            debug!(found = %location.is_some(), "session_loaded_from_store");
            self.update(|s| s.current_location = location);
        }

        let (has_location, ended) = {
            let state = self.state_tx.borrow();
            (state.current_location.is_some(), state.session_ended)
        };
        if has_location && !ended {
            self.update(|s| s.submission_status = SubmissionStatus::Idle);
            self.emit(UiEvent::StartTimer);
        }

        let bound = self.probe.is_running();
        self.update(|s| s.process_bound = bound);
        info!(has_location = %has_location, ended = %ended, process_bound = %bound, "coordinator_initialised");
    }

    pub(crate) fn on_scan(&mut self, raw: Option<&str>) {
        let (valid, record) = validator::validate(raw);
        self.metrics.record_scan(valid);

        let record = match (valid, record) {
            (true, Some(record)) => record,
            _ => {
                debug!(present = %raw.is_some(), "scan_invalid");
                self.warn_invalid_scan();
                return;
            }
        };

        if !self.store.is_active() {
            info!(location_id = %record.id_or_empty(), "session_offered");
            self.emit(UiEvent::OfferSession(record));
            return;
        }

        if self.matches_active_session(&record) {
            self.end_session(record);
        } else {
            info!(location_id = %record.id_or_empty(), "scan_not_matching_session");
            self.warn_invalid_scan();
        }
    }

    /// True if `record` is the location of a session that has not ended yet
    fn matches_active_session(&self, record: &LocationRecord) -> bool {
        let state = self.state_tx.borrow();
        if state.session_ended {
            return false;
        }
        match state.current_location {
            Some(ref current) => current == record,
            None => self.store.current_location().as_ref() == Some(record),
        }
    }

    fn warn_invalid_scan(&self) {
        let message = match self.state_tx.borrow().current_location {
            Some(ref location) => format!("{} {}", INVALID_SCAN_AT, location.id_or_empty()),
            None => INVALID_SCAN_UNKNOWN.to_string(),
        };
        self.emit(UiEvent::Warning(message));
    }

    pub(crate) fn start_session(&mut self, record: LocationRecord) {
        let now = self.clock.now_ms();
        let persisted = self.store.save(&record).and_then(|_| self.store.set_start_time(now));
        if let Err(e) = persisted {
            error!(location_id = %record.id_or_empty(), error = %e, "session_start_failed");
            self.emit(UiEvent::Warning(format!("Could not start session: {}", e)));
            return;
        }

        self.metrics.record_session_started();
        info!(location_id = %record.id_or_empty(), start_epoch_millis = %now, "session_started");

        self.current_attempt = None;
        self.update(|s| {
            s.current_location = Some(record);
            s.elapsed_display.clear();
            s.submission_status = SubmissionStatus::Idle;
            s.last_summary = None;
            s.session_ended = false;
        });
        self.emit(UiEvent::LaunchMainView);
    }

    /// Ticks only count while a session is running; late ticks drained
    /// after `StopTimer` must not overwrite the final display.
    pub(crate) fn on_tick(&mut self, formatted: String) {
        let running = {
            let state = self.state_tx.borrow();
            state.current_location.is_some() && !state.session_ended
        };
        if !running {
            debug!(tick = %formatted, "tick_ignored");
            return;
        }
        self.update(|s| s.elapsed_display = formatted);
    }

    /// Bill the session, stop the timer and hand the summary to the submitter
    pub(crate) fn end_session(&mut self, record: LocationRecord) {
        let end = self.clock.now_ms();
        let summary = match self
            .store
            .start_time()
            .and_then(|start| SessionSummary::compute(&record, start, end))
        {
            Ok(summary) => summary,
            Err(e) => {
                match e {
                    SessionError::MissingPrice => {
                        error!(location_id = %record.id_or_empty(), "session_end_missing_price")
                    }
                    _ => warn!(location_id = %record.id_or_empty(), error = %e, "session_end_failed"),
                }
                self.emit(UiEvent::Warning(format!("Could not end session: {}", e)));
                return;
            }
        };

        self.emit(UiEvent::StopTimer);
        self.metrics.record_session_ended();
        info!(
            location_id = %summary.location_id,
            minutes = %summary.elapsed_minutes,
            total_price = %summary.total_price,
            ended_at = %summary.ended_at_rfc3339(),
            "session_ended"
        );

        let ended = summary.clone();
        self.update(|s| {
            s.last_summary = Some(ended);
            s.session_ended = true;
        });
        self.emit(UiEvent::SessionEnded(summary.clone()));
        self.dispatch_submission(summary);
    }

    /// Mark the attempt Loading and submit on a separate task
    fn dispatch_submission(&mut self, summary: SessionSummary) {
        let attempt = Uuid::now_v7();
        self.current_attempt = Some(attempt);
        self.on_submission(attempt, SubmissionUpdate::Subscribed);

        let Some(tx) = self.self_tx.upgrade() else {
            warn!(attempt = %attempt, "submission_not_dispatched_no_input_channel");
            self.on_submission(attempt, SubmissionUpdate::Failed("coordinator closed".to_string()));
            return;
        };

        let submitter = self.submitter.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let update = match submitter.submit(&summary).await {
                Ok(response) => SubmissionUpdate::Succeeded(response.success),
                Err(e) => SubmissionUpdate::Failed(e.to_string()),
            };
            let succeeded = matches!(update, SubmissionUpdate::Succeeded(_));
            metrics.record_submission(succeeded, start.elapsed().as_millis() as u64);

            let input = super::CoordinatorInput::Submission { attempt, update };
            if tx.send(input).await.is_err() {
                debug!(attempt = %attempt, "submission_result_dropped_coordinator_gone");
            }
        });
    }

    pub(crate) fn on_submission(&mut self, attempt: Uuid, update: SubmissionUpdate) {
        if self.current_attempt != Some(attempt) {
            debug!(attempt = %attempt, "stale_submission_update");
            return;
        }

        let status = match update {
            SubmissionUpdate::Subscribed => SubmissionStatus::Loading,
            SubmissionUpdate::Succeeded(success) => {
                SubmissionStatus::Succeeded { accepted: success.unwrap_or(false) }
            }
            SubmissionUpdate::Failed(reason) => {
                warn!(attempt = %attempt, reason = %reason, "session_submission_failed");
                SubmissionStatus::Failed { code: SubmissionStatus::FAILURE_CODE }
            }
        };

        // Exactly one terminal result per attempt
        if status.is_terminal() {
            self.current_attempt = None;
        }
        debug!(attempt = %attempt, status = %status.as_str(), "submission_status_changed");
        self.update(|s| s.submission_status = status);
    }

    pub(crate) fn on_process_connection(&mut self, state: ConnectionState) {
        let bound = match state {
            ConnectionState::Connected => true,
            ConnectionState::Disconnected => false,
            ConnectionState::Unknown => self.probe.is_running(),
        };
        debug!(connection = ?state, bound = %bound, "process_connection_changed");
        self.update(|s| s.process_bound = bound);
    }

    /// Forget the finished session
    pub(crate) fn clear_session(&mut self) {
        let status = self.state_tx.borrow().submission_status;
        if status == SubmissionStatus::Loading {
            warn!("session_cleared_while_submitting");
        }

        if let Err(e) = self.store.clear() {
            error!(error = %e, "session_clear_failed");
            self.emit(UiEvent::Warning(format!("Could not clear session: {}", e)));
            return;
        }

        // A session cleared before it ended still owns the timer
        let (held, ended) = {
            let state = self.state_tx.borrow();
            (state.current_location.is_some(), state.session_ended)
        };
        if !ended && (held || self.probe.is_running()) {
            info!("session_cleared_while_running");
            self.emit(UiEvent::StopTimer);
        }

        self.current_attempt = None;
        self.update(|s| {
            s.current_location = None;
            s.last_summary = None;
            s.elapsed_display.clear();
            s.session_ended = false;
            s.submission_status = SubmissionStatus::Idle;
        });
        self.emit(UiEvent::SessionCleared);
    }
}
