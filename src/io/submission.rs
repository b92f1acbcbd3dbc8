//! Session submission over HTTP
//!
//! One POST per finished session to `<base_url>/submit-session`, either as
//! form fields or as a JSON body. No retries and no auth headers.

use crate::domain::error::SessionError;
use crate::domain::session::SessionSummary;
use crate::infra::config::{Config, SubmitEncoding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Body of the submit-session request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitRequest {
    pub location_id: String,
    #[serde(rename = "time_spent")]
    pub time_spent_minutes: i64,
    #[serde(rename = "end_time")]
    pub end_epoch_millis: i64,
}

impl From<&SessionSummary> for SubmitRequest {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            location_id: summary.location_id.clone(),
            time_spent_minutes: summary.elapsed_minutes,
            end_epoch_millis: summary.end_epoch_millis,
        }
    }
}

/// Server verdict. `success` is `None` when the server sent no usable body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub success: Option<bool>,
}

/// Sends finished sessions to the remote service
#[async_trait]
pub trait SessionSubmitter: Send + Sync {
    async fn submit(&self, summary: &SessionSummary) -> Result<SubmitResponse, SessionError>;
}

/// reqwest-backed submitter
pub struct SubmissionClient {
    client: reqwest::Client,
    url: String,
    encoding: SubmitEncoding,
}

impl SubmissionClient {
    pub fn new(config: &Config) -> Result<Self, SessionError> {
        // Client is built once and reused (connection pooling)
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs()))
            .read_timeout(Duration::from_secs(config.request_timeout_secs()))
            .build()
            .map_err(|e| SessionError::Submission(format!("http client init: {}", e)))?;

        info!(
            url = %config.submit_url(),
            encoding = ?config.submit_encoding(),
            "submission_client_initialized"
        );

        Ok(Self { client, url: config.submit_url(), encoding: config.submit_encoding() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SessionSubmitter for SubmissionClient {
    async fn submit(&self, summary: &SessionSummary) -> Result<SubmitResponse, SessionError> {
        let start = Instant::now();
        let body = SubmitRequest::from(summary);

        let request = self.client.post(&self.url);
        let request = match self.encoding {
            SubmitEncoding::Form => request.form(&body),
            SubmitEncoding::Json => request.json(&body),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(
                    location_id = %summary.location_id,
                    latency_ms = %start.elapsed().as_millis(),
                    error = %e,
                    "session_submit_error"
                );
                return Err(SessionError::Submission(e.to_string()));
            }
        };

        let status = response.status();
        let latency_ms = start.elapsed().as_millis();

        if !status.is_success() {
            // Treated as a server verdict, not a transport failure
            warn!(
                location_id = %summary.location_id,
                status = %status.as_u16(),
                latency_ms = %latency_ms,
                "session_submit_rejected"
            );
            return Ok(SubmitResponse::default());
        }

        let bytes = response.bytes().await.map_err(|e| {
            error!(error = %e, "session_submit_body_read_failed");
            SessionError::Submission(e.to_string())
        })?;

        let parsed: SubmitResponse = serde_json::from_slice(&bytes).map_err(|e| {
            error!(error = %e, body_len = %bytes.len(), "session_submit_body_invalid");
            SessionError::Submission(format!("invalid response body: {}", e))
        })?;

        info!(
            location_id = %summary.location_id,
            minutes = %summary.elapsed_minutes,
            status = %status.as_u16(),
            success = ?parsed.success,
            latency_ms = %latency_ms,
            "session_submitted"
        );
        debug!(body = %String::from_utf8_lossy(&bytes), "session_submit_response");

        Ok(parsed)
    }
}
