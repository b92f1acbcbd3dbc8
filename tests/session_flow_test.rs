//! End-to-end session flows against an in-process HTTP server

mod common;

use checkin_gateway::domain::{SessionSummary, SubmissionStatus};
use checkin_gateway::infra::{Config, SubmitEncoding};
use checkin_gateway::services::{CoordinatorInput, UiEvent};
use common::{
    library_a, library_b, scan_input, start_mock_server, unreachable_url, App, T0,
};

fn expected_summary() -> SessionSummary {
    SessionSummary {
        location_id: "ButterKnifeLib-1234".to_string(),
        end_epoch_millis: T0 + 125_000,
        elapsed_minutes: 2,
        total_price: 11.0,
    }
}

/// Advance 125s and re-scan A; returns the summary event after the timer stopped
async fn end_with_rescan(app: &mut App) -> SessionSummary {
    app.clock.advance(125_000);
    app.send(scan_input(&library_a())).await;
    match app.next_event().await {
        UiEvent::SessionEnded(summary) => summary,
        other => panic!("expected SessionEnded, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_session_success() {
    let server = start_mock_server(200, r#"{"success":true}"#).await;
    let config = Config::default().with_submit_base_url(&server.url);
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    assert!(app.timer.is_running());
    assert_eq!(app.store.current_location(), Some(library_a()));
    assert_eq!(app.store.start_time(), Ok(T0));

    // Ticks reach the coordinator while the session runs
    let state = app.wait_state(|s| s.elapsed_display.as_str() >= "00:00:02").await;
    assert!(state.current_location.is_some());

    let summary = end_with_rescan(&mut app).await;
    assert_eq!(summary, expected_summary());
    assert!(!app.timer.is_running(), "timer stopped before the summary is shown");

    let state =
        app.wait_state(|s| s.submission_status.is_terminal() && !s.process_bound).await;
    assert_eq!(state.submission_status, SubmissionStatus::Succeeded { accepted: true });
    assert_eq!(state.last_summary, Some(expected_summary()));
    assert!(state.session_ended);

    let requests = server.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/submit-session");
    assert_eq!(requests[0].content_type, "application/x-www-form-urlencoded");
    let body = &requests[0].body;
    assert!(body.contains("location_id=ButterKnifeLib-1234"), "body: {}", body);
    assert!(body.contains("time_spent=2"), "body: {}", body);
    assert!(body.contains(&format!("end_time={}", T0 + 125_000)), "body: {}", body);

    app.send(CoordinatorInput::ClearSession).await;
    assert_eq!(app.next_event().await, UiEvent::SessionCleared);
    assert!(!app.store.is_active());
    let state = app.wait_state(|s| s.current_location.is_none()).await;
    assert_eq!(state.last_summary, None);
}

#[tokio::test]
async fn test_network_error_fails_but_keeps_summary() {
    let config = Config::default().with_submit_base_url(&unreachable_url());
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    let summary = end_with_rescan(&mut app).await;
    assert_eq!(summary, expected_summary());

    let state = app.wait_state(|s| s.submission_status.is_terminal()).await;
    assert_eq!(state.submission_status, SubmissionStatus::Failed { code: -1 });
    assert_eq!(state.last_summary, Some(expected_summary()));
    assert_eq!(app.metrics.report().submissions_failed, 1);
}

#[tokio::test]
async fn test_json_encoding_posts_body() {
    let server = start_mock_server(200, r#"{"success":false}"#).await;
    let config = Config::default()
        .with_submit_base_url(&server.url)
        .with_submit_encoding(SubmitEncoding::Json);
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    end_with_rescan(&mut app).await;

    let state = app.wait_state(|s| s.submission_status.is_terminal()).await;
    assert_eq!(state.submission_status, SubmissionStatus::Succeeded { accepted: false });

    let requests = server.requests.lock().clone();
    assert_eq!(requests[0].content_type, "application/json");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["location_id"], "ButterKnifeLib-1234");
    assert_eq!(body["time_spent"], 2);
    assert_eq!(body["end_time"], T0 + 125_000);
}

#[tokio::test]
async fn test_server_error_is_not_accepted() {
    let server = start_mock_server(500, "oops").await;
    let config = Config::default().with_submit_base_url(&server.url);
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    end_with_rescan(&mut app).await;

    let state = app.wait_state(|s| s.submission_status.is_terminal()).await;
    assert_eq!(state.submission_status, SubmissionStatus::Succeeded { accepted: false });
}

#[tokio::test]
async fn test_undecodable_body_fails() {
    let server = start_mock_server(200, "<html>ok</html>").await;
    let config = Config::default().with_submit_base_url(&server.url);
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    end_with_rescan(&mut app).await;

    let state = app.wait_state(|s| s.submission_status.is_terminal()).await;
    assert_eq!(state.submission_status, SubmissionStatus::Failed { code: -1 });
}

#[tokio::test]
async fn test_non_matching_rescan_keeps_session() {
    let server = start_mock_server(200, r#"{"success":true}"#).await;
    let config = Config::default().with_submit_base_url(&server.url);
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    app.send(scan_input(&library_b())).await;

    assert_eq!(
        app.next_event().await,
        UiEvent::Warning(
            "Invalid QR Code scanned, Please Scan the one at ButterKnifeLib-1234".to_string()
        )
    );

    // Same path as a garbage scan
    app.send(CoordinatorInput::Scan(Some("not a code".to_string()))).await;
    assert_eq!(
        app.next_event().await,
        UiEvent::Warning(
            "Invalid QR Code scanned, Please Scan the one at ButterKnifeLib-1234".to_string()
        )
    );

    assert!(app.timer.is_running());
    let state = app.wait_state(|s| !s.elapsed_display.is_empty()).await;
    assert!(!state.session_ended);
    assert_eq!(state.submission_status, SubmissionStatus::Idle);
    assert!(app.store.is_active());
    assert!(server.requests.lock().is_empty());
    app.timer.stop().await;
}

#[tokio::test]
async fn test_detach_keeps_timer_and_reattach_resumes_ticks() {
    let config = Config::default().with_submit_base_url(&unreachable_url());
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    app.wait_state(|s| !s.elapsed_display.is_empty()).await;

    assert!(app.host.detach().await);
    app.wait_state(|s| !s.process_bound).await;
    assert!(app.timer.is_running());
    let frozen = app.state_rx.borrow().elapsed_display.clone();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(app.state_rx.borrow().elapsed_display, frozen, "no ticks while detached");

    assert!(app.host.attach().await);
    let state = app.wait_state(|s| s.process_bound && s.elapsed_display > frozen).await;
    assert!(state.elapsed_display > frozen);
    app.timer.stop().await;
}

#[tokio::test]
async fn test_clear_while_running_restarts_timer_for_next_session() {
    let config = Config::default().with_submit_base_url(&unreachable_url());
    let mut app = App::new(&config);

    app.start_session(&library_a()).await;
    app.wait_state(|s| s.elapsed_display.as_str() >= "00:00:05").await;

    app.send(CoordinatorInput::ClearSession).await;
    assert_eq!(app.next_event().await, UiEvent::SessionCleared);
    assert!(!app.store.is_active());
    assert!(!app.timer.is_running(), "cleared session stops its timer");

    app.start_session(&library_b()).await;
    assert!(app.timer.elapsed_seconds() < 5, "new session starts from zero");
    let state = app.wait_state(|s| !s.elapsed_display.is_empty()).await;
    assert!(state.elapsed_display.as_str() < "00:00:05", "display: {}", state.elapsed_display);
    assert_eq!(state.current_location, Some(library_b()));
    app.timer.stop().await;
}
