//! Check-in gateway - session timer and billing host
//!
//! Runs the session coordinator and timer process behind a line-oriented
//! console. Scanner payloads and user actions arrive on stdin; one-shot
//! events and state changes are printed to stdout. Logs go to stderr.
//!
//! Module structure:
//! - `domain/` - Core types (LocationRecord, SessionSummary, errors)
//! - `io/` - External interfaces (key/value store, HTTP submission, MQTT, status)
//! - `services/` - Business logic (Validator, SessionStore, TimerProcess, Coordinator)
//! - `infra/` - Infrastructure (Config, Metrics, Clock)

use anyhow::Context;
use checkin_gateway::domain::types::LocationRecord;
use checkin_gateway::domain::SubmissionStatus;
use checkin_gateway::infra::{Config, Metrics, SystemClock};
use checkin_gateway::io::{create_tick_channel, FileKvStore, SubmissionClient, TickPublisher};
use checkin_gateway::services::validator::encode_scan_payload;
use checkin_gateway::services::{
    CoordinatorDeps, CoordinatorInput, CoordinatorState, SessionCoordinator, SessionStore,
    TimerHost, TimerOptions, TimerProcess, UiEvent,
};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Check-in gateway - scan to start, scan again to end and bill
#[derive(Parser, Debug)]
#[command(name = "checkin-gateway", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

/// One console line
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Scan(Option<String>),
    Cancel,
    Start,
    End,
    Ok,
    Exit,
    Attach,
    Detach,
    Status,
    Encode(LocationRecord),
    Help,
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word {
        "scan" if rest.is_empty() => Command::Scan(None),
        "scan" => Command::Scan(Some(rest.to_string())),
        "cancel" => Command::Cancel,
        "start" => Command::Start,
        "end" => Command::End,
        "ok" => Command::Ok,
        "exit" => Command::Exit,
        "attach" => Command::Attach,
        "detach" => Command::Detach,
        "status" => Command::Status,
        "encode" => {
            // encode <id> <price> <address...>
            let mut parts = rest.splitn(3, char::is_whitespace);
            match (parts.next(), parts.next().map(str::parse::<f64>), parts.next()) {
                (Some(id), Some(Ok(price)), Some(address)) => {
                    Command::Encode(LocationRecord::new(address.trim(), id, price))
                }
                _ => Command::Unknown(line.to_string()),
            }
        }
        "help" | "?" => Command::Help,
        "quit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

fn print_help() {
    println!("commands:");
    println!("  scan <payload>              deliver a scanned code");
    println!("  cancel                      cancel the scanner");
    println!("  start                       confirm the offered session");
    println!("  end                         end the session (opens the scanner)");
    println!("  ok                          acknowledge the summary and clear the session");
    println!("  exit                        leave the session view (timer keeps running)");
    println!("  attach | detach             bind or unbind the timer observer");
    println!("  status                      print the current state");
    println!("  encode <id> <price> <addr>  print a scan payload for a location");
    println!("  quit                        stop the gateway");
}

fn print_state(state: &CoordinatorState) {
    match state.current_location {
        Some(ref location) => println!("{}", location),
        None => println!("no active session"),
    }
    if !state.elapsed_display.is_empty() {
        println!("Elapsed - {}", state.elapsed_display);
    }
    println!(
        "Submission - {} | timer bound - {}",
        state.submission_status.as_str(),
        state.process_bound
    );
}

fn print_event(event: &UiEvent, pending_offer: &mut Option<LocationRecord>) {
    match event {
        UiEvent::Warning(message) => println!("! {}", message),
        UiEvent::OfferSession(record) => {
            println!("{}", record);
            println!("start a session here? type `start`");
            *pending_offer = Some(record.clone());
        }
        UiEvent::LaunchMainView => println!("session started"),
        UiEvent::SessionEnded(summary) => {
            println!("session ended");
            println!("Location - {}", summary.location_id);
            println!("Ended at - {}", summary.ended_at_rfc3339());
            println!("Minutes - {}", summary.elapsed_minutes);
            println!("Total - {:.2}", summary.total_price);
        }
        UiEvent::ScanRequested => println!("scan the code at your location: scan <payload>"),
        UiEvent::ExitConfirmed => println!("left the session view; the timer keeps running"),
        UiEvent::SessionCleared => println!("session cleared"),
        UiEvent::StartTimer | UiEvent::StopTimer => {}
    }
}

fn print_submission(status: SubmissionStatus) {
    match status {
        SubmissionStatus::Idle => {}
        SubmissionStatus::Loading => println!("submitting session..."),
        SubmissionStatus::Succeeded { accepted: true } => println!("session submitted"),
        SubmissionStatus::Succeeded { accepted: false } => {
            println!("session submitted but not accepted by the server")
        }
        SubmissionStatus::Failed { code } => println!("session submission failed ({})", code),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for tick-level detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "checkin-gateway starting");

    let args = Args::parse();
    let config = Config::load_from_path(&Config::resolve_config_path(args.config.as_deref()));

    info!(
        config_file = %config.config_file(),
        store = %config.store_path().display(),
        submit_url = %config.submit_url(),
        encoding = ?config.submit_encoding(),
        tick_interval_ms = %config.tick_interval_ms(),
        broadcast = %config.broadcast_enabled(),
        http_port = %config.http_port(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());

    let kv = FileKvStore::open(config.store_path()).context("failed to open session store")?;
    let submitter = SubmissionClient::new(&config).context("failed to build submission client")?;

    // Cross-process time signal (if enabled)
    let mut timer_options = TimerOptions::from_config(&config);
    if config.broadcast_enabled() {
        let (tick_sender, tick_rx) = create_tick_channel(64);
        let publisher = TickPublisher::new(&config, tick_rx);
        let publisher_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(publisher_shutdown).await;
        });
        timer_options = timer_options.with_broadcast(tick_sender.with_metrics(metrics.clone()));
    }
    let timer = TimerProcess::new(timer_options, metrics.clone());

    // Coordinator input channel (bounded; ticks are the only high-rate input)
    let (input_tx, input_rx) = mpsc::channel(256);
    let deps = CoordinatorDeps {
        store: SessionStore::new(Arc::new(kv)),
        submitter: Arc::new(submitter),
        probe: Arc::new(timer.clone()),
        clock: Arc::new(SystemClock),
        metrics: metrics.clone(),
    };
    let (coordinator, mut events_rx) = SessionCoordinator::new(deps, &input_tx);
    let mut state_rx = coordinator.subscribe();

    // Start status HTTP server (if port > 0)
    let http_port = config.http_port();
    if http_port > 0 {
        let http_metrics = metrics.clone();
        let http_state = coordinator.subscribe();
        let http_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = checkin_gateway::io::http_status::start_status_server(
                http_port,
                http_metrics,
                http_state,
                http_shutdown,
            )
            .await
            {
                error!(error = %e, "status_server_error");
            }
        });
    }

    // Start metrics reporter
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs().max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let coordinator_task = tokio::spawn(coordinator.run(input_rx));
    let mut host = TimerHost::new(timer.clone(), input_tx.clone());

    // Resume a session persisted by a previous run
    input_tx.send(CoordinatorInput::Initialise).await.ok();

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_offer: Option<LocationRecord> = None;
    let mut shown = CoordinatorState::default();
    let mut shutdown = shutdown_rx.clone();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "stdin_read_failed");
                        break;
                    }
                };

                let input = match parse_command(&line) {
                    Command::Scan(raw) => Some(CoordinatorInput::Scan(raw)),
                    Command::Cancel => Some(CoordinatorInput::ScanCancelled),
                    Command::Start => match pending_offer.take() {
                        Some(record) => Some(CoordinatorInput::StartSession(record)),
                        None => {
                            println!("nothing to start; scan a code first");
                            None
                        }
                    },
                    Command::End => Some(CoordinatorInput::EndSessionRequested),
                    Command::Ok => Some(CoordinatorInput::ClearSession),
                    Command::Exit => Some(CoordinatorInput::ExitConfirmed),
                    Command::Attach => {
                        if !host.attach().await {
                            println!("already attached");
                        }
                        None
                    }
                    Command::Detach => {
                        if !host.detach().await {
                            println!("not attached");
                        }
                        None
                    }
                    Command::Status => {
                        print_state(&state_rx.borrow());
                        None
                    }
                    Command::Encode(record) => {
                        match encode_scan_payload(&record) {
                            Ok(payload) => println!("{}", payload),
                            Err(e) => println!("! {}", e),
                        }
                        None
                    }
                    Command::Help => {
                        print_help();
                        None
                    }
                    Command::Quit => break,
                    Command::Unknown(line) => {
                        if !line.is_empty() {
                            println!("unknown command: {} (try `help`)", line);
                        }
                        None
                    }
                };

                if let Some(input) = input {
                    if input_tx.send(input).await.is_err() {
                        warn!("coordinator_input_closed");
                        break;
                    }
                }
            }
            Some(event) = events_rx.recv() => {
                if let Some(event) = host.handle_event(event).await {
                    if event == UiEvent::ExitConfirmed {
                        host.detach().await;
                    }
                    print_event(&event, &mut pending_offer);
                }
            }
            Ok(()) = state_rx.changed() => {
                let state = state_rx.borrow_and_update().clone();
                if state.elapsed_display != shown.elapsed_display && !state.elapsed_display.is_empty() {
                    println!("[{}]", state.elapsed_display);
                }
                if state.submission_status != shown.submission_status {
                    print_submission(state.submission_status);
                }
                shown = state;
            }
        }
    }

    info!("shutting_down");
    timer.stop().await;
    let _ = shutdown_tx.send(true);

    // Coordinator ends once every input sender is gone, including the forwarder's
    host.detach().await;
    drop(host);
    drop(input_tx);
    if tokio::time::timeout(Duration::from_secs(5), coordinator_task).await.is_err() {
        warn!("coordinator_shutdown_timeout");
    }

    info!("checkin-gateway shutdown complete");
    Ok(())
}
