//! Background session timer
//!
//! The TimerProcess ticks on its own tokio task, independent of whoever is
//! watching. Observers attach and detach at will; a detached or slow observer
//! only loses its own ticks. Each tick is:
//! - fanned out to every attached observer with `try_send`
//! - written to the status surface (if any)
//! - offered to the cross-process broadcast channel (if any)
//!
//! Lifecycle is `Idle -> Running -> Idle`. `start` while running and `stop`
//! while idle are both no-ops.

use crate::domain::types::TimerTick;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::status_surface::{FileStatusSurface, StatusSurface};
use crate::io::tick_channel::TickSender;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Answers whether the external timer process is alive
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self) -> bool;
}

/// Identifies one attached observer
pub type ObserverId = u64;

/// Construction options for [`TimerProcess`]
#[derive(Clone)]
pub struct TimerOptions {
    pub tick_interval: Duration,
    /// Ticks buffered per observer before further ticks are dropped for it
    pub observer_buffer: usize,
    pub status_surface: Option<Arc<dyn StatusSurface>>,
    pub broadcast: Option<TickSender>,
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            observer_buffer: 16,
            status_surface: None,
            broadcast: None,
        }
    }
}

impl TimerOptions {
    /// Interval, observer buffer and status file from config; no broadcast
    pub fn from_config(config: &Config) -> Self {
        let status_surface = config
            .status_file()
            .map(|path| Arc::new(FileStatusSurface::new(path)) as Arc<dyn StatusSurface>);
        Self {
            tick_interval: Duration::from_millis(config.tick_interval_ms().max(1)),
            observer_buffer: config.observer_buffer().max(1),
            status_surface,
            broadcast: None,
        }
    }

    pub fn with_broadcast(mut self, sender: TickSender) -> Self {
        self.broadcast = Some(sender);
        self
    }

    pub fn with_status_surface(mut self, surface: Arc<dyn StatusSurface>) -> Self {
        self.status_surface = Some(surface);
        self
    }
}

/// A running tick loop: stop signal plus its task
struct RunHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

struct Inner {
    options: TimerOptions,
    metrics: Arc<Metrics>,
    running: AtomicBool,
    /// Elapsed seconds of the current run (last emitted tick)
    elapsed: AtomicU64,
    next_observer_id: AtomicU64,
    observers: Mutex<FxHashMap<ObserverId, mpsc::Sender<String>>>,
    run: Mutex<Option<RunHandle>>,
}

/// Handle to the timer process. Cheap to clone; all clones share one timer.
#[derive(Clone)]
pub struct TimerProcess {
    inner: Arc<Inner>,
}

impl TimerProcess {
    pub fn new(options: TimerOptions, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Arc::new(Inner {
                options,
                metrics,
                running: AtomicBool::new(false),
                elapsed: AtomicU64::new(0),
                next_observer_id: AtomicU64::new(1),
                observers: Mutex::new(FxHashMap::default()),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start ticking from zero. Returns false (and changes nothing) if
    /// the timer is already running.
    pub fn start(&self) -> bool {
        let mut run = self.inner.run.lock();
        if run.is_some() {
            info!(elapsed_seconds = %self.elapsed_seconds(), "timer_already_running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        self.inner.elapsed.store(0, Ordering::Relaxed);
        self.inner.running.store(true, Ordering::Release);
        let task = tokio::spawn(tick_loop(self.inner.clone(), stop_rx));
        *run = Some(RunHandle { stop_tx, task });

        info!(
            interval_ms = %self.inner.options.tick_interval.as_millis(),
            observers = %self.observer_count(),
            "timer_started"
        );
        true
    }

    /// Stop ticking and wait for the loop to exit. Returns false if the timer
    /// was not running.
    pub async fn stop(&self) -> bool {
        // Take the handle out before awaiting so the lock is not held
        let handle = self.inner.run.lock().take();
        let Some(RunHandle { stop_tx, task }) = handle else {
            debug!("timer_stop_while_idle");
            return false;
        };

        let _ = stop_tx.send(true);
        if let Err(e) = task.await {
            warn!(error = %e, "timer_task_join_failed");
        }
        self.inner.running.store(false, Ordering::Release);

        if let Some(ref surface) = self.inner.options.status_surface {
            surface.clear();
        }
        if let Some(ref broadcast) = self.inner.options.broadcast {
            broadcast.send_stopped();
        }

        info!(elapsed_seconds = %self.elapsed_seconds(), "timer_stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Elapsed seconds of the current (or last) run
    pub fn elapsed_seconds(&self) -> u64 {
        self.inner.elapsed.load(Ordering::Relaxed)
    }

    /// Attach an observer. Ticks arrive as formatted `HH:MM:SS` strings.
    pub fn attach(&self) -> (ObserverId, mpsc::Receiver<String>) {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.options.observer_buffer);
        self.inner.observers.lock().insert(id, tx);
        debug!(observer_id = %id, "timer_observer_attached");
        (id, rx)
    }

    /// Detach an observer. The timer keeps running.
    pub fn detach(&self, id: ObserverId) -> bool {
        let removed = self.inner.observers.lock().remove(&id).is_some();
        debug!(observer_id = %id, removed = %removed, "timer_observer_detached");
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

impl ProcessProbe for TimerProcess {
    fn is_running(&self) -> bool {
        TimerProcess::is_running(self)
    }
}

async fn tick_loop(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = interval(inner.options.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut elapsed_seconds = 0u64;

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                inner.emit(TimerTick { elapsed_seconds });
                elapsed_seconds += 1;
            }
        }
    }
}

impl Inner {
    fn emit(&self, tick: TimerTick) {
        let formatted = tick.formatted();
        self.elapsed.store(tick.elapsed_seconds, Ordering::Relaxed);
        self.metrics.record_tick();

        self.observers.lock().retain(|id, tx| match tx.try_send(formatted.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.metrics.record_observer_tick_dropped();
                debug!(observer_id = %id, "timer_observer_full");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(observer_id = %id, "timer_observer_gone");
                false
            }
        });

        if let Some(ref surface) = self.options.status_surface {
            surface.show(&formatted);
        }
        if let Some(ref broadcast) = self.options.broadcast {
            broadcast.send_tick(&formatted);
        }
    }
}
