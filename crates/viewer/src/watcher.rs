//! Polling watcher that keeps the newest records of one log file.
//!
//! A single task fetches the file once, then asks the server for the file's
//! freshness marker every interval and refetches only when the marker moved
//! forward. Consumers observe the latest [`WatchState`] through a
//! `tokio::sync::watch` channel.

use impview_common::{LogRecord, LogsResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::client::LogSource;

/// Polling period used when none is given.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// What the watcher currently knows about its target file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchState {
    /// File the watcher follows.
    pub file: String,
    /// Records of the last successful fetch, newest first.
    pub records: Vec<LogRecord>,
    /// Freshness marker of the last successful fetch; 0 before the first.
    pub last_modified: u64,
    /// Display text of the last failed fetch, cleared by the next success.
    pub error: Option<String>,
    /// Bumped on every published change.
    pub revision: u64,
    /// Whether a fetch for the current `file` has been applied.
    loaded: bool,
    applied: u64,
}

impl WatchState {
    /// Empty state for `file`, not loaded yet.
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    /// Whether a full fetch of the current file has completed, successfully
    /// or not.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Apply the outcome of the fetch issued with `ticket`.
    ///
    /// Returns `false` and leaves the state untouched when a newer fetch has
    /// already been applied.
    pub fn apply(&mut self, ticket: u64, outcome: Result<LogsResponse, String>) -> bool {
        if ticket <= self.applied {
            return false;
        }
        self.applied = ticket;
        self.loaded = true;
        match outcome {
            Ok(response) => {
                self.records = response.records;
                self.last_modified = response.last_modified;
                self.error = None;
            }
            Err(error) => self.error = Some(error),
        }
        self.revision += 1;
        true
    }

    /// Forget everything about the previous target and point at `file`.
    fn retarget(&mut self, file: &str) {
        self.file = file.to_string();
        self.records.clear();
        self.last_modified = 0;
        self.error = None;
        self.loaded = false;
        self.revision += 1;
    }
}

/// Control side of a running watcher.
///
/// Dropping the handle also stops the task, without waiting for it.
#[derive(Debug)]
pub struct WatchHandle {
    state: watch::Receiver<WatchState>,
    target: watch::Sender<String>,
    refresh: mpsc::Sender<()>,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Receiver that sees every state the watcher publishes.
    pub fn subscribe(&self) -> watch::Receiver<WatchState> {
        self.state.clone()
    }

    /// Snapshot of the latest published state.
    pub fn current(&self) -> WatchState {
        self.state.borrow().clone()
    }

    /// Point the watcher at another file. Setting the current file again is
    /// a no-op.
    pub fn set_file(&self, file: impl Into<String>) {
        let file = file.into();
        self.target.send_if_modified(|current| {
            if *current == file {
                false
            } else {
                *current = file;
                true
            }
        });
    }

    /// Fetch the full file now instead of waiting for the marker to move.
    pub fn refresh(&self) {
        // A pending refresh already covers this one.
        let _ = self.refresh.try_send(());
    }

    /// Stop polling. No request is issued once this returns.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "Watcher task ended abnormally.");
        }
    }
}

/// Start watching `file` on the current tokio runtime.
pub fn spawn<S: LogSource>(source: Arc<S>, file: impl Into<String>, interval: Duration) -> WatchHandle {
    let file = file.into();
    let (state_tx, state_rx) = watch::channel(WatchState::new(file.clone()));
    let (target_tx, target_rx) = watch::channel(file);
    let (refresh_tx, refresh_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = watch::channel(false);

    let poller = Poller {
        source,
        period: interval.max(Duration::from_millis(1)),
        state: state_tx,
        target: target_rx,
        refresh: refresh_rx,
        stop: stop_rx,
        next_ticket: 0,
    };
    let task = tokio::spawn(poller.run());

    WatchHandle {
        state: state_rx,
        target: target_tx,
        refresh: refresh_tx,
        stop: stop_tx,
        task,
    }
}

/// Why the current request or wait was abandoned.
enum Interrupt {
    Stop,
    Retarget,
}

struct Poller<S> {
    source: Arc<S>,
    period: Duration,
    state: watch::Sender<WatchState>,
    target: watch::Receiver<String>,
    refresh: mpsc::Receiver<()>,
    stop: watch::Receiver<bool>,
    next_ticket: u64,
}

impl<S: LogSource> Poller<S> {
    async fn run(mut self) {
        let mut file = self.target.borrow_and_update().clone();
        debug!(%file, period_ms = self.period.as_millis(), "Watcher started.");

        'target: loop {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut full_fetch = true;

            loop {
                let step = if full_fetch {
                    self.fetch(&file).await
                } else {
                    self.check_status(&file).await
                };
                match step {
                    Ok(()) => {}
                    Err(Interrupt::Stop) => break 'target,
                    Err(Interrupt::Retarget) => {
                        file = self.retarget();
                        continue 'target;
                    }
                }

                full_fetch = tokio::select! {
                    biased;
                    _ = self.stop.changed() => break 'target,
                    changed = self.target.changed() => {
                        if changed.is_err() {
                            break 'target;
                        }
                        file = self.retarget();
                        continue 'target;
                    }
                    Some(()) = self.refresh.recv() => true,
                    _ = ticker.tick() => false,
                };
            }
        }

        debug!(%file, "Watcher stopped.");
    }

    /// Read the new target and publish the reset state.
    fn retarget(&mut self) -> String {
        let file = self.target.borrow_and_update().clone();
        debug!(%file, "Watching new file.");
        self.state.send_modify(|state| state.retarget(&file));
        file
    }

    async fn fetch(&mut self, file: &str) -> Result<(), Interrupt> {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let source = Arc::clone(&self.source);

        let outcome = self.interruptible(source.fetch_logs(file)).await?;
        let outcome = outcome.map_err(|err| {
            warn!(file, error = %err, "Failed to fetch logs.");
            err.to_string()
        });
        self.state.send_if_modified(|state| state.apply(ticket, outcome));
        Ok(())
    }

    /// Ask for the freshness marker and refetch if it moved forward.
    async fn check_status(&mut self, file: &str) -> Result<(), Interrupt> {
        let source = Arc::clone(&self.source);
        let status = match self.interruptible(source.fetch_status(file)).await? {
            Ok(status) => status,
            Err(err) => {
                debug!(file, error = %err, "Status check failed.");
                return Ok(());
            }
        };

        let known = self.state.borrow().last_modified;
        if status.last_modified > known {
            debug!(file, known, current = status.last_modified, "Log file changed.");
            self.fetch(file).await
        } else {
            Ok(())
        }
    }

    /// Await `request` unless stop or a new target comes first.
    async fn interruptible<T>(&mut self, request: impl Future<Output = T>) -> Result<T, Interrupt> {
        tokio::select! {
            biased;
            _ = self.stop.changed() => Err(Interrupt::Stop),
            changed = self.target.changed() => match changed {
                Ok(()) => Err(Interrupt::Retarget),
                Err(_) => Err(Interrupt::Stop),
            },
            value = request => Ok(value),
        }
    }
}
