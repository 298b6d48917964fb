//! One sync's lifecycle and poll loop.
//!
//! ```text
//!   Idle ──start──▶ Running ──stop──▶ Stopping ──▶ Idle
//!                      │
//!                      └── destination open fails ──▶ Idle
//! ```
//!
//! Each `start` spawns a fresh execution unit tagged with a generation number.
//! A unit only ever clears the phase it set itself, so a late exit from an
//! older unit cannot clobber a newer run. `start`/`stop` are serialised on
//! the worker lock; after `stop` returns the previous unit is gone, either
//! because it observed its cancellation token within the grace period or
//! because it was aborted.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Local;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use leadable_core::{AppConfig, Frequency, SyncName, SyncSettings};
use leadable_sync::{run_cycle, RecordSource, RowOutcome, SheetStore};

use crate::status::StatusSink;

/// Delays the engine applies independently of each sync's frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Pause after a recoverable cycle failure.
    pub backoff: Duration,
    /// How long `stop` waits for the unit before aborting it.
    pub stop_grace: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(300),
            stop_grace: Duration::from_secs(1),
        }
    }
}

impl From<&AppConfig> for EngineTiming {
    fn from(config: &AppConfig) -> Self {
        Self {
            backoff: config.backoff(),
            stop_grace: config.stop_grace(),
        }
    }
}

/// Everything a poll loop talks to. Shared by all tasks of a registry.
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn RecordSource>,
    pub store: Arc<dyn SheetStore>,
    pub sink: StatusSink,
    pub timing: EngineTiming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Idle,
    Running,
    Stopping,
}

/// Point-in-time view of a task. Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub name: SyncName,
    pub state: TaskState,
    pub frequency_minutes: u32,
    pub frequency_label: String,
    pub account_id: String,
    pub form_id: String,
    pub sheet_id: String,
    pub last_status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running { generation: u64 },
    Stopping,
}

/// State the poll loop and the controlling handle both see.
struct Shared {
    settings: SyncSettings,
    frequency: Mutex<Frequency>,
    phase: Mutex<Phase>,
    last_status: Mutex<Option<String>>,
}

impl Shared {
    fn sleep_interval(&self) -> Duration {
        Duration::from_secs(lock(&self.frequency).as_secs())
    }

    fn info(&self, sink: &StatusSink, message: String) {
        *lock(&self.last_status) = Some(message.clone());
        sink.info(&self.settings.name, message);
    }

    fn error(&self, sink: &StatusSink, message: String) {
        *lock(&self.last_status) = Some(message.clone());
        sink.error(&self.settings.name, message);
    }

    /// Called by a unit that exits on its own. No-op if a newer run owns the phase.
    fn finish(&self, generation: u64) {
        let mut phase = lock(&self.phase);
        if *phase == (Phase::Running { generation }) {
            *phase = Phase::Idle;
        }
    }
}

struct Worker {
    generation: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A configured sync and, while running, its execution unit.
pub struct SyncTask {
    shared: Arc<Shared>,
    deps: Collaborators,
    worker: tokio::sync::Mutex<Option<Worker>>,
    generations: AtomicU64,
}

impl SyncTask {
    pub fn new(settings: SyncSettings, frequency: Frequency, deps: Collaborators) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                frequency: Mutex::new(frequency),
                phase: Mutex::new(Phase::Idle),
                last_status: Mutex::new(None),
            }),
            deps,
            worker: tokio::sync::Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &SyncName {
        &self.shared.settings.name
    }

    pub fn state(&self) -> TaskState {
        match *lock(&self.shared.phase) {
            Phase::Idle => TaskState::Idle,
            Phase::Running { .. } => TaskState::Running,
            Phase::Stopping => TaskState::Stopping,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn frequency(&self) -> Frequency {
        *lock(&self.shared.frequency)
    }

    /// Takes effect at the next sleep; a sleep already in progress keeps its length.
    pub fn set_frequency(&self, frequency: Frequency) {
        *lock(&self.shared.frequency) = frequency;
        tracing::debug!(sync = %self.name(), minutes = frequency.minutes(), "frequency updated");
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let settings = &self.shared.settings;
        let frequency = self.frequency();
        SyncSnapshot {
            name: settings.name.clone(),
            state: self.state(),
            frequency_minutes: frequency.minutes(),
            frequency_label: frequency.label(),
            account_id: settings.source.account_id.clone(),
            form_id: settings.source.form_id.clone(),
            sheet_id: settings.destination.sheet_id.clone(),
            last_status: lock(&self.shared.last_status).clone(),
        }
    }

    /// Launch the poll loop. No-op while a unit is already running.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;

        if let Some(current) = worker.as_ref() {
            let owns_phase =
                *lock(&self.shared.phase) == (Phase::Running { generation: current.generation });
            if owns_phase && !current.handle.is_finished() {
                return;
            }
        }
        // A unit that ended by itself (fatal open failure) is reaped here.
        if let Some(stale) = worker.take() {
            stale.cancel.cancel();
            stale.handle.abort();
        }

        let generation = self.generations.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.shared.phase) = Phase::Running { generation };
        self.shared
            .info(&self.deps.sink, format!("Started ({})", self.name()));

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            self.shared.clone(),
            self.deps.clone(),
            cancel.clone(),
            generation,
        ));
        *worker = Some(Worker {
            generation,
            cancel,
            handle,
        });
    }

    /// Signal the loop and wait up to the grace period for it to exit.
    /// No-op while idle.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        let Some(Worker {
            generation,
            cancel,
            mut handle,
        }) = worker.take()
        else {
            return;
        };

        let was_running = {
            let mut phase = lock(&self.shared.phase);
            let running = *phase == (Phase::Running { generation });
            if running {
                *phase = Phase::Stopping;
            }
            running
        };

        cancel.cancel();
        if tokio::time::timeout(self.deps.timing.stop_grace, &mut handle)
            .await
            .is_err()
        {
            // A unit stuck in a blocking call only sees the abort at its next
            // yield; its generation no longer owns the phase, so it is detached.
            tracing::warn!(sync = %self.name(), "poll loop did not exit in time; aborting");
            handle.abort();
        }

        *lock(&self.shared.phase) = Phase::Idle;
        if was_running {
            self.shared
                .info(&self.deps.sink, format!("Stopped ({})", self.name()));
        }
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.cancel.cancel();
            worker.handle.abort();
        }
    }
}

/// The execution unit. Every await races the cancellation token.
async fn poll_loop(
    shared: Arc<Shared>,
    deps: Collaborators,
    cancel: CancellationToken,
    generation: u64,
) {
    let name = shared.settings.name.clone();
    let sink = &deps.sink;

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        opened = deps.store.open(&shared.settings.destination) => opened,
    };
    let sheet = match opened {
        Ok(sheet) => sheet,
        Err(err) => {
            shared.error(sink, format!("Google Sheets error ({name}): {err}"));
            shared.finish(generation);
            return;
        }
    };

    while !cancel.is_cancelled() {
        shared.info(
            sink,
            format!("Checking ({name}): {}", Local::now().format("%H:%M:%S")),
        );

        let cycle = run_cycle(
            deps.source.as_ref(),
            deps.store.as_ref(),
            &shared.settings,
            &sheet,
            |outcome| match outcome {
                RowOutcome::Appended { name: lead, .. } => {
                    shared.info(sink, format!("New lead: {lead}"));
                }
                RowOutcome::Failed { error, .. } => {
                    shared.error(sink, format!("Append failed ({name}): {error}"));
                }
                RowOutcome::Skipped { .. } => {}
            },
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            outcome = AssertUnwindSafe(cycle).catch_unwind() => outcome,
        };

        let delay = match outcome {
            Ok(Ok(_report)) => {
                shared.info(sink, format!("Waiting ({name})..."));
                shared.sleep_interval()
            }
            Ok(Err(err)) => {
                shared.error(sink, format!("Error ({name}): {err}"));
                deps.timing.backoff
            }
            Err(panic) => {
                shared.error(
                    sink,
                    format!("Error ({name}): cycle panicked: {}", panic_message(&*panic)),
                );
                deps.timing.backoff
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!(sync = %name, generation, "poll loop exited");
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
