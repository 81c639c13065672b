//! Processing orchestrator
//!
//! Owns the [`RunState`] and a single worker task that pulls items from the
//! [`QueueManager`] one at a time. Control calls validate and record their
//! transition under the state lock, then wake the worker; the worker settles
//! `Pausing`/`Stopping` at the next checkpoint.

use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use super::events::{ProcessingEvent, RunCounters};
use super::pipeline::{Adapters, Interrupt, ItemContext, ItemResult, Pipeline, StageError};
use super::review::{ReviewEdits, ReviewQueue};
use super::state::{allowed_actions, transition, ControlAction, RunState, Transition};
use crate::config::DocsiftConfig;
use crate::error::{Error, PipelineError, Result};
use crate::queue::QueueManager;
use crate::storage::ResultStore;
use crate::types::{ItemError, ItemStatus, ProcessingOutcome, QueueItem, QueueStats};

const EVENT_CAPACITY: usize = 1024;

/// Wall-clock time spent Running, frozen while paused
#[derive(Debug, Default)]
struct RunClock {
    accumulated: Duration,
    started: Option<Instant>,
}

impl RunClock {
    fn resume(&mut self) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
    }

    fn freeze(&mut self) {
        if let Some(started) = self.started.take() {
            self.accumulated += started.elapsed();
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn elapsed(&self) -> Duration {
        self.accumulated + self.started.map(|s| s.elapsed()).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct RunInfo {
    run_id: Uuid,
    counters: RunCounters,
    current: Option<PathBuf>,
    clock: RunClock,
}

/// Snapshot returned by [`Orchestrator::status`]
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub state: RunState,
    pub run_id: Uuid,
    pub counters: RunCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<PathBuf>,
    pub elapsed_seconds: f64,
    pub queue: QueueStats,
    pub allowed_actions: Vec<ControlAction>,
    pub pending_reviews: usize,
}

struct Inner {
    queue: Arc<QueueManager>,
    pipeline: Pipeline,
    reviews: ReviewQueue,
    state: Mutex<RunState>,
    run: Mutex<RunInfo>,
    wake: Notify,
    events: broadcast::Sender<ProcessingEvent>,
    shutdown: AtomicBool,
}

/// Pausable single-worker pipeline driver
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create the orchestrator and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: Arc<DocsiftConfig>,
        queue: Arc<QueueManager>,
        store: Arc<dyn ResultStore>,
        adapters: Adapters,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let inner = Arc::new(Inner {
            queue,
            pipeline: Pipeline::new(config, adapters, store),
            reviews: ReviewQueue::new(),
            state: Mutex::new(RunState::Idle),
            run: Mutex::new(RunInfo::default()),
            wake: Notify::new(),
            events,
            shutdown: AtomicBool::new(false),
        });

        tokio::spawn(Arc::clone(&inner).run_worker());
        tracing::info!("Processing orchestrator started");

        Self { inner }
    }

    /// Begin processing the queue
    pub fn start(&self) -> Result<()> {
        self.control(ControlAction::Start).map(|_| ())
    }

    /// Request a pause at the next checkpoint
    pub fn pause(&self) -> Result<()> {
        self.control(ControlAction::Pause).map(|_| ())
    }

    /// Continue from the head of the queue
    pub fn resume(&self) -> Result<()> {
        self.control(ControlAction::Resume).map(|_| ())
    }

    /// Request a stop at the next checkpoint; counters reset once idle
    pub fn stop(&self) -> Result<()> {
        self.control(ControlAction::Stop).map(|_| ())
    }

    /// Move Failed items back to Pending, starting a batch when idle.
    /// Returns how many items were reset.
    pub fn retry_failed_items(&self) -> Result<usize> {
        self.control(ControlAction::Retry)
    }

    /// Apply any control action
    pub fn control(&self, action: ControlAction) -> Result<usize> {
        let reset = {
            let mut state = self.inner.state.lock();
            let from = *state;
            match transition(from, action)? {
                Transition::To(to) => {
                    self.inner.enter(&mut state, to);
                    0
                }
                Transition::NoOp => 0,
                Transition::ResetAndStart => {
                    let reset = self.inner.queue.reset_failed();
                    self.inner.enter(&mut state, RunState::Running);
                    reset
                }
                Transition::ResetOnly => self.inner.queue.reset_failed(),
            }
        };

        tracing::info!("Control request '{}' accepted", action);
        self.inner.wake.notify_one();
        Ok(reset)
    }

    pub fn state(&self) -> RunState {
        *self.inner.state.lock()
    }

    /// Path of the item being processed, if any
    pub fn current_item(&self) -> Option<PathBuf> {
        self.inner.run.lock().current.clone()
    }

    /// Time spent running in the current batch
    pub fn elapsed(&self) -> Duration {
        self.inner.run.lock().clock.elapsed()
    }

    pub fn counters(&self) -> RunCounters {
        self.inner.run.lock().counters
    }

    pub fn allowed_actions(&self) -> Vec<ControlAction> {
        allowed_actions(self.state())
    }

    pub fn status(&self) -> OrchestratorStatus {
        let state = self.state();
        let (run_id, counters, current_item, elapsed) = {
            let run = self.inner.run.lock();
            (run.run_id, run.counters, run.current.clone(), run.clock.elapsed())
        };

        OrchestratorStatus {
            state,
            run_id,
            counters,
            current_item,
            elapsed_seconds: elapsed.as_secs_f64(),
            queue: self.inner.queue.statistics(),
            allowed_actions: allowed_actions(state),
            pending_reviews: self.inner.reviews.len(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.inner.events.subscribe()
    }

    pub fn queue(&self) -> &Arc<QueueManager> {
        &self.inner.queue
    }

    /// Outcomes waiting for a decision
    pub fn pending_reviews(&self) -> Vec<ProcessingOutcome> {
        self.inner.reviews.list()
    }

    /// Persist a held outcome, optionally with corrections
    pub async fn approve_review(
        &self,
        path: &Path,
        edits: Option<ReviewEdits>,
    ) -> Result<ProcessingOutcome> {
        let mut outcome = self
            .inner
            .reviews
            .take(path)
            .ok_or_else(|| Error::NotFound(format!("No pending review for {}", path.display())))?;

        let max_tags = self.inner.pipeline.config().processing.max_tags;
        edits.unwrap_or_default().apply(&mut outcome, max_tags);

        if let Err(e) = self.inner.pipeline.persist(&outcome).await {
            self.inner.reviews.insert(outcome);
            return Err(Error::Database(e.message));
        }

        tracing::info!("Review approved for {}", path.display());
        self.inner.emit(ProcessingEvent::ItemCompleted {
            outcome: Box::new(outcome.clone()),
        });
        Ok(outcome)
    }

    /// Discard a held outcome
    pub fn reject_review(&self, path: &Path) -> Result<()> {
        self.inner
            .reviews
            .take(path)
            .ok_or_else(|| Error::NotFound(format!("No pending review for {}", path.display())))?;
        tracing::info!("Review rejected for {}", path.display());
        Ok(())
    }

    /// Stop the worker task. Pending work stays queued.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::SeqCst);
        self.inner.wake.notify_one();
    }
}

impl Inner {
    fn emit(&self, event: ProcessingEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Move to `to` with its side effects. Caller holds the state lock.
    fn enter(&self, state: &mut RunState, to: RunState) {
        let from = *state;
        if from == to {
            return;
        }

        {
            let mut run = self.run.lock();
            match (from, to) {
                (RunState::Idle | RunState::Stopped, RunState::Running) => {
                    run.run_id = Uuid::new_v4();
                    run.counters = RunCounters::default();
                    run.clock.reset();
                    run.clock.resume();
                }
                (RunState::Paused, RunState::Running) => run.clock.resume(),
                (_, RunState::Paused) => {
                    run.clock.freeze();
                    run.current = None;
                }
                (_, RunState::Idle) if from == RunState::Stopped => {
                    run.counters = RunCounters::default();
                    run.clock.reset();
                    run.current = None;
                }
                (_, RunState::Idle) => {
                    run.clock.freeze();
                    run.current = None;
                }
                _ => {}
            }
        }

        *state = to;
        tracing::info!("Run state {} -> {}", from, to);
        self.emit(ProcessingEvent::StateChanged { from, to });
    }

    async fn run_worker(self: Arc<Self>) {
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("Processing orchestrator shutting down");
                break;
            }

            let state = *self.state.lock();
            match state {
                RunState::Running => match self.queue.claim_next() {
                    Some(item) => self.process_item(item).await,
                    None => self.finish_run(),
                },
                RunState::Pausing => {
                    let mut state = self.state.lock();
                    if *state == RunState::Pausing {
                        self.enter(&mut state, RunState::Paused);
                    }
                }
                RunState::Stopping => {
                    let mut state = self.state.lock();
                    if *state == RunState::Stopping {
                        self.enter(&mut state, RunState::Stopped);
                        self.enter(&mut state, RunState::Idle);
                    }
                }
                RunState::Idle | RunState::Paused | RunState::Stopped => {
                    self.wake.notified().await;
                }
            }
        }
    }

    /// Queue drained while running
    fn finish_run(&self) {
        let mut state = self.state.lock();
        if *state != RunState::Running || self.queue.next_pending().is_some() {
            return;
        }

        self.enter(&mut state, RunState::Idle);
        let (run_id, counters, elapsed) = {
            let run = self.run.lock();
            (run.run_id, run.counters, run.clock.elapsed())
        };
        tracing::info!(
            "Run {} finished: {} processed, {} skipped, {} failed in {:.1}s",
            run_id,
            counters.processed,
            counters.skipped,
            counters.failed,
            elapsed.as_secs_f64()
        );
        self.emit(ProcessingEvent::RunFinished {
            run_id,
            counters,
            elapsed_seconds: elapsed.as_secs_f64(),
        });
    }

    async fn process_item(&self, item: QueueItem) {
        let path = item.path.clone();
        let (current, total) = {
            let mut run = self.run.lock();
            run.current = Some(path.clone());
            let stats = self.queue.statistics();
            let done = run.counters.total();
            (done + 1, done + stats.pending + stats.active)
        };

        tracing::info!("Processing {}", path.display());
        let ctx = ItemContext {
            path: &path,
            state: &self.state,
            events: &self.events,
            position: (current, total),
        };
        let result = match AssertUnwindSafe(self.pipeline.process(&item, &ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic in pipeline".to_string());
                tracing::error!("Pipeline panicked on {}: {}", path.display(), message);
                Err(StageError::Failed(PipelineError::unexpected(message)))
            }
        };

        match result {
            Ok(ItemResult::Completed(outcome)) => {
                self.queue.set_status(&path, ItemStatus::Completed, None);
                self.bump(|c| c.processed += 1);
                self.emit(ProcessingEvent::ItemCompleted {
                    outcome: Box::new(outcome),
                });
            }
            Ok(ItemResult::NeedsReview(outcome)) => {
                self.queue.set_status(&path, ItemStatus::Completed, None);
                self.bump(|c| c.processed += 1);
                self.reviews.insert(outcome.clone());
                self.emit(ProcessingEvent::ReviewRequired {
                    outcome: Box::new(outcome),
                });
            }
            Ok(ItemResult::Skipped { reason }) => {
                self.queue.set_status(&path, ItemStatus::Skipped, None);
                self.bump(|c| c.skipped += 1);
                self.emit(ProcessingEvent::ItemSkipped {
                    path: path.clone(),
                    reason,
                });
            }
            Err(StageError::Failed(err)) => {
                tracing::warn!("Failed {}: {}", path.display(), err);
                self.queue
                    .set_status(&path, ItemStatus::Failed, Some(ItemError::from(&err)));
                self.bump(|c| c.failed += 1);
                self.emit(ProcessingEvent::ItemFailed {
                    path: path.clone(),
                    code: err.kind.code().to_string(),
                    message: err.message,
                });
            }
            Err(StageError::Interrupted(interrupt)) => {
                let verb = match interrupt {
                    Interrupt::Pause => "pause",
                    Interrupt::Stop => "stop",
                };
                tracing::info!("Returning {} to the queue for {}", path.display(), verb);
                self.queue.set_status(&path, ItemStatus::Pending, None);
            }
        }

        self.run.lock().current = None;
    }

    fn bump(&self, f: impl FnOnce(&mut RunCounters)) {
        f(&mut self.run.lock().counters);
    }
}
