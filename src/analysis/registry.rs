//! Task registry: one record per title row, arbitrating concurrent
//! analysis lifecycles and serving observed state to callers.

use crate::analysis::fetcher::{run_analysis, TaskContext};
use crate::analysis::normalize::dedup_corrections;
use crate::analysis::progress::ProgressSnapshot;
use crate::analysis::sink::{chronological, ResultPoint, ResultSink};
use crate::runtime::telemetry::Telemetry;
use crate::source::{Correction, WordCountSource};
use anyhow::{bail, Result};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Where a task currently sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// No analysis was ever requested for the row.
    Idle,
    /// A fetch loop is active and holds the row's cancellation controller.
    Running,
    /// A previous run finished or was cancelled; its results stay readable.
    Settled,
}

/// How a fetch loop ended; drives settle-side accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    Cancelled,
}

pub(crate) struct RunningTask {
    /// Monotonic identifier of this run. Guards every write issued by the
    /// fetch loop so a loop outliving its registration cannot touch state
    /// that no longer belongs to it.
    run: u64,
    controller: CancellationToken,
    progress: ProgressSnapshot,
    results: Vec<ResultPoint>,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct SettledTask {
    results: Vec<ResultPoint>,
}

pub(crate) enum TaskEntry {
    Running(RunningTask),
    Settled(SettledTask),
}

pub(crate) struct RegistryInner {
    tasks: Mutex<HashMap<usize, TaskEntry>>,
    pub(crate) source: Arc<dyn WordCountSource>,
    pub(crate) sink: Arc<dyn ResultSink>,
    pub(crate) telemetry: Arc<Telemetry>,
    shutdown_root: Mutex<CancellationToken>,
    generation: AtomicU64,
}

/// Tracks every analysis task by its title row index. One task per row may
/// run at a time; independent rows run concurrently without coordination.
#[derive(Clone)]
pub struct AnalysisRegistry {
    inner: Arc<RegistryInner>,
}

impl AnalysisRegistry {
    pub fn new(
        source: Arc<dyn WordCountSource>,
        sink: Arc<dyn ResultSink>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self::with_cancellation_token(source, sink, telemetry, CancellationToken::new())
    }

    /// Builds a registry whose tasks derive their controllers from
    /// `shutdown_root`, so cancelling that token cancels every task.
    pub fn with_cancellation_token(
        source: Arc<dyn WordCountSource>,
        sink: Arc<dyn ResultSink>,
        telemetry: Arc<Telemetry>,
        shutdown_root: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tasks: Mutex::new(HashMap::new()),
                source,
                sink,
                telemetry,
                shutdown_root: Mutex::new(shutdown_root),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.shutdown_root.lock().unwrap().clone()
    }

    /// Swaps in a fresh root token after a shutdown so the registry can
    /// accept new runs again. Tasks already derived from the old root keep
    /// their cancelled controllers.
    pub fn replace_shutdown_root(&self, token: CancellationToken) {
        *self.inner.shutdown_root.lock().unwrap() = token;
    }

    /// Launches an analysis for `index`, fetching one word count per unique
    /// correction of `title` in feed order. Must be called from within a
    /// Tokio runtime.
    ///
    /// An empty correction list is a recorded no-op: the call succeeds and
    /// the row stays in whatever phase it was. A row with a run already in
    /// flight is rejected; settled rows are overwritten by the new run.
    pub fn start(&self, index: usize, title: u32, corrections: Vec<Correction>) -> Result<()> {
        if corrections.is_empty() {
            tracing::debug!(row = index, title, "no corrections recorded; nothing to analyze");
            return Ok(());
        }

        let work = dedup_corrections(corrections);
        let controller = self.inner.shutdown_root.lock().unwrap().child_token();

        let run = {
            let mut tasks = self.inner.tasks.lock().unwrap();
            if matches!(tasks.get(&index), Some(TaskEntry::Running(_))) {
                bail!("an analysis is already running for row {index}");
            }
            let run = self.inner.generation.fetch_add(1, Ordering::SeqCst);
            tasks.insert(
                index,
                TaskEntry::Running(RunningTask {
                    run,
                    controller: controller.clone(),
                    progress: ProgressSnapshot::starting(),
                    results: Vec::new(),
                    handle: None,
                }),
            );
            run
        };

        self.inner.telemetry.record_task_started();
        tracing::debug!(
            row = index,
            title,
            revisions = work.len(),
            "revision analysis started"
        );

        let handle = tokio::spawn(run_analysis(TaskContext {
            inner: Arc::clone(&self.inner),
            index,
            run,
            title,
            work,
            controller,
        }));
        self.inner.attach_handle(index, run, handle);

        Ok(())
    }

    /// Stops the running analysis for `index`, if any. The row settles
    /// immediately: accumulated results stay readable, progress disappears,
    /// and anything the detached loop still tries to write is discarded.
    pub fn cancel(&self, index: usize) -> bool {
        let cancelled = {
            let mut tasks = self.inner.tasks.lock().unwrap();
            match tasks.remove(&index) {
                Some(TaskEntry::Running(running)) => {
                    running.controller.cancel();
                    tasks.insert(
                        index,
                        TaskEntry::Settled(SettledTask {
                            results: running.results,
                        }),
                    );
                    true
                }
                Some(entry) => {
                    tasks.insert(index, entry);
                    false
                }
                None => false,
            }
        };

        if cancelled {
            self.inner.telemetry.record_task_cancelled();
            tracing::debug!(row = index, "revision analysis cancelled");
        }
        cancelled
    }

    pub fn is_running(&self, index: usize) -> bool {
        matches!(
            self.inner.tasks.lock().unwrap().get(&index),
            Some(TaskEntry::Running(_))
        )
    }

    pub fn phase(&self, index: usize) -> TaskPhase {
        match self.inner.tasks.lock().unwrap().get(&index) {
            None => TaskPhase::Idle,
            Some(TaskEntry::Running(_)) => TaskPhase::Running,
            Some(TaskEntry::Settled(_)) => TaskPhase::Settled,
        }
    }

    /// Progress of the running analysis for `index`; `None` for rows that
    /// are idle or settled.
    pub fn progress(&self, index: usize) -> Option<ProgressSnapshot> {
        match self.inner.tasks.lock().unwrap().get(&index) {
            Some(TaskEntry::Running(running)) => Some(running.progress.clone()),
            _ => None,
        }
    }

    /// The visible series for `index`, sorted ascending by date. `None`
    /// until the first point of a run lands, and for rows never analyzed.
    pub fn results(&self, index: usize) -> Option<Vec<ResultPoint>> {
        let tasks = self.inner.tasks.lock().unwrap();
        let points = match tasks.get(&index) {
            Some(TaskEntry::Running(running)) => &running.results,
            Some(TaskEntry::Settled(settled)) => &settled.results,
            None => return None,
        };
        if points.is_empty() {
            None
        } else {
            Some(chronological(points))
        }
    }

    pub fn running_tasks(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|entry| matches!(entry, TaskEntry::Running(_)))
            .count()
    }

    /// Cancels every running task, settles their entries with whatever
    /// results they had accumulated, and waits for the loops to wind down.
    pub async fn shutdown(&self) {
        self.inner.shutdown_root.lock().unwrap().cancel();

        let mut handles = Vec::new();
        {
            let mut tasks = self.inner.tasks.lock().unwrap();
            let indices: Vec<usize> = tasks.keys().copied().collect();
            for index in indices {
                match tasks.remove(&index) {
                    Some(TaskEntry::Running(mut running)) => {
                        if let Some(handle) = running.handle.take() {
                            handles.push(handle);
                        }
                        tasks.insert(
                            index,
                            TaskEntry::Settled(SettledTask {
                                results: running.results,
                            }),
                        );
                        self.inner.telemetry.record_task_cancelled();
                    }
                    Some(entry) => {
                        tasks.insert(index, entry);
                    }
                    None => {}
                }
            }
        }

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                tracing::warn!(error = %err, "analysis task terminated abnormally");
            }
        }
        tracing::debug!("analysis registry shut down");
    }
}

impl RegistryInner {
    /// Stores a fresh progress snapshot for run `run`. Returns `false` when
    /// the entry no longer belongs to that run, in which case the loop must
    /// stop publishing.
    pub(crate) fn set_progress(&self, index: usize, run: u64, snapshot: ProgressSnapshot) -> bool {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&index) {
            Some(TaskEntry::Running(running)) if running.run == run => {
                running.progress = snapshot;
                true
            }
            _ => false,
        }
    }

    /// Appends a point to run `run` and returns the updated display series,
    /// or `None` when the write was stale and has been discarded.
    pub(crate) fn append_point(
        &self,
        index: usize,
        run: u64,
        point: ResultPoint,
    ) -> Option<Vec<ResultPoint>> {
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.get_mut(&index) {
            Some(TaskEntry::Running(running)) if running.run == run => {
                running.results.push(point);
                Some(chronological(&running.results))
            }
            _ => None,
        }
    }

    /// Moves run `run` from `Running` to `Settled`, keeping its accumulated
    /// results. No-ops when the entry was already settled, e.g. by `cancel`.
    pub(crate) fn settle(&self, index: usize, run: u64, outcome: RunOutcome) {
        let transitioned = {
            let mut tasks = self.tasks.lock().unwrap();
            match tasks.remove(&index) {
                Some(TaskEntry::Running(running)) if running.run == run => {
                    tasks.insert(
                        index,
                        TaskEntry::Settled(SettledTask {
                            results: running.results,
                        }),
                    );
                    true
                }
                Some(entry) => {
                    tasks.insert(index, entry);
                    false
                }
                None => false,
            }
        };

        if !transitioned {
            return;
        }
        match outcome {
            RunOutcome::Completed => {
                self.telemetry.record_task_completed();
                tracing::debug!(row = index, "revision analysis completed");
            }
            RunOutcome::Cancelled => {
                self.telemetry.record_task_cancelled();
                tracing::debug!(row = index, "revision analysis stopped before completion");
            }
        }
    }

    fn attach_handle(&self, index: usize, run: u64, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(TaskEntry::Running(running)) = tasks.get_mut(&index) {
            if running.run == run {
                running.handle = Some(handle);
            }
        }
        // A run that already settled has nothing left to join.
    }
}
