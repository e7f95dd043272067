//! Scheduler / Worker Pool (C9): selects runnable tasks honoring
//! dependencies and concurrency, and drives the dispatch loop that
//! hands each selected task to a Phase Engine invocation.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::deps;
use crate::engine::collaborators::TaskStore;
use crate::engine::PhaseEngine;
use crate::errors::OrcResult;
use crate::orphan;
use crate::phase::Workflow;
use crate::task::{DependencyStatus, Queue, Task, TaskId, TaskStatus};

/// Orders tasks the way the scheduler dispatches them: priority
/// ascending (critical first), then created_at ascending, ties broken
/// by id.
pub fn dispatch_order(tasks: &[&Task]) -> Vec<TaskId> {
    let mut candidates: Vec<&Task> = tasks.to_vec();
    candidates.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.into_iter().map(|t| t.id.clone()).collect()
}

/// From the full task set, the ids eligible for dispatch right now:
/// queue=active, can_run, and not dependency-blocked.
pub fn ready_tasks(tasks: &[Task]) -> Vec<TaskId> {
    let graph = deps::resolve(tasks);
    let eligible: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.queue == Queue::Active && t.status.can_run())
        .filter(|t| graph.dependency_status(t) != DependencyStatus::Blocked)
        .collect();
    dispatch_order(&eligible)
}

/// Tracks which tasks currently occupy a worker slot, guarding against
/// the same task running in two slots concurrently (ordering guarantee
/// (b) of spec §4.9, on top of the Process Guard's OS-level exclusion),
/// and drives the poll-and-dispatch loop that feeds ready tasks to a
/// Phase Engine.
pub struct Scheduler {
    config: EngineConfig,
    concurrency: Arc<Semaphore>,
    in_flight: Mutex<HashSet<TaskId>>,
}

impl Scheduler {
    pub fn new(config: EngineConfig) -> Self {
        let concurrency = Arc::new(Semaphore::new(config.concurrency_limit));
        Self {
            config,
            concurrency,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency.available_permits()
    }

    /// Whether `id` currently occupies a slot.
    pub async fn is_in_flight(&self, id: &TaskId) -> bool {
        self.in_flight.lock().await.contains(id)
    }

    /// Pick the next dispatchable task from `tasks`, skipping any id
    /// already in flight, and reserve its slot. Returns `None` if no
    /// slot is free or nothing is ready.
    pub async fn try_dispatch(&self, tasks: &[Task]) -> Option<TaskId> {
        let permit = self.concurrency.clone().try_acquire_owned().ok()?;
        let mut in_flight = self.in_flight.lock().await;

        let candidate = ready_tasks(tasks).into_iter().find(|id| !in_flight.contains(id))?;
        in_flight.insert(candidate.clone());
        drop(in_flight);

        // The permit is intentionally leaked to the caller's bookkeeping:
        // release happens explicitly via `complete`. Forgetting it here
        // keeps the slot held until the engine invocation finishes.
        std::mem::forget(permit);
        debug!(task = %candidate, "dispatching task");
        Some(candidate)
    }

    /// Release the slot held by `id` and let the next `try_dispatch`
    /// reuse it.
    pub async fn complete(&self, id: &TaskId) {
        self.in_flight.lock().await.remove(id);
        self.concurrency.add_permits(1);
        info!(task = %id, "task slot released");
    }

    /// Run the startup orphan pass: any running task whose executor is
    /// gone is reported with its classification reason, using the
    /// configured staleness threshold, so the caller can reset it to
    /// paused/failed before admitting it back to the pool.
    pub fn startup_orphan_sweep(&self, tasks: &[Task], now: chrono::DateTime<chrono::Utc>) -> Vec<(TaskId, String)> {
        tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .filter_map(|t| orphan::classify(t, now, self.config.orphan_stale_minutes).map(|reason| (t.id.clone(), reason)))
            .collect()
    }

    /// Drive the main dispatch loop described in spec §4.9: maintain up
    /// to `concurrency_limit` in-flight Phase Engine invocations,
    /// re-polling `store` for ready tasks whenever a slot frees, idling
    /// at `idle_poll_interval` when nothing is ready. On cancellation,
    /// stop admitting new work and wait for every in-flight invocation
    /// to observe the same cancellation and return before this method
    /// does.
    pub async fn run(
        self: Arc<Self>,
        store: Arc<dyn TaskStore>,
        engine: Arc<PhaseEngine>,
        workflow: Arc<Workflow>,
        cancel: CancellationToken,
    ) -> OrcResult<()> {
        let (done_tx, mut done_rx) = mpsc::channel::<TaskId>(self.config.concurrency_limit.max(1));
        let mut active: HashMap<TaskId, JoinHandle<()>> = HashMap::new();

        loop {
            if !cancel.is_cancelled() {
                let tasks = store.load_all_tasks().await?;
                while !cancel.is_cancelled() {
                    let Some(task_id) = self.try_dispatch(&tasks).await else {
                        break;
                    };
                    info!(task = %task_id, "scheduler dispatching task to phase engine");

                    let engine = engine.clone();
                    let workflow = workflow.clone();
                    let store = store.clone();
                    let scheduler = self.clone();
                    let child_cancel = cancel.clone();
                    let done_tx = done_tx.clone();
                    let id = task_id.clone();

                    let handle = tokio::spawn(async move {
                        match store.load_task(&id).await {
                            Ok(mut task) => {
                                if let Err(err) = engine.run(&mut task, &workflow, &child_cancel).await {
                                    warn!(task = %id, %err, "phase engine invocation failed");
                                }
                            }
                            Err(err) => warn!(task = %id, %err, "failed to load dispatched task"),
                        }
                        scheduler.complete(&id).await;
                        done_tx.send(id).await.ok();
                    });
                    active.insert(task_id, handle);
                }
            }

            if cancel.is_cancelled() {
                debug!(in_flight = active.len(), "scheduler cancelled, draining in-flight phase engines");
                for (_, handle) in active.drain() {
                    handle.await.ok();
                }
                break;
            }

            if active.is_empty() {
                tokio::time::sleep(self.config.idle_poll_interval()).await;
                continue;
            }

            if let Some(done_id) = done_rx.recv().await {
                if let Some(handle) = active.remove(&done_id) {
                    handle.await.ok();
                }
            }
        }

        Ok(())
    }
}
