//! Phase Engine (C7): drives a single task through its phase sequence,
//! integrating the process guard, execution state, retries, and gates.

pub mod collaborators;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::{OrcError, OrcResult};
use crate::gates::GateEvaluator;
use crate::guard::ProcessGuard;
use crate::naming;
use crate::phase::{GateKind, Workflow};
use crate::task::{Task, TaskStatus};

use collaborators::{GitOps, LlmInvoker, PromptRenderer, TaskStore};

/// How a single [`PhaseEngine::run`] invocation concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Completed,
    /// Cooperative cancellation was observed; the task was paused.
    Cancelled,
    /// The task was marked failed after exhausting its retry policy.
    Failed,
}

/// The abstract collaborators a Phase Engine invocation needs. Bundled
/// so callers don't thread five `Arc`s through every call site.
pub struct Collaborators {
    pub store: Arc<dyn TaskStore>,
    pub git: Arc<dyn GitOps>,
    pub prompts: Arc<dyn PromptRenderer>,
    pub llm: Arc<dyn LlmInvoker>,
    pub gate: Arc<dyn GateEvaluator>,
}

/// Drives one task through a [`Workflow`]. Stateless between
/// invocations; all state lives on the `Task` passed to `run`.
pub struct PhaseEngine {
    root: PathBuf,
    executor: String,
    collaborators: Collaborators,
    config: EngineConfig,
}

impl PhaseEngine {
    pub fn new(
        root: impl Into<PathBuf>,
        executor: impl Into<String>,
        collaborators: Collaborators,
        config: EngineConfig,
    ) -> Self {
        Self {
            root: root.into(),
            executor: executor.into(),
            collaborators,
            config,
        }
    }

    fn worktree_path(&self, task: &Task) -> PathBuf {
        self.root.join(naming::worktree_dir(&task.id, &self.executor))
    }

    /// Run `task` through `workflow` from its resume point until the
    /// workflow is exhausted, the task fails, or `cancel` fires.
    pub async fn run(
        &self,
        task: &mut Task,
        workflow: &Workflow,
        cancel: &CancellationToken,
    ) -> OrcResult<EngineOutcome> {
        let worktree = self.worktree_path(task);
        let mut guard = ProcessGuard::new(&worktree, self.config.pid_file_name.clone());
        guard.acquire()?;

        let outcome = self.drive(task, workflow, cancel).await;

        guard.release();
        outcome
    }

    async fn drive(
        &self,
        task: &mut Task,
        workflow: &Workflow,
        cancel: &CancellationToken,
    ) -> OrcResult<EngineOutcome> {
        let Some(start) = workflow
            .resume_point(task.current_phase.as_deref(), &task.execution)
            .map(|p| p.id.clone())
        else {
            self.finalize(task).await?;
            return Ok(EngineOutcome::Completed);
        };

        let mut index = workflow.index_of(&start).expect("resume phase exists in workflow");

        while index < workflow.phases.len() {
            let phase = workflow.phases[index].clone();

            if cancel.is_cancelled() {
                self.interrupt(task, &phase.id).await?;
                return Ok(EngineOutcome::Cancelled);
            }

            task.execution.ensure_phase(&phase.id);
            task.execution.start_phase(&phase.id, Utc::now());
            task.status = TaskStatus::Running;
            task.current_phase = Some(phase.id.clone());
            self.persist(task).await?;

            if phase.gate.kind == GateKind::Skip {
                task.execution.skip_phase(&phase.id, "gate policy is skip", Utc::now());
                self.persist(task).await?;
                index += 1;
                continue;
            }

            task.execution.increment_iteration(&phase.id);

            let retry_context = task.execution.retry_context.clone();
            let mut last_text = String::new();
            let mut session_id: Option<String> = task
                .execution
                .phase(&phase.id)
                .and_then(|p| p.session_id.clone());

            loop {
                if cancel.is_cancelled() {
                    self.interrupt(task, &phase.id).await?;
                    return Ok(EngineOutcome::Cancelled);
                }

                let prompt = self
                    .collaborators
                    .prompts
                    .render(&phase.prompt_template_id, task, retry_context.as_ref());
                let turn = self
                    .collaborators
                    .llm
                    .invoke_turn(&prompt, session_id.as_deref())
                    .await?;

                session_id = Some(turn.session_id.clone());
                let turn_count = task
                    .execution
                    .phase(&phase.id)
                    .map(|p| p.iterations)
                    .unwrap_or(0);
                task.execution
                    .set_session(&turn.session_id, &turn.model, "active", turn_count, Utc::now());
                task.execution.ensure_phase(&phase.id).session_id = Some(turn.session_id.clone());
                task.execution.add_tokens(
                    &phase.id,
                    turn.input_tokens,
                    turn.output_tokens,
                    turn.cache_creation_tokens,
                    turn.cache_read_tokens,
                );
                task.execution.add_cost(&phase.id, turn.cost_usd, Utc::now());
                last_text = turn.text;

                if turn.done {
                    break;
                }
            }

            let outcome = self.collaborators.gate.evaluate(&phase.id, &last_text).await;
            task.execution.record_gate_decision(
                &phase.id,
                gate_type_label(phase.gate.kind),
                outcome.approved,
                &outcome.reason,
                Utc::now(),
            );

            if outcome.approved {
                let worktree = self.worktree_path(task).to_string_lossy().into_owned();
                self.collaborators.git.stage_all(&worktree).await?;
                let commit = self
                    .collaborators
                    .git
                    .commit(&worktree, &format!("{}: {}", phase.id, outcome.reason))
                    .await?;
                let sha = match commit {
                    collaborators::CommitOutcome::Committed(sha) => Some(sha),
                    collaborators::CommitOutcome::NothingToCommit => None,
                };
                task.execution.complete_phase(&phase.id, sha.as_deref(), Utc::now());
                self.persist(task).await?;
                index += 1;
                continue;
            }

            task.quality.review_rejections += 1;
            let retry_target = outcome.retry_target.or_else(|| phase.gate.retry_target.clone());

            match retry_target {
                Some(target) if target != phase.id => {
                    let attempt = task.quality.phase_retries.get(&target).copied().unwrap_or(0) + 1;
                    task.execution.reset_phase(&target);
                    task.execution.set_retry_context(
                        &phase.id,
                        &target,
                        &outcome.reason,
                        &last_text,
                        attempt,
                        Utc::now(),
                    );
                    task.record_phase_retry(&target);
                    self.persist(task).await?;
                    index = workflow.index_of(&target).ok_or_else(|| {
                        OrcError::Fatal(format!("retry target '{target}' not found in workflow"))
                    })?;
                }
                _ => {
                    let attempts_used = task.execution.phase(&phase.id).map(|p| p.iterations).unwrap_or(0);
                    if attempts_used < phase.gate.max_attempts {
                        task.execution.reset_phase(&phase.id);
                        self.persist(task).await?;
                        // stay on this phase; loop continues at the same index
                    } else {
                        task.execution.fail_phase(&phase.id, &outcome.reason);
                        task.mark_failed();
                        self.persist(task).await?;
                        warn!(task = %task.id, phase = %phase.id, "phase retries exhausted, task failed");
                        return Ok(EngineOutcome::Failed);
                    }
                }
            }
        }

        self.finalize(task).await?;
        Ok(EngineOutcome::Completed)
    }

    async fn interrupt(&self, task: &mut Task, phase_id: &str) -> OrcResult<()> {
        task.execution.interrupt_phase(phase_id, Utc::now());
        task.status = TaskStatus::Paused;
        self.persist(task).await?;
        info!(task = %task.id, phase = phase_id, "phase engine cancelled, task paused");
        Ok(())
    }

    async fn finalize(&self, task: &mut Task) -> OrcResult<()> {
        task.status = TaskStatus::Finalizing;
        self.persist(task).await?;
        task.mark_completed();
        self.persist(task).await
    }

    async fn persist(&self, task: &Task) -> OrcResult<()> {
        self.collaborators.store.save_task(task).await
    }
}

fn gate_type_label(kind: GateKind) -> &'static str {
    match kind {
        GateKind::Auto => "auto",
        GateKind::Human => "human",
        GateKind::Ai => "ai",
        GateKind::Skip => "skip",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gates::GateOutcome;
    use crate::task::TaskId;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    struct FakeStore {
        saved: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskStore for FakeStore {
        async fn save_task(&self, task: &Task) -> OrcResult<()> {
            self.saved.lock().await.push(task.clone());
            Ok(())
        }
        async fn load_task(&self, id: &TaskId) -> OrcResult<Task> {
            self.saved
                .lock()
                .await
                .iter()
                .rev()
                .find(|t| &t.id == id)
                .cloned()
                .ok_or_else(|| OrcError::not_found(id.as_str()))
        }
        async fn load_all_tasks(&self) -> OrcResult<Vec<Task>> {
            Ok(self.saved.lock().await.clone())
        }
    }

    struct FakeGit;

    #[async_trait]
    impl GitOps for FakeGit {
        async fn create_branch(&self, _name: &str, _base: &str) -> OrcResult<()> {
            Ok(())
        }
        async fn create_worktree(&self, _path: &str, _branch: &str) -> OrcResult<()> {
            Ok(())
        }
        async fn remove_worktree(&self, _path: &str) -> OrcResult<()> {
            Ok(())
        }
        async fn stage_all(&self, _worktree: &str) -> OrcResult<()> {
            Ok(())
        }
        async fn commit(&self, _worktree: &str, _message: &str) -> OrcResult<collaborators::CommitOutcome> {
            Ok(collaborators::CommitOutcome::Committed("deadbeef".to_string()))
        }
        async fn current_branch(&self, _worktree: &str) -> OrcResult<String> {
            Ok("orc/TASK-001".to_string())
        }
    }

    struct FakePrompts;

    impl PromptRenderer for FakePrompts {
        fn render(&self, template_id: &str, _task: &Task, _retry_context: Option<&crate::execution::RetryContext>) -> String {
            format!("prompt for {template_id}")
        }
    }

    struct FakeLlm;

    #[async_trait]
    impl LlmInvoker for FakeLlm {
        async fn invoke_turn(&self, _prompt: &str, session_id: Option<&str>) -> OrcResult<collaborators::LlmTurnResult> {
            Ok(collaborators::LlmTurnResult {
                session_id: session_id.unwrap_or("sess-1").to_string(),
                model: "fake-model".to_string(),
                input_tokens: 10,
                output_tokens: 5,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
                cost_usd: 0.01,
                text: "looks good".to_string(),
                done: true,
            })
        }
    }

    struct ApprovingGate;

    #[async_trait]
    impl GateEvaluator for ApprovingGate {
        async fn evaluate(&self, _phase: &str, _output: &str) -> GateOutcome {
            GateOutcome::approve("auto-approved")
        }
    }

    struct RejectNTimesGate {
        remaining_rejections: StdMutex<u32>,
    }

    #[async_trait]
    impl GateEvaluator for RejectNTimesGate {
        async fn evaluate(&self, _phase: &str, _output: &str) -> GateOutcome {
            let mut remaining = self.remaining_rejections.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                GateOutcome::reject("needs work", None)
            } else {
                GateOutcome::approve("good now")
            }
        }
    }

    fn make_collaborators(gate: Arc<dyn GateEvaluator>) -> Collaborators {
        Collaborators {
            store: Arc::new(FakeStore { saved: Mutex::new(Vec::new()) }),
            git: Arc::new(FakeGit),
            prompts: Arc::new(FakePrompts),
            llm: Arc::new(FakeLlm),
            gate,
        }
    }

    #[tokio::test]
    async fn full_run_completes_every_phase() {
        let dir = tempfile::tempdir().unwrap();
        let engine = PhaseEngine::new(dir.path(), "", make_collaborators(Arc::new(ApprovingGate)), EngineConfig::default());
        let mut task = Task::new(TaskId::parse("TASK-001").unwrap(), "Do the thing");
        let workflow = Workflow::default_sequence();

        let outcome = engine.run(&mut task, &workflow, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, EngineOutcome::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(workflow.all_done(&task.execution));
    }

    #[tokio::test]
    async fn same_phase_retry_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(RejectNTimesGate { remaining_rejections: StdMutex::new(1) });
        let engine = PhaseEngine::new(dir.path(), "", make_collaborators(gate), EngineConfig::default());
        let mut task = Task::new(TaskId::parse("TASK-001").unwrap(), "Do the thing");
        let workflow = Workflow::new(vec![crate::phase::PhaseDef::new(
            "implement",
            "implement",
            crate::phase::GatePolicy {
                kind: GateKind::Auto,
                retry_target: None,
                max_attempts: 3,
            },
        )]);

        let outcome = engine.run(&mut task, &workflow, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, EngineOutcome::Completed);
        assert_eq!(task.execution.phase("implement").unwrap().iterations, 2);
    }

    #[tokio::test]
    async fn retries_exhausted_marks_task_failed() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(RejectNTimesGate { remaining_rejections: StdMutex::new(10) });
        let engine = PhaseEngine::new(dir.path(), "", make_collaborators(gate), EngineConfig::default());
        let mut task = Task::new(TaskId::parse("TASK-001").unwrap(), "Do the thing");
        let workflow = Workflow::new(vec![crate::phase::PhaseDef::new(
            "implement",
            "implement",
            crate::phase::GatePolicy {
                kind: GateKind::Auto,
                retry_target: None,
                max_attempts: 2,
            },
        )]);

        let outcome = engine.run(&mut task, &workflow, &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, EngineOutcome::Failed);
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn guard_contention_aborts_engine() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = Task::new(TaskId::parse("TASK-001").unwrap(), "Do the thing");
        let workflow = Workflow::default_sequence();
        let engine = PhaseEngine::new(dir.path(), "", make_collaborators(Arc::new(ApprovingGate)), EngineConfig::default());

        let worktree = dir.path().join(naming::worktree_dir(&task.id, ""));
        std::fs::create_dir_all(&worktree).unwrap();
        std::fs::write(worktree.join(".orc.pid"), std::process::id().to_string()).unwrap();

        let err = engine.run(&mut task, &workflow, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OrcError::AlreadyRunning { .. }));
    }

    #[tokio::test]
    async fn cancellation_pauses_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = Task::new(TaskId::parse("TASK-001").unwrap(), "Do the thing");
        let workflow = Workflow::default_sequence();
        let engine = PhaseEngine::new(dir.path(), "", make_collaborators(Arc::new(ApprovingGate)), EngineConfig::default());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = engine.run(&mut task, &workflow, &cancel).await.unwrap();
        assert_eq!(outcome, EngineOutcome::Cancelled);
        assert_eq!(task.status, TaskStatus::Paused);
    }
}
