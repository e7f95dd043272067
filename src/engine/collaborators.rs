//! External collaborators the Phase Engine drives against. Every trait
//! here is consumed, never implemented, by this crate (spec §6) — a
//! concrete git invocation, LLM provider, prompt renderer, and
//! persistence backend live outside this core.

use async_trait::async_trait;

use crate::execution::RetryContext;
use crate::errors::OrcResult;
use crate::task::{Task, TaskId};

/// Abstract persistence backend.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save_task(&self, task: &Task) -> OrcResult<()>;
    async fn load_task(&self, id: &TaskId) -> OrcResult<Task>;
    async fn load_all_tasks(&self) -> OrcResult<Vec<Task>>;
}

/// Outcome of a commit attempt; a working tree with no staged changes
/// is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(String),
    NothingToCommit,
}

/// Abstract git plumbing. No concrete implementation (e.g. `git2` or
/// shelling out) lives in this crate.
#[async_trait]
pub trait GitOps: Send + Sync {
    async fn create_branch(&self, name: &str, base: &str) -> OrcResult<()>;
    async fn create_worktree(&self, path: &str, branch: &str) -> OrcResult<()>;
    async fn remove_worktree(&self, path: &str) -> OrcResult<()>;
    async fn stage_all(&self, worktree: &str) -> OrcResult<()>;
    async fn commit(&self, worktree: &str, message: &str) -> OrcResult<CommitOutcome>;
    async fn current_branch(&self, worktree: &str) -> OrcResult<String>;
}

/// Renders a phase's prompt template against task state, including any
/// retry-context snippet.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template_id: &str, task: &Task, retry_context: Option<&RetryContext>) -> String;
}

/// The result of one LLM turn.
#[derive(Debug, Clone)]
pub struct LlmTurnResult {
    pub session_id: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub cost_usd: f64,
    pub text: String,
    /// Whether this was the final turn of the phase's turn sequence.
    pub done: bool,
}

/// Abstract LLM provider, invoked once per turn. The engine persists
/// the session id after the first turn so later turns can resume it.
#[async_trait]
pub trait LlmInvoker: Send + Sync {
    async fn invoke_turn(&self, prompt: &str, session_id: Option<&str>) -> OrcResult<LlmTurnResult>;
}
