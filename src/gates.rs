//! Gate evaluation: the decision procedure consulted after a phase's
//! LLM turn sequence completes (spec §6, "Gate evaluator (consumed)").

use async_trait::async_trait;

/// A gate's verdict on a phase's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOutcome {
    pub approved: bool,
    pub reason: String,
    /// Where to retry from if rejected and the gate names a different
    /// target phase; `None` means retry the same phase.
    pub retry_target: Option<String>,
}

impl GateOutcome {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
            retry_target: None,
        }
    }

    pub fn reject(reason: impl Into<String>, retry_target: Option<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
            retry_target,
        }
    }
}

/// External collaborator consulted to approve or reject a phase's
/// output. No concrete implementation ships with this crate; a real
/// gate evaluator backs onto a human prompt, an AI reviewer, or an
/// automatic policy.
#[async_trait]
pub trait GateEvaluator: Send + Sync {
    async fn evaluate(&self, phase: &str, output: &str) -> GateOutcome;
}
