//! Phase and workflow definitions: an ordered list of phases, each
//! carrying a gate policy and a prompt template id, that the Phase
//! Engine drives a task through.

use serde::{Deserialize, Serialize};

use crate::execution::{ExecutionState, PhaseStatus};

/// How a phase's outcome is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    /// Approved without review once the LLM turn sequence completes.
    Auto,
    /// Requires a human decision via the gate evaluator.
    Human,
    /// Requires an AI reviewer's decision via the gate evaluator.
    Ai,
    /// Always skipped; never runs the phase body.
    Skip,
}

/// A phase's retry policy: where to send a rejected run, and how many
/// attempts remain before the task fails outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatePolicy {
    pub kind: GateKind,
    /// Phase to retry into on rejection; `None` means retry in place.
    pub retry_target: Option<String>,
    pub max_attempts: u32,
}

impl GatePolicy {
    pub fn auto() -> Self {
        Self {
            kind: GateKind::Auto,
            retry_target: None,
            max_attempts: 1,
        }
    }

    pub fn skip() -> Self {
        Self {
            kind: GateKind::Skip,
            retry_target: None,
            max_attempts: 1,
        }
    }
}

/// One named step in a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDef {
    pub id: String,
    pub prompt_template_id: String,
    pub gate: GatePolicy,
}

impl PhaseDef {
    pub fn new(id: impl Into<String>, prompt_template_id: impl Into<String>, gate: GatePolicy) -> Self {
        Self {
            id: id.into(),
            prompt_template_id: prompt_template_id.into(),
            gate,
        }
    }
}

/// An ordered sequence of phases a task is driven through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub phases: Vec<PhaseDef>,
}

impl Workflow {
    pub fn new(phases: Vec<PhaseDef>) -> Self {
        Self { phases }
    }

    /// The default plan→implement→review→test→finalize sequence named
    /// in spec §1, with a human review gate and auto-approved
    /// implement/test/finalize steps.
    pub fn default_sequence() -> Self {
        Self::new(vec![
            PhaseDef::new("plan", "plan", GatePolicy::auto()),
            PhaseDef::new("implement", "implement", GatePolicy::auto()),
            PhaseDef::new(
                "review",
                "review",
                GatePolicy {
                    kind: GateKind::Human,
                    retry_target: Some("implement".to_string()),
                    max_attempts: 3,
                },
            ),
            PhaseDef::new("test", "test", GatePolicy::auto()),
            PhaseDef::new("finalize", "finalize", GatePolicy::auto()),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&PhaseDef> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }

    /// The phase to resume at: `task.current_phase` if set and not yet
    /// completed/skipped, else the first phase that isn't.
    pub fn resume_point(&self, current_phase: Option<&str>, execution: &ExecutionState) -> Option<&PhaseDef> {
        if let Some(current) = current_phase {
            if let Some(phase) = self.get(current) {
                let done = execution
                    .phase(current)
                    .is_some_and(|p| p.status.counts_done());
                if !done {
                    return Some(phase);
                }
            }
        }
        self.phases.iter().find(|p| {
            !execution
                .phase(&p.id)
                .map(|s| s.status.counts_done())
                .unwrap_or(false)
        })
    }

    pub fn all_done(&self, execution: &ExecutionState) -> bool {
        self.phases.iter().all(|p| {
            execution
                .phase(&p.id)
                .map(|s| s.status == PhaseStatus::Completed || s.status == PhaseStatus::Skipped)
                .unwrap_or(false)
        })
    }
}
