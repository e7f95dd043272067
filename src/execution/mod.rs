//! Execution state (C5): per-task phase progress, token/cost accounting,
//! retry context, sessions, and validation history.
//!
//! Phase status is deliberately a separate, narrower enum from task
//! status — only {pending, completed, skipped} — per the design note
//! that the two must never be unioned. Running/failed/interrupted live
//! at the task level plus phase timestamps.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A phase's completion state. Never carries "running" or "failed" —
/// those are inferred from timestamps plus the owning task's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Completed,
    Skipped,
}

impl Default for PhaseStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl PhaseStatus {
    /// A phase counts as done for dependency/progress purposes iff it is
    /// completed or skipped.
    pub fn counts_done(self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

/// Token usage for one phase or the task as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cache_creation: u64,
    pub cache_read: u64,
    pub total: u64,
}

impl TokenUsage {
    fn add(&mut self, input: u64, output: u64, cache_creation: u64, cache_read: u64) {
        self.input += input;
        self.output += output;
        self.cache_creation += cache_creation;
        self.cache_read += cache_read;
        self.total += input + output;
    }

    /// `input + cache_creation + cache_read`, the effective context size
    /// billed on the next turn.
    pub fn effective_input(&self) -> u64 {
        self.input + self.cache_creation + self.cache_read
    }
}

/// One entry in a phase's ordered validation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub iteration: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub decision: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-phase execution record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseState {
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub interrupted_at: Option<DateTime<Utc>>,
    pub iterations: u32,
    pub commit_sha: Option<String>,
    pub artifacts: Vec<String>,
    pub error: Option<String>,
    pub tokens: TokenUsage,
    pub validation_history: Vec<ValidationEntry>,
    pub session_id: Option<String>,
}

/// An audit record of a gate's decision on a phase outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub phase: String,
    pub gate_type: String,
    pub approved: bool,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// The active LLM session backing the current phase's turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub model: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turn_count: u32,
}

/// Captured reason and source material for re-running from an earlier
/// phase. Always either wholly absent or wholly populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryContext {
    pub from_phase: String,
    pub to_phase: String,
    pub reason: String,
    pub failure_output: String,
    pub context_file: Option<String>,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate cost accounting: a running total plus a per-phase breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostState {
    pub total_usd: f64,
    pub phase_costs: HashMap<String, f64>,
}

/// Per-task record of phase progress, token/cost accounting, retry
/// context, sessions, and validations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionState {
    pub current_iteration: u32,
    pub phases: HashMap<String, PhaseState>,
    pub gates: Vec<GateDecision>,
    pub tokens: TokenUsage,
    pub cost: CostState,
    pub session: Option<Session>,
    pub retry_context: Option<RetryContext>,
    pub error: Option<String>,
    pub jsonl_path: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the phase state for `p`, creating it lazily (pending,
    /// zeroed tokens) on first reference.
    pub fn ensure_phase(&mut self, p: &str) -> &mut PhaseState {
        self.phases.entry(p.to_string()).or_default()
    }

    pub fn phase(&self, p: &str) -> Option<&PhaseState> {
        self.phases.get(p)
    }

    pub fn start_phase(&mut self, p: &str, now: DateTime<Utc>) {
        self.ensure_phase(p).started_at = Some(now);
    }

    pub fn complete_phase(&mut self, p: &str, commit_sha: Option<&str>, now: DateTime<Utc>) {
        let phase = self.ensure_phase(p);
        phase.status = PhaseStatus::Completed;
        phase.completed_at = Some(now);
        if let Some(sha) = commit_sha.filter(|s| !s.is_empty()) {
            phase.commit_sha = Some(sha.to_string());
        }
    }

    pub fn fail_phase(&mut self, p: &str, err: &str) {
        self.error = Some(err.to_string());
        self.ensure_phase(p).error = Some(err.to_string());
    }

    pub fn interrupt_phase(&mut self, p: &str, now: DateTime<Utc>) {
        self.ensure_phase(p).interrupted_at = Some(now);
    }

    pub fn skip_phase(&mut self, p: &str, reason: &str, now: DateTime<Utc>) {
        {
            let phase = self.ensure_phase(p);
            phase.status = PhaseStatus::Skipped;
            phase.completed_at = Some(now);
            if !reason.is_empty() {
                phase.error = Some(format!("skipped: {reason}"));
            }
        }
        self.record_gate_decision(p, "skip", true, reason, now);
    }

    pub fn reset_phase(&mut self, p: &str) {
        let phase = self.ensure_phase(p);
        phase.status = PhaseStatus::Pending;
        phase.error = None;
        phase.completed_at = None;
        phase.interrupted_at = None;
        phase.session_id = None;
    }

    pub fn reset_all(&mut self) {
        for phase in self.phases.values_mut() {
            *phase = PhaseState::default();
        }
        self.current_iteration = 0;
        self.error = None;
        self.retry_context = None;
        self.session = None;
        self.gates.clear();
    }

    pub fn increment_iteration(&mut self, current_phase: &str) {
        self.current_iteration += 1;
        self.ensure_phase(current_phase).iterations += 1;
    }

    pub fn add_tokens(
        &mut self,
        current_phase: &str,
        input: u64,
        output: u64,
        cache_creation: u64,
        cache_read: u64,
    ) {
        self.tokens.add(input, output, cache_creation, cache_read);
        self.ensure_phase(current_phase)
            .tokens
            .add(input, output, cache_creation, cache_read);
    }

    pub fn record_gate_decision(
        &mut self,
        phase: &str,
        gate_type: &str,
        approved: bool,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        self.gates.push(GateDecision {
            phase: phase.to_string(),
            gate_type: gate_type.to_string(),
            approved,
            reason: reason.to_string(),
            timestamp: now,
        });
    }

    pub fn set_retry_context(
        &mut self,
        from: &str,
        to: &str,
        reason: &str,
        failure_output: &str,
        attempt: u32,
        now: DateTime<Utc>,
    ) {
        self.retry_context = Some(RetryContext {
            from_phase: from.to_string(),
            to_phase: to.to_string(),
            reason: reason.to_string(),
            failure_output: failure_output.to_string(),
            context_file: None,
            attempt,
            timestamp: now,
        });
    }

    pub fn set_retry_context_file(&mut self, path: &str) {
        if let Some(ctx) = self.retry_context.as_mut() {
            ctx.context_file = Some(path.to_string());
        }
    }

    pub fn clear_retry_context(&mut self) {
        self.retry_context = None;
    }

    pub fn set_session(&mut self, id: &str, model: &str, status: &str, turn_count: u32, now: DateTime<Utc>) {
        match self.session.as_mut() {
            Some(session) => {
                session.id = id.to_string();
                session.model = model.to_string();
                session.status = status.to_string();
                session.turn_count = turn_count;
                session.last_activity = now;
            }
            None => {
                self.session = Some(Session {
                    id: id.to_string(),
                    model: model.to_string(),
                    status: status.to_string(),
                    created_at: now,
                    last_activity: now,
                    turn_count,
                });
            }
        }
    }

    pub fn record_validation(&mut self, p: &str, entry: ValidationEntry) {
        self.ensure_phase(p).validation_history.push(entry);
    }

    pub fn add_cost(&mut self, current_phase: &str, usd: f64, now: DateTime<Utc>) {
        self.cost.total_usd += usd;
        if !current_phase.is_empty() {
            *self.cost.phase_costs.entry(current_phase.to_string()).or_insert(0.0) += usd;
        }
        self.last_updated_at = Some(now);
    }
}
