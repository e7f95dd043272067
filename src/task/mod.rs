//! Task Model (C4): the canonical task entity — status, metadata,
//! quality metrics, PR linkage, and dependency edges.

mod id;
mod pr;
mod quality;

pub use id::TaskId;
pub use pr::{PrOverrides, PrRecord, PrStatus};
pub use quality::Quality;

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionState;
use crate::naming;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Classifying,
    Planned,
    Running,
    Paused,
    Blocked,
    Finalizing,
    Completed,
    Failed,
    Resolved,
}

impl TaskStatus {
    /// "Done" for dependency satisfaction purposes: completed or resolved.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Resolved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Resolved)
    }

    pub fn can_run(self) -> bool {
        matches!(self, Self::Created | Self::Planned | Self::Paused | Self::Blocked)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Feature,
    Bug,
    Refactor,
    Chore,
    Docs,
    Test,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    Trivial,
    Small,
    Medium,
    Large,
    Greenfield,
}

/// Declared in scheduling order: critical sorts before high, before
/// normal, before low (spec §4.9's "priority critical<high<normal<low").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    Active,
    Backlog,
}

/// Derived, never stored: recomputed by the dependency resolver in one
/// O(N+E) sweep over the whole task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyStatus {
    None,
    Ready,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub weight: Weight,
    pub priority: Priority,
    pub queue: Queue,
    pub status: TaskStatus,
    pub branch: String,
    pub blocked_by: BTreeSet<TaskId>,
    pub related_to: BTreeSet<TaskId>,
    pub current_phase: Option<String>,
    pub executor_pid: i32,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub pr: Option<PrRecord>,
    pub quality: Quality,
    pub testing_requirements: Option<String>,
    pub requires_ui_testing: bool,
    pub initiative_id: Option<String>,
    pub workflow_id: Option<String>,
    pub target_branch: Option<String>,
    pub pr_overrides: PrOverrides,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub execution: ExecutionState,
}

impl Task {
    /// `new(id, title)`: status=created, queue=active, priority=normal,
    /// category=feature, branch=`orc/<id>`, timestamps=now.
    pub fn new(id: TaskId, title: impl Into<String>) -> Self {
        Self::new_at(id, title, Utc::now())
    }

    /// Same as [`Task::new`] but with an explicit `now`, for
    /// deterministic tests.
    pub fn new_at(id: TaskId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        let branch = naming::branch(&id, "");
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: Category::Feature,
            weight: Weight::Medium,
            priority: Priority::Normal,
            queue: Queue::Active,
            status: TaskStatus::Created,
            branch,
            blocked_by: BTreeSet::new(),
            related_to: BTreeSet::new(),
            current_phase: None,
            executor_pid: 0,
            last_heartbeat: None,
            pr: None,
            quality: Quality::default(),
            testing_requirements: None,
            requires_ui_testing: false,
            initiative_id: None,
            workflow_id: None,
            target_branch: None,
            pr_overrides: PrOverrides::default(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            execution: ExecutionState::new(),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn mark_started(&mut self) {
        self.mark_started_at(Utc::now());
    }

    pub fn mark_started_at(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.touch(now);
    }

    pub fn mark_completed(&mut self) {
        self.mark_completed_at(Utc::now());
    }

    pub fn mark_completed_at(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.completed_at = Some(now);
        self.touch(now);
    }

    pub fn mark_failed(&mut self) {
        self.mark_failed_at(Utc::now());
    }

    pub fn mark_failed_at(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.completed_at = Some(now);
        self.touch(now);
    }

    /// Convenience used widely by tests that only care about dependency
    /// satisfaction, not the full lifecycle: mark this task "done".
    pub fn mark_completed_for_deps(&mut self) {
        self.mark_completed();
    }

    pub fn set_pr_info(&mut self, url: impl Into<String>, number: u64) {
        self.set_pr_info_at(url, number, Utc::now());
    }

    pub fn set_pr_info_at(&mut self, url: impl Into<String>, number: u64, now: DateTime<Utc>) {
        let url = url.into();
        match self.pr.as_mut() {
            Some(existing) => {
                existing.url = url;
                existing.number = number;
            }
            None => {
                self.pr = Some(PrRecord::new(&url, number));
            }
        }
        self.touch(now);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_pr_status(
        &mut self,
        status: PrStatus,
        checks_status: Option<String>,
        mergeable: Option<bool>,
        review_count: u32,
        approval_count: u32,
        now: DateTime<Utc>,
    ) {
        if let Some(pr) = self.pr.as_mut() {
            pr.status = status;
            pr.checks_status = checks_status;
            pr.mergeable = mergeable;
            pr.review_count = review_count;
            pr.approval_count = approval_count;
            pr.last_checked_at = Some(now);
        }
        self.touch(now);
    }

    pub fn set_merged_info(&mut self, target_branch: impl Into<String>, now: DateTime<Utc>) {
        if let Some(pr) = self.pr.as_mut() {
            pr.merged = true;
            pr.merged_at = Some(now);
            pr.status = PrStatus::Merged;
            pr.target_branch = Some(target_branch.into());
        }
        self.touch(now);
    }

    pub fn has_pr(&self) -> bool {
        self.pr.as_ref().is_some_and(|pr| !pr.url.is_empty())
    }

    pub fn record_phase_retry(&mut self, phase: &str) {
        self.quality.record_phase_retry(phase);
        self.touch(Utc::now());
    }

    pub fn record_review_rejection(&mut self) {
        self.quality.record_review_rejection();
        self.touch(Utc::now());
    }

    pub fn record_manual_intervention(&mut self, reason: &str) {
        self.quality.record_manual_intervention(reason);
        self.touch(Utc::now());
    }
}
