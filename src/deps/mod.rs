//! Dependency resolver (C6): blockers, blocked-by, reverse references,
//! readiness, and cycle detection over the task graph.
//!
//! Mirrors the teacher's `dag::builder` graph-construction style (index
//! maps, forward/reverse edge lists, Kahn's-algorithm style cycle checks)
//! but operates over task IDs rather than phase numbers, and answers the
//! task-level questions spec.md §4.6 asks for instead of building an
//! executable graph.

use std::collections::{BTreeSet, HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::{DependencyStatus, Task, TaskId};

/// Errors from dependency validation and cycle detection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("task {0} cannot depend on itself")]
    SelfReference(TaskId),

    #[error("task {referenced} does not exist")]
    UnknownTask { referenced: TaskId },

    #[error("dependency cycle: {}", .path.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" -> "))]
    Cycle { path: Vec<TaskId> },
}

/// Pre-computed, whole-task-set dependency information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// For each task id, the set of tasks that list it in `blocked_by`.
    pub blocks: HashMap<TaskId, BTreeSet<TaskId>>,
    /// For each task id, the set of tasks whose title/description
    /// reference it without already listing it in `blocked_by`/`related_to`.
    pub referenced_by: HashMap<TaskId, BTreeSet<TaskId>>,
    /// For each task id, its currently-unmet blockers.
    pub unmet_blockers: HashMap<TaskId, BTreeSet<TaskId>>,
}

/// Matches task-id-shaped references: `TASK-` plus an alphanumeric
/// segment ending in a run of 3+ digits, word-boundary guarded.
/// A bare `TASK-1` or `TASK-12` is not considered a reference per
/// spec.md §4.6 point 2.
fn task_ref_pattern() -> &'static Regex {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bTASK-(?:[A-Z0-9]+-)?\d{3,}\b").expect("valid regex"))
}

/// Extract de-duplicated, sorted task references from free text.
pub fn extract_references(text: &str) -> Vec<TaskId> {
    let mut found: BTreeSet<String> = BTreeSet::new();
    for m in task_ref_pattern().find_iter(text) {
        found.insert(m.as_str().to_string());
    }
    found
        .into_iter()
        .filter_map(|s| TaskId::parse(&s).ok())
        .collect()
}

/// Is `blocker` considered "done" for dependency-satisfaction purposes?
fn is_done(task: &Task) -> bool {
    task.status.is_done()
}

/// Compute the full dependency graph in one O(N+E) pass.
pub fn resolve(tasks: &[Task]) -> DependencyGraph {
    let by_id: HashMap<&TaskId, &Task> = tasks.iter().map(|t| (&t.id, t)).collect();

    let mut blocks: HashMap<TaskId, BTreeSet<TaskId>> = HashMap::new();
    let mut referenced_by: HashMap<TaskId, BTreeSet<TaskId>> = HashMap::new();
    let mut unmet_blockers: HashMap<TaskId, BTreeSet<TaskId>> = HashMap::new();

    for t in tasks {
        for b in &t.blocked_by {
            blocks.entry(b.clone()).or_default().insert(t.id.clone());
        }

        let haystack = format!("{} {}", t.title, t.description);
        for r in extract_references(&haystack) {
            if r == t.id || t.blocked_by.contains(&r) || t.related_to.contains(&r) {
                continue;
            }
            referenced_by.entry(r).or_default().insert(t.id.clone());
        }

        let unmet: BTreeSet<TaskId> = t
            .blocked_by
            .iter()
            .filter(|b| match by_id.get(*b) {
                None => true,
                Some(task) => !is_done(task),
            })
            .cloned()
            .collect();
        unmet_blockers.insert(t.id.clone(), unmet);
    }

    DependencyGraph {
        blocks,
        referenced_by,
        unmet_blockers,
    }
}

impl DependencyGraph {
    pub fn blocks_of(&self, id: &TaskId) -> BTreeSet<TaskId> {
        self.blocks.get(id).cloned().unwrap_or_default()
    }

    pub fn referenced_by_of(&self, id: &TaskId) -> BTreeSet<TaskId> {
        self.referenced_by.get(id).cloned().unwrap_or_default()
    }

    pub fn unmet_blockers_of(&self, id: &TaskId) -> BTreeSet<TaskId> {
        self.unmet_blockers.get(id).cloned().unwrap_or_default()
    }

    pub fn dependency_status(&self, task: &Task) -> DependencyStatus {
        if task.blocked_by.is_empty() {
            return DependencyStatus::None;
        }
        if self
            .unmet_blockers
            .get(&task.id)
            .is_some_and(|u| !u.is_empty())
        {
            DependencyStatus::Blocked
        } else {
            DependencyStatus::Ready
        }
    }
}

/// Validate a proposed `blocked_by`/`related_to` edge set before it is
/// written onto a task: no self-references, no references to unknown ids.
pub fn validate_edges(
    id: &TaskId,
    edges: &[TaskId],
    existing_ids: &HashSet<TaskId>,
) -> Result<(), DependencyError> {
    for e in edges {
        if e == id {
            return Err(DependencyError::SelfReference(id.clone()));
        }
        if !existing_ids.contains(e) {
            return Err(DependencyError::UnknownTask {
                referenced: e.clone(),
            });
        }
    }
    Ok(())
}

/// Detect whether setting `id`'s blockers to `new_blockers` introduces a
/// cycle, treating `tasks[id].blocked_by` as overridden by `new_blockers`
/// for the purposes of this check. Pure: does not mutate `tasks`.
///
/// Returns the cycle path in the order it forms (e.g. `[A, C, B, A]`) if
/// found, or an empty vec otherwise.
pub fn detect_cycle(
    id: &TaskId,
    new_blockers: &[TaskId],
    tasks: &HashMap<TaskId, Task>,
) -> Vec<TaskId> {
    let blocked_by_of = |t: &TaskId| -> Vec<TaskId> {
        if t == id {
            new_blockers.to_vec()
        } else {
            tasks
                .get(t)
                .map(|task| task.blocked_by.iter().cloned().collect())
                .unwrap_or_default()
        }
    };

    let mut stack: Vec<TaskId> = vec![id.clone()];
    let mut on_stack: HashSet<TaskId> = HashSet::from([id.clone()]);
    let mut visited: HashSet<TaskId> = HashSet::new();

    fn dfs(
        node: &TaskId,
        blocked_by_of: &dyn Fn(&TaskId) -> Vec<TaskId>,
        stack: &mut Vec<TaskId>,
        on_stack: &mut HashSet<TaskId>,
        visited: &mut HashSet<TaskId>,
    ) -> Option<Vec<TaskId>> {
        for next in blocked_by_of(node) {
            if on_stack.contains(&next) {
                // Found the cycle: rotate stack so it starts at `next`.
                let pos = stack.iter().position(|n| n == &next).unwrap_or(0);
                let mut path: Vec<TaskId> = stack[pos..].to_vec();
                path.push(next);
                return Some(path);
            }
            if visited.contains(&next) {
                continue;
            }
            visited.insert(next.clone());
            stack.push(next.clone());
            on_stack.insert(next.clone());
            if let Some(cycle) = dfs(&next, blocked_by_of, stack, on_stack, visited) {
                return Some(cycle);
            }
            stack.pop();
            on_stack.remove(&next);
        }
        None
    }

    visited.insert(id.clone());
    for b in new_blockers {
        if on_stack.contains(b) {
            return vec![id.clone(), b.clone()];
        }
        if visited.contains(b) {
            continue;
        }
        visited.insert(b.clone());
        stack.push(b.clone());
        on_stack.insert(b.clone());
        if let Some(cycle) = dfs(b, &blocked_by_of, &mut stack, &mut on_stack, &mut visited) {
            return cycle;
        }
        stack.pop();
        on_stack.remove(b);
    }

    Vec::new()
}
