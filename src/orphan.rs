//! Orphan Detector (C8): classifies running tasks whose executor process
//! has vanished.

use chrono::{DateTime, Duration, Utc};

use crate::task::{Task, TaskStatus};

/// Default threshold past which a stale heartbeat changes the orphan
/// reason text (spec §4.8).
pub const DEFAULT_STALE_THRESHOLD_MINUTES: i64 = 15;

fn is_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Why a task was classified as orphaned. `None` means the task is
/// healthy (or not running at all).
pub fn classify(task: &Task, now: DateTime<Utc>, stale_threshold_minutes: i64) -> Option<String> {
    if task.status != TaskStatus::Running {
        return None;
    }

    if task.executor_pid == 0 {
        return Some("no execution info".to_string());
    }

    if is_alive(task.executor_pid) {
        // A live PID is never orphaned, regardless of heartbeat age —
        // this avoids false positives during long LLM turns.
        return None;
    }

    let stale = task
        .last_heartbeat
        .is_some_and(|hb| now - hb > Duration::minutes(stale_threshold_minutes));

    if stale {
        Some("executor process not running (heartbeat stale)".to_string())
    } else {
        Some("executor process not running".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskId;

    fn running_task(pid: i32, heartbeat: Option<DateTime<Utc>>) -> Task {
        let mut t = Task::new_at(TaskId::parse("TASK-001").unwrap(), "x", Utc::now());
        t.status = TaskStatus::Running;
        t.executor_pid = pid;
        t.last_heartbeat = heartbeat;
        t
    }

    #[test]
    fn no_execution_info_when_pid_zero() {
        let t = running_task(0, None);
        let reason = classify(&t, Utc::now(), DEFAULT_STALE_THRESHOLD_MINUTES).unwrap();
        assert_eq!(reason, "no execution info");
    }

    #[test]
    fn live_pid_never_orphaned_even_with_stale_heartbeat() {
        let now = Utc::now();
        let pid = std::process::id() as i32;
        let t = running_task(pid, Some(now - Duration::minutes(30)));
        assert!(classify(&t, now, DEFAULT_STALE_THRESHOLD_MINUTES).is_none());
    }

    #[test]
    fn dead_pid_with_stale_heartbeat_mentions_heartbeat() {
        let now = Utc::now();
        let t = running_task(999_999, Some(now - Duration::minutes(20)));
        let reason = classify(&t, now, DEFAULT_STALE_THRESHOLD_MINUTES).unwrap();
        assert!(reason.contains("heartbeat stale"));
    }

    #[test]
    fn dead_pid_without_stale_heartbeat_omits_heartbeat() {
        let now = Utc::now();
        let t = running_task(999_999, Some(now - Duration::minutes(1)));
        let reason = classify(&t, now, DEFAULT_STALE_THRESHOLD_MINUTES).unwrap();
        assert_eq!(reason, "executor process not running");
    }

    #[test]
    fn dead_pid_without_heartbeat_omits_heartbeat() {
        let now = Utc::now();
        let t = running_task(999_999, None);
        let reason = classify(&t, now, DEFAULT_STALE_THRESHOLD_MINUTES).unwrap();
        assert_eq!(reason, "executor process not running");
    }

    #[test]
    fn non_running_task_is_never_orphaned() {
        let mut t = running_task(0, None);
        t.status = TaskStatus::Paused;
        assert!(classify(&t, Utc::now(), DEFAULT_STALE_THRESHOLD_MINUTES).is_none());
    }
}
