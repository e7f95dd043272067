//! Naming (C2): deterministic mapping from (task id, executor prefix) to
//! branch name and worktree directory. Pure functions, no I/O.

use crate::task::TaskId;

/// `orc/<id>` or `orc/<id>-<executor>` if `executor` is non-empty.
pub fn branch(id: &TaskId, executor: &str) -> String {
    if executor.is_empty() {
        format!("orc/{id}")
    } else {
        format!("orc/{id}-{executor}")
    }
}

/// `branch(id, executor)` with every `/` replaced by `-`.
pub fn worktree_dir(id: &TaskId, executor: &str) -> String {
    branch(id, executor).replace('/', "-")
}

/// Inverse of [`branch`]. Recognizes both `TASK-NNN` and
/// `TASK-PREFIX-NNN` forms for the id, with an optional trailing
/// `-<executor>` suffix for the branch's own executor tag.
pub fn parse_branch(branch: &str) -> Option<(TaskId, String)> {
    let rest = branch.strip_prefix("orc/")?;

    // The id grammar is unambiguous once matched, but a *longer* token
    // run can also happen to fit it (e.g. "TASK-001-123" reparses as
    // prefix "001" / digits "123"). Try the shortest candidate first so
    // the id's own segment is consumed greedily by the executor tag
    // instead of being swallowed by a coincidentally-valid longer match.
    let parts: Vec<&str> = rest.split('-').collect();
    for split in 1..=parts.len() {
        let candidate_id = parts[..split].join("-");
        let candidate_executor = parts[split..].join("-");
        if let Ok(id) = TaskId::parse(&candidate_id) {
            return Some((id, candidate_executor));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(s: &str) -> TaskId {
        TaskId::parse(s).unwrap()
    }

    #[test]
    fn branch_without_executor() {
        assert_eq!(branch(&tid("TASK-001"), ""), "orc/TASK-001");
    }

    #[test]
    fn branch_with_executor() {
        assert_eq!(
            branch(&tid("TASK-AM-001"), "bj"),
            "orc/TASK-AM-001-bj"
        );
    }

    #[test]
    fn worktree_dir_replaces_slashes() {
        assert_eq!(
            worktree_dir(&tid("TASK-AM-001"), "bj"),
            "orc-TASK-AM-001-bj"
        );
    }

    #[test]
    fn parse_branch_round_trips_bare_id() {
        let b = branch(&tid("TASK-001"), "");
        assert_eq!(parse_branch(&b), Some((tid("TASK-001"), String::new())));
    }

    #[test]
    fn parse_branch_round_trips_prefixed_id_with_executor() {
        let b = branch(&tid("TASK-AM-001"), "bj");
        assert_eq!(parse_branch(&b), Some((tid("TASK-AM-001"), "bj".to_string())));
    }

    #[test]
    fn parse_branch_rejects_non_orc_prefix() {
        assert_eq!(parse_branch("feature/TASK-001"), None);
    }

    #[test]
    fn parse_branch_round_trips_numeric_executor() {
        // A numeric executor tag ("123") must not be swallowed into the
        // id's own digit run, even though "TASK-001-123" also happens to
        // match the TASK-PREFIX-NNN grammar on its own.
        let b = branch(&tid("TASK-001"), "123");
        assert_eq!(b, "orc/TASK-001-123");
        assert_eq!(parse_branch(&b), Some((tid("TASK-001"), "123".to_string())));
    }

    #[test]
    fn branch_naming_scenario() {
        assert_eq!(
            branch(&tid("TASK-AM-001"), "bj"),
            "orc/TASK-AM-001-bj"
        );
        assert_eq!(
            parse_branch("orc/TASK-AM-001-bj"),
            Some((tid("TASK-AM-001"), "bj".to_string()))
        );
    }
}
