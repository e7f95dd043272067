//! Task identifiers: a validated newtype over the `TASK-NNN` /
//! `TASK-PREFIX-NNN` grammar from spec §6.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::OrcError;

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^TASK-(?:([A-Z0-9]+)-)?(\d{3,})$").expect("valid regex"))
}

/// A globally-unique, immutable task identifier, normalized so the
/// prefix segment (if present) is always uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Parse and normalize either `TASK-NNN` or `TASK-PREFIX-NNN`.
    pub fn parse(raw: &str) -> Result<Self, OrcError> {
        let caps = grammar()
            .captures(raw)
            .ok_or_else(|| OrcError::config(format!("invalid task id: {raw}")))?;
        let digits = &caps[2];
        let normalized = match caps.get(1) {
            Some(prefix) => format!("TASK-{}-{digits}", prefix.as_str().to_uppercase()),
            None => format!("TASK-{digits}"),
        };
        Ok(Self(normalized))
    }

    /// Build an id from an already-normalized prefix key and sequence
    /// number, zero-padded to three digits. `prefix_key` of `"_solo"` or
    /// empty produces the bare `TASK-NNN` form.
    pub fn format(prefix_key: &str, n: u64) -> Self {
        if prefix_key.is_empty() || prefix_key == "_solo" {
            Self(format!("TASK-{n:03}"))
        } else {
            Self(format!("TASK-{}-{n:03}", prefix_key.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The prefix segment, if any, e.g. `"AM"` for `TASK-AM-001`.
    pub fn prefix(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("TASK-")?;
        let (prefix, _digits) = rest.rsplit_once('-')?;
        Some(prefix)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_form() {
        let id = TaskId::parse("TASK-001").unwrap();
        assert_eq!(id.as_str(), "TASK-001");
        assert_eq!(id.prefix(), None);
    }

    #[test]
    fn parses_and_uppercases_prefixed_form() {
        let id = TaskId::parse("task-am-001").unwrap();
        assert_eq!(id.as_str(), "TASK-AM-001");
        assert_eq!(id.prefix(), Some("AM"));
    }

    #[test]
    fn rejects_short_numeric_run() {
        assert!(TaskId::parse("TASK-01").is_err());
        assert!(TaskId::parse("TASK-AM-01").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(TaskId::parse("not-a-task-id").is_err());
        assert!(TaskId::parse("TASK-").is_err());
    }

    #[test]
    fn format_zero_pads_and_handles_solo() {
        assert_eq!(TaskId::format("", 3).as_str(), "TASK-003");
        assert_eq!(TaskId::format("_solo", 3).as_str(), "TASK-003");
        assert_eq!(TaskId::format("am", 12).as_str(), "TASK-AM-012");
    }
}
