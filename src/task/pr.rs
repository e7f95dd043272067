//! Pull-request linkage carried on a task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    PendingReview,
    Approved,
    ChangesRequested,
    Merged,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrRecord {
    pub url: String,
    pub number: u64,
    pub status: PrStatus,
    pub merged: bool,
    pub merged_at: Option<DateTime<Utc>>,
    pub target_branch: Option<String>,
    pub checks_status: Option<String>,
    pub mergeable: Option<bool>,
    pub review_count: u32,
    pub approval_count: u32,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl PrRecord {
    pub(crate) fn new(url: &str, number: u64) -> Self {
        Self {
            url: url.to_string(),
            number,
            status: PrStatus::PendingReview,
            merged: false,
            merged_at: None,
            target_branch: None,
            checks_status: None,
            mergeable: None,
            review_count: 0,
            approval_count: 0,
            last_checked_at: None,
        }
    }
}

/// Per-task overrides applied when a PR is opened for this task, rather
/// than the repository-wide defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrOverrides {
    pub labels: Vec<String>,
    pub reviewers: Vec<String>,
    pub draft: bool,
}
