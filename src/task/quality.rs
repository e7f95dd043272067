//! Quality/intervention counters tracked alongside a task.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quality {
    pub phase_retries: HashMap<String, u32>,
    pub total_retries: u32,
    pub review_rejections: u32,
    pub manual_intervention: bool,
    pub manual_intervention_reason: Option<String>,
}

impl Quality {
    pub(crate) fn record_phase_retry(&mut self, phase: &str) {
        *self.phase_retries.entry(phase.to_string()).or_insert(0) += 1;
        self.total_retries += 1;
    }

    pub(crate) fn record_review_rejection(&mut self) {
        self.review_rejections += 1;
    }

    pub(crate) fn record_manual_intervention(&mut self, reason: &str) {
        self.manual_intervention = true;
        self.manual_intervention_reason = Some(reason.to_string());
    }
}
