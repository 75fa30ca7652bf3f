use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engines::K8sSteadyState;
use crate::probe::ProbeResult;
use crate::rollback::RollbackStepResult;
use crate::snapshot::Snapshot;

/// One of the five ordered lifecycle stages (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SteadyState,
    Hypothesis,
    Inject,
    Observe,
    Rollback,
}

/// Monotone-forward status (I3): `pending -> running -> terminal`.
/// Terminal statuses are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    Completed,
    Failed,
    RolledBack,
    EmergencyStopped,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Failed | Status::RolledBack | Status::EmergencyStopped
        )
    }
}

/// Mutable experiment state, sealed at terminus (§3 Experiment Result).
///
/// `revision` increments on every field mutation and is the ordering key
/// the Result Projection uses to detect a stale snapshot a subscriber
/// might otherwise race against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub id: String,
    pub phase: Phase,
    pub status: Status,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steady_state: Option<K8sSteadyState>,
    pub hypothesis: Option<String>,
    pub injection_result: Option<serde_json::Value>,
    pub observations: Option<serde_json::Value>,
    pub rollback_result: Vec<RollbackStepResult>,
    pub error: Option<String>,
    pub ai_insights: serde_json::Map<String, serde_json::Value>,
    pub probe_results: Vec<ProbeResult>,
    pub snapshot: Option<Snapshot>,
    pub revision: u64,
}

impl ExperimentResult {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            phase: Phase::SteadyState,
            status: Status::Pending,
            started_at: None,
            completed_at: None,
            steady_state: None,
            hypothesis: None,
            injection_result: None,
            observations: None,
            rollback_result: Vec::new(),
            error: None,
            ai_insights: serde_json::Map::new(),
            probe_results: Vec::new(),
            snapshot: None,
            revision: 0,
        }
    }

    /// Advances phase and bumps `revision`. Does not itself check
    /// monotonicity -- the Runner is the only caller and drives a single
    /// linear path with labeled failure jumps (§9).
    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.revision += 1;
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.revision += 1;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
    }

    pub fn push_probe_results(&mut self, mut results: Vec<ProbeResult>) {
        self.probe_results.append(&mut results);
        self.revision += 1;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_result_starts_pending_at_steady_state() {
        let result = ExperimentResult::new("exp-1");
        assert_eq!(result.status, Status::Pending);
        assert_eq!(result.phase, Phase::SteadyState);
        assert_eq!(result.revision, 0);
    }

    #[test]
    fn mutations_bump_revision() {
        let mut result = ExperimentResult::new("exp-1");
        result.set_phase(Phase::Hypothesis);
        result.set_status(Status::Running);
        assert_eq!(result.revision, 2);
    }

    #[test]
    fn terminal_status_sets_completed_at() {
        let mut result = ExperimentResult::new("exp-1");
        result.set_status(Status::Completed);
        assert!(result.completed_at.is_some());
    }
}
