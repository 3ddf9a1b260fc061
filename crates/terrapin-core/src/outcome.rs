//! Success/failure evaluation of finished plan and apply stages.
//!
//! Both evaluators are pure functions of a run snapshot taken after the
//! stage's log stream has closed.

use terrapin_proto::{ApplyStatus, PlanStatus, Run, RunStatus};

/// Result of a finished stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    Failed { reason: String },
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Succeeded)
    }
}

/// A plan succeeded when the run reached either planned status and the plan itself finished.
pub fn evaluate_plan(run: &Run) -> StageOutcome {
    match (run.status, run.plan.status) {
        (run_status, PlanStatus::Finished) if run_status.is_planned() => StageOutcome::Succeeded,
        (run_status, plan_status) => StageOutcome::Failed {
            reason: format!("run status {run_status}, plan status {plan_status}"),
        },
    }
}

/// An apply succeeded when the run is applied and its apply stage finished.
pub fn evaluate_apply(run: &Run) -> StageOutcome {
    match (run.status, run.apply.as_ref().map(|apply| apply.status)) {
        (RunStatus::Applied, Some(ApplyStatus::Finished)) => StageOutcome::Succeeded,
        (run_status, Some(apply_status)) => StageOutcome::Failed {
            reason: format!("run status {run_status}, apply status {apply_status}"),
        },
        (run_status, None) => StageOutcome::Failed {
            reason: format!("run status {run_status}, run has no apply stage"),
        },
    }
}
