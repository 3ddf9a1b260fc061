//! Apply stage orchestration.
//!
//! After a successful plan the orchestrator walks a small state machine:
//!
//! ```text
//! PlannedNoChanges                                  (terminal, success)
//! SkippedNoInput                                    (terminal, success)
//! AwaitingApproval -> Declined                      (terminal, success)
//! AwaitingApproval -> Approved -> Applying -> ApplySucceeded | ApplyFailed
//! ```
//!
//! Once an apply is submitted nothing here cancels it; only the backend can.

use terrapin_proto::{Backend, JobLogSubscription, Run, RunStatus};
use tracing::{debug, info};

use crate::console::Console;
use crate::error::RunError;
use crate::logs::{LogFormat, stream_job_logs};
use crate::outcome::{StageOutcome, evaluate_apply};
use crate::wait::WaitBudget;

/// The only answer that approves an apply.
const APPROVAL: &str = "yes";

/// How the caller wants the apply stage gated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Apply without asking.
    pub auto_approve: bool,
    /// Whether the user may be prompted. Without input and without
    /// `auto_approve` the apply is skipped.
    pub input: bool,
    pub comment: Option<String>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            auto_approve: false,
            input: true,
            comment: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStage {
    /// The plan found nothing to change.
    PlannedNoChanges,
    /// Input is disabled and the apply was not forced.
    SkippedNoInput,
    AwaitingApproval,
    Approved,
    Declined,
    Applying { job_id: String },
    ApplySucceeded,
    ApplyFailed { reason: String },
}

impl ApplyStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ApplyStage::PlannedNoChanges
                | ApplyStage::SkippedNoInput
                | ApplyStage::Declined
                | ApplyStage::ApplySucceeded
                | ApplyStage::ApplyFailed { .. }
        )
    }

    /// Every terminal stage except a failed apply counts as success.
    pub fn is_success(&self) -> bool {
        self.is_terminal() && !matches!(self, ApplyStage::ApplyFailed { .. })
    }
}

/// Drives a planned run through approval and apply.
pub struct ApplyOrchestrator<'a> {
    backend: &'a dyn Backend,
    options: &'a ApplyOptions,
}

impl<'a> ApplyOrchestrator<'a> {
    pub fn new(backend: &'a dyn Backend, options: &'a ApplyOptions) -> Self {
        Self { backend, options }
    }

    /// Runs the state machine for `planned` and returns its terminal stage.
    ///
    /// `planned` must be the snapshot taken after the plan stage finished.
    pub async fn run(
        &self,
        planned: &Run,
        console: &mut dyn Console,
        budget: &WaitBudget,
    ) -> Result<ApplyStage, RunError> {
        let mut stage = self.entry_stage(planned);
        loop {
            debug!(run_id = %planned.id, stage = ?stage, "Apply stage");
            stage = match stage {
                ApplyStage::AwaitingApproval => self.approve(planned, console)?,
                ApplyStage::Approved => self.submit(planned, budget).await?,
                ApplyStage::Applying { job_id } => {
                    self.follow(planned, job_id, console, budget).await?
                }
                terminal => {
                    announce(&terminal, console);
                    return Ok(terminal);
                }
            };
        }
    }

    fn entry_stage(&self, planned: &Run) -> ApplyStage {
        if planned.status == RunStatus::PlannedAndFinished {
            return ApplyStage::PlannedNoChanges;
        }
        if !self.options.input && !self.options.auto_approve {
            return ApplyStage::SkippedNoInput;
        }
        ApplyStage::AwaitingApproval
    }

    fn approve(&self, planned: &Run, console: &mut dyn Console) -> Result<ApplyStage, RunError> {
        if self.options.auto_approve {
            info!(run_id = %planned.id, "Apply auto-approved");
            return Ok(ApplyStage::Approved);
        }

        let question = if planned.is_destroy {
            format!(
                "Do you really want to destroy all resources in workspace {}?\n  Only 'yes' will be accepted to confirm.\n\n  Enter a value: ",
                planned.workspace_path
            )
        } else {
            "Do you want to perform these actions?\n  Only 'yes' will be accepted to approve.\n\n  Enter a value: "
                .to_string()
        };
        let answer = console.prompt(&question).map_err(RunError::Prompt)?;

        if answer == APPROVAL {
            Ok(ApplyStage::Approved)
        } else {
            Ok(ApplyStage::Declined)
        }
    }

    async fn submit(&self, planned: &Run, budget: &WaitBudget) -> Result<ApplyStage, RunError> {
        let run = budget
            .guard(
                "apply request",
                self.backend.apply_run(&planned.id, self.options.comment.as_deref()),
            )
            .await??;

        let apply = run.apply.ok_or_else(|| {
            RunError::UnexpectedState(format!(
                "apply request for run {} returned no apply stage",
                planned.id
            ))
        })?;
        let job_id = apply.current_job_id.ok_or_else(|| {
            RunError::UnexpectedState(format!("apply {} has no job", apply.id))
        })?;

        info!(run_id = %planned.id, apply_id = %apply.id, job_id = %job_id, "Apply submitted");
        Ok(ApplyStage::Applying { job_id })
    }

    async fn follow(
        &self,
        planned: &Run,
        job_id: String,
        console: &mut dyn Console,
        budget: &WaitBudget,
    ) -> Result<ApplyStage, RunError> {
        let subscription = JobLogSubscription {
            job_id,
            run_id: planned.id.clone(),
            workspace_path: planned.workspace_path.clone(),
            last_seen_size: 0,
        };
        let events = budget
            .guard(
                "apply job log subscription",
                self.backend.subscribe_job_logs(&subscription),
            )
            .await??;
        stream_job_logs(events, console, LogFormat::Lines, budget, "apply job logs").await?;

        let run = budget
            .guard("apply status", self.backend.get_run(&planned.id))
            .await??;
        Ok(match evaluate_apply(&run) {
            StageOutcome::Succeeded => ApplyStage::ApplySucceeded,
            StageOutcome::Failed { reason } => ApplyStage::ApplyFailed { reason },
        })
    }
}

fn announce(stage: &ApplyStage, console: &mut dyn Console) {
    match stage {
        ApplyStage::PlannedNoChanges => console.print("No changes. Nothing to apply."),
        ApplyStage::SkippedNoInput => {
            console.print("Input is disabled; skipping apply. Use --auto-approve to apply.");
        }
        ApplyStage::Declined => console.print("Apply cancelled."),
        ApplyStage::ApplySucceeded => console.print("Apply complete."),
        _ => {}
    }
}
