//! Command entry points: `plan`, `apply`, `destroy`, and `cancel`.
//!
//! Each entry point writes its output to the console as it goes and returns
//! only an exit status. Errors are rendered once, here.

use std::sync::Arc;

use terrapin_proto::Backend;
use tracing::{info, warn};

use crate::apply::{ApplyOptions, ApplyOrchestrator, ApplyStage};
use crate::config::RunSettings;
use crate::console::Console;
use crate::error::RunError;
use crate::outcome::StageOutcome;
use crate::run::{RunCreator, RunRequest};
use crate::wait::WaitBudget;

/// Process exit status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// Runs lifecycle commands against one backend for one invocation.
pub struct Lifecycle<C: Console> {
    backend: Arc<dyn Backend>,
    settings: RunSettings,
    budget: WaitBudget,
    console: C,
}

impl<C: Console> Lifecycle<C> {
    pub fn new(
        backend: Arc<dyn Backend>,
        settings: RunSettings,
        budget: WaitBudget,
        console: C,
    ) -> Self {
        Self {
            backend,
            settings,
            budget,
            console,
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    /// Creates a speculative run and follows its plan.
    pub async fn plan(&mut self, mut request: RunRequest) -> ExitStatus {
        request.speculative = true;
        let result = self.run_plan(&request).await;
        self.finish(result)
    }

    /// Plans and, once approved, applies.
    pub async fn apply(&mut self, mut request: RunRequest, options: &ApplyOptions) -> ExitStatus {
        request.speculative = false;
        let result = self.run_apply(&request, options).await;
        self.finish(result)
    }

    /// Plans a destroy run and, once approved, applies it.
    pub async fn destroy(&mut self, mut request: RunRequest, options: &ApplyOptions) -> ExitStatus {
        request.is_destroy = true;
        self.apply(request, options).await
    }

    /// Cancels a queued or running run.
    pub async fn cancel(&mut self, run_id: &str, force: bool) -> ExitStatus {
        let cancelled = self
            .budget
            .guard("run cancellation", self.backend.cancel_run(run_id, force))
            .await
            .and_then(|res| res.map_err(RunError::from));
        let run = match cancelled {
            Ok(run) => run,
            Err(e) => return self.finish(Err(e)),
        };

        info!(run_id = %run.id, status = %run.status, force, "Cancel requested");
        let message = if run.status.is_terminal() {
            format!("Run {} is {}", run.id, run.status)
        } else {
            format!(
                "Run {} cancellation requested; status is now {}",
                run.id, run.status
            )
        };
        self.console.print(&message);
        ExitStatus::Success
    }

    async fn run_plan(&mut self, request: &RunRequest) -> Result<(), RunError> {
        let planned = RunCreator::new(Arc::clone(&self.backend), &self.settings)
            .create(request, &mut self.console, &self.budget)
            .await?;
        match planned.outcome {
            StageOutcome::Succeeded => {
                self.console
                    .print(&format!("Plan finished with status {}", planned.run.status));
                Ok(())
            }
            StageOutcome::Failed { reason } => Err(RunError::StageFailed {
                stage: "plan",
                reason,
            }),
        }
    }

    async fn run_apply(
        &mut self,
        request: &RunRequest,
        options: &ApplyOptions,
    ) -> Result<(), RunError> {
        let planned = RunCreator::new(Arc::clone(&self.backend), &self.settings)
            .create(request, &mut self.console, &self.budget)
            .await?;
        if let StageOutcome::Failed { reason } = planned.outcome {
            return Err(RunError::StageFailed {
                stage: "plan",
                reason,
            });
        }

        let stage = ApplyOrchestrator::new(self.backend.as_ref(), options)
            .run(&planned.run, &mut self.console, &self.budget)
            .await?;
        match stage {
            ApplyStage::ApplyFailed { reason } => Err(RunError::StageFailed {
                stage: "apply",
                reason,
            }),
            _ => Ok(()),
        }
    }

    fn finish(&mut self, result: Result<(), RunError>) -> ExitStatus {
        match result {
            Ok(()) => ExitStatus::Success,
            Err(e) => {
                let transient = matches!(&e, RunError::Backend(err) if err.is_transient());
                warn!(local = e.is_local(), transient, "Command failed: {}", e);
                self.console.error(&e.to_string());
                ExitStatus::Failure
            }
        }
    }
}
