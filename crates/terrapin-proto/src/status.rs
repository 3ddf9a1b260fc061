//! Status vocabularies for remote entities.
//!
//! The backend reports statuses as snake_case strings. Each entity gets its
//! own closed enumeration so an unknown value fails to decode instead of
//! silently falling through a string comparison.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    PlanQueued,
    Planning,
    /// Plan finished and produced changes that can be applied.
    Planned,
    /// Plan finished without changes; there is nothing to apply.
    PlannedAndFinished,
    ApplyQueued,
    Applying,
    Applied,
    Canceled,
    Errored,
}

impl RunStatus {
    /// Returns true for both "planned" variants.
    pub fn is_planned(self) -> bool {
        matches!(self, RunStatus::Planned | RunStatus::PlannedAndFinished)
    }

    /// Returns true once the run can no longer change on its own.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::PlannedAndFinished
                | RunStatus::Applied
                | RunStatus::Canceled
                | RunStatus::Errored
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::PlanQueued => "plan_queued",
            RunStatus::Planning => "planning",
            RunStatus::Planned => "planned",
            RunStatus::PlannedAndFinished => "planned_and_finished",
            RunStatus::ApplyQueued => "apply_queued",
            RunStatus::Applying => "applying",
            RunStatus::Applied => "applied",
            RunStatus::Canceled => "canceled",
            RunStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the plan stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Queued,
    Running,
    Finished,
    Canceled,
    Errored,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Queued => "queued",
            PlanStatus::Running => "running",
            PlanStatus::Finished => "finished",
            PlanStatus::Canceled => "canceled",
            PlanStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the apply stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Created,
    Pending,
    Queued,
    Running,
    Finished,
    Canceled,
    Errored,
}

impl ApplyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStatus::Created => "created",
            ApplyStatus::Pending => "pending",
            ApplyStatus::Queued => "queued",
            ApplyStatus::Running => "running",
            ApplyStatus::Finished => "finished",
            ApplyStatus::Canceled => "canceled",
            ApplyStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an uploaded configuration version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationVersionStatus {
    Pending,
    Uploaded,
    Errored,
}

impl ConfigurationVersionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigurationVersionStatus::Pending => "pending",
            ConfigurationVersionStatus::Uploaded => "uploaded",
            ConfigurationVersionStatus::Errored => "errored",
        }
    }
}

impl fmt::Display for ConfigurationVersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the job executing a plan or apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Pending,
    Running,
    Finished,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        self == JobStatus::Finished
    }
}
