//! Local copies of remote entities.
//!
//! The backend owns every one of these records. The client only ever reads
//! them, either by polling or from a pushed event, and never keeps them past
//! a single command invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::status::{ApplyStatus, ConfigurationVersionStatus, JobStatus, PlanStatus, RunStatus};

/// A workspace in the remote group hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    pub full_path: String,
    #[serde(default)]
    pub terraform_version: Option<String>,
}

/// An uploaded, checksummed snapshot of a configuration directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationVersion {
    pub id: String,
    pub workspace_id: String,
    pub speculative: bool,
    pub status: ConfigurationVersionStatus,
}

/// Which environment a run variable is exposed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableCategory {
    Terraform,
    Environment,
}

impl fmt::Display for VariableCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableCategory::Terraform => write!(f, "terraform"),
            VariableCategory::Environment => write!(f, "environment"),
        }
    }
}

/// A variable sent along with a run.
///
/// When `hcl` is set the value is an HCL expression (list, map, number...)
/// rather than a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunVariable {
    pub key: String,
    pub value: String,
    pub hcl: bool,
    pub category: VariableCategory,
}

impl RunVariable {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        hcl: bool,
        category: VariableCategory,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            hcl,
            category,
        }
    }
}

/// Plan stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub has_changes: bool,
    #[serde(default)]
    pub current_job_id: Option<String>,
}

/// Apply stage of a run. Absent until an apply has been requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apply {
    pub id: String,
    pub status: ApplyStatus,
    #[serde(default)]
    pub current_job_id: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// One plan-then-optionally-apply cycle against a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub workspace_id: String,
    pub workspace_path: String,
    pub status: RunStatus,
    #[serde(default)]
    pub is_destroy: bool,
    #[serde(default)]
    pub configuration_version_id: Option<String>,
    #[serde(default)]
    pub module_source: Option<String>,
    #[serde(default)]
    pub module_version: Option<String>,
    pub plan: Plan,
    #[serde(default)]
    pub apply: Option<Apply>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Request body for creating a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRunInput {
    pub workspace_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration_version_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_version: Option<String>,
    pub variables: Vec<RunVariable>,
    pub is_destroy: bool,
    pub speculative: bool,
    pub target_addresses: Vec<String>,
    pub refresh: bool,
    pub refresh_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terraform_version: Option<String>,
}

/// A job executing a plan or apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
}

/// Result of a ranged log read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogs {
    /// Offset the returned text starts at.
    pub offset: u64,
    /// Total log size known to the backend at read time.
    pub size: u64,
    pub logs: String,
}

/// A chunk of job log text, either pushed by the backend or produced by
/// tailing ranged reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogEvent {
    /// Log size after this chunk.
    pub size: u64,
    pub logs: String,
}
