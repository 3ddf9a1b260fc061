//! # terrapin-proto
//!
//! Shared types, error definitions, and traits for Terrapin.
//!
//! This crate provides:
//! - Read-only copies of remote entities (workspaces, configuration versions,
//!   runs with their plan and apply stages, jobs and job logs)
//! - Closed status enumerations for every entity that carries a status
//! - The [`Backend`] trait describing the remote operations the run
//!   lifecycle consumes
//! - [`BackendError`], the error type every backend operation returns

mod backend;
mod error;
mod model;
mod status;

pub use backend::{Backend, JobLogStream, JobLogSubscription};
pub use error::{BackendError, BackendResult};
pub use model::{
    Apply, ConfigurationVersion, CreateRunInput, Job, JobLogEvent, JobLogs, Plan, Run,
    RunVariable, VariableCategory, Workspace,
};
pub use status::{ApplyStatus, ConfigurationVersionStatus, JobStatus, PlanStatus, RunStatus};
