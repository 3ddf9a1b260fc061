//! # terrapin-core
//!
//! Run lifecycle orchestration for the Terrapin client.
//!
//! This crate provides:
//! - Variable resolution across flags, variable files, and discovered `.tfvars`
//! - Packaging of configuration directories into checksummed archives
//! - Configuration version upload and processing wait
//! - Run creation with plan log streaming and outcome evaluation
//! - The apply stage state machine with user approval gating
//! - Settings file and profile resolution
//! - Deadlines and cancellation for every blocking wait

mod apply;
mod config;
mod console;
mod error;
mod lifecycle;
mod logs;
mod outcome;
mod packager;
mod run;
mod upload;
mod variables;
mod wait;

#[cfg(test)]
mod test_support;

pub use apply::{ApplyOptions, ApplyOrchestrator, ApplyStage};
pub use config::{
    ConfigError, KEYRING_SERVICE, Profile, ProfileEnv, ResolvedProfile, RunConfig, RunSettings,
    TerrapinConfig, keychain_token,
};
pub use console::{Console, StdConsole};
pub use error::RunError;
pub use lifecycle::{ExitStatus, Lifecycle};
pub use logs::{LogFormat, stream_job_logs, tail_job_logs};
pub use outcome::{StageOutcome, evaluate_apply, evaluate_plan};
pub use packager::{
    ConfigurationPackage, PackageError, checksum_file, package_directory, validate_directory,
};
pub use run::{PlannedRun, RunCreator, RunRequest};
pub use upload::ConfigurationVersionUploader;
pub use variables::{ResolvedVariables, VariableError, VariableResolver, VariableSources};
pub use wait::WaitBudget;
