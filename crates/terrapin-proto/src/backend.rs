//! The remote operations consumed by the run lifecycle.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BackendResult;
use crate::model::{
    ConfigurationVersion, CreateRunInput, Job, JobLogEvent, JobLogs, Run, Workspace,
};

/// Forward-only stream of job log chunks. Ends when the job completes.
pub type JobLogStream = BoxStream<'static, BackendResult<JobLogEvent>>;

/// Parameters for a push subscription to a job's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLogSubscription {
    pub job_id: String,
    pub run_id: String,
    pub workspace_path: String,
    /// Log size already seen by the caller; the backend only pushes what follows.
    pub last_seen_size: u64,
}

/// RPC surface of the remote automation backend.
///
/// Implementations must be shareable across tasks; the run lifecycle holds
/// them behind an `Arc`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Looks up a workspace by its full path.
    async fn get_workspace(&self, workspace_path: &str) -> BackendResult<Workspace>;

    async fn create_configuration_version(
        &self,
        workspace_path: &str,
        speculative: bool,
    ) -> BackendResult<ConfigurationVersion>;

    /// Uploads the packaged configuration archive.
    async fn upload_configuration_version(
        &self,
        configuration_version_id: &str,
        workspace_path: &str,
        archive: Vec<u8>,
    ) -> BackendResult<()>;

    async fn get_configuration_version(
        &self,
        configuration_version_id: &str,
    ) -> BackendResult<ConfigurationVersion>;

    /// Creates a run; the backend queues its plan stage immediately.
    async fn create_run(&self, input: &CreateRunInput) -> BackendResult<Run>;

    async fn get_run(&self, run_id: &str) -> BackendResult<Run>;

    /// Requests the apply stage of a planned run.
    async fn apply_run(&self, run_id: &str, comment: Option<&str>) -> BackendResult<Run>;

    async fn cancel_run(&self, run_id: &str, force: bool) -> BackendResult<Run>;

    async fn get_job(&self, job_id: &str) -> BackendResult<Job>;

    /// Reads up to `limit` bytes of a job's log starting at `offset`.
    async fn read_job_logs(&self, job_id: &str, offset: u64, limit: u64)
    -> BackendResult<JobLogs>;

    /// Opens a server-driven stream of log events for a job.
    async fn subscribe_job_logs(
        &self,
        subscription: &JobLogSubscription,
    ) -> BackendResult<JobLogStream>;
}
