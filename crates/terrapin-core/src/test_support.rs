//! Test doubles for the backend and the console.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::{Mutex, MutexGuard};

use terrapin_proto::{
    Apply, ApplyStatus, Backend, BackendError, BackendResult, ConfigurationVersion,
    ConfigurationVersionStatus, CreateRunInput, Job, JobLogEvent, JobLogStream,
    JobLogSubscription, JobLogs, JobStatus, Plan, PlanStatus, Run, RunStatus, Workspace,
};

use crate::console::Console;

pub const WORKSPACE_PATH: &str = "team/prod";

/// Builds a run snapshot with plan job `job-plan` and, when present, apply job `job-apply`.
pub fn fake_run(
    status: RunStatus,
    plan_status: PlanStatus,
    apply_status: Option<ApplyStatus>,
) -> Run {
    Run {
        id: "run-1".to_string(),
        workspace_id: "ws-1".to_string(),
        workspace_path: WORKSPACE_PATH.to_string(),
        status,
        is_destroy: false,
        configuration_version_id: Some("cv-1".to_string()),
        module_source: None,
        module_version: None,
        plan: Plan {
            id: "plan-1".to_string(),
            status: plan_status,
            has_changes: true,
            current_job_id: Some("job-plan".to_string()),
        },
        apply: apply_status.map(|status| Apply {
            id: "apply-1".to_string(),
            status,
            current_job_id: Some("job-apply".to_string()),
            comment: None,
        }),
        created_at: None,
    }
}

/// Pops the next scripted value, repeating the last one forever.
fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Scripted backend responses. Queues repeat their last entry once drained.
#[derive(Debug)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub failures: HashMap<&'static str, BackendError>,
    /// Calls that never return.
    pub stalled: HashSet<&'static str>,
    pub workspace_missing: bool,
    pub configuration_version_statuses: VecDeque<ConfigurationVersionStatus>,
    pub uploaded_archives: Vec<Vec<u8>>,
    pub created_runs: Vec<CreateRunInput>,
    pub created_run: Run,
    pub run_snapshots: VecDeque<Run>,
    pub apply_response: Run,
    pub applied_comments: Vec<Option<String>>,
    pub plan_logs: String,
    pub job_statuses: VecDeque<JobStatus>,
    pub subscriptions: Vec<JobLogSubscription>,
    pub apply_events: Vec<BackendResult<JobLogEvent>>,
    pub cancel_response: Run,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            failures: HashMap::new(),
            stalled: HashSet::new(),
            workspace_missing: false,
            configuration_version_statuses: vec![ConfigurationVersionStatus::Uploaded].into(),
            uploaded_archives: Vec::new(),
            created_runs: Vec::new(),
            created_run: fake_run(RunStatus::PlanQueued, PlanStatus::Queued, None),
            run_snapshots: vec![
                fake_run(RunStatus::Planned, PlanStatus::Finished, None),
                fake_run(
                    RunStatus::Applied,
                    PlanStatus::Finished,
                    Some(ApplyStatus::Finished),
                ),
            ]
            .into(),
            apply_response: fake_run(
                RunStatus::ApplyQueued,
                PlanStatus::Finished,
                Some(ApplyStatus::Queued),
            ),
            applied_comments: Vec::new(),
            plan_logs: "Plan: 1 to add, 0 to change, 0 to destroy.\n".to_string(),
            job_statuses: vec![JobStatus::Finished].into(),
            subscriptions: Vec::new(),
            apply_events: vec![
                Ok(JobLogEvent {
                    size: 20,
                    logs: "Applying changes...\n".to_string(),
                }),
                Ok(JobLogEvent {
                    size: 44,
                    logs: "Apply complete! Resources: 1 added.\n".to_string(),
                }),
            ],
            cancel_response: fake_run(RunStatus::Canceled, PlanStatus::Canceled, None),
        }
    }
}

/// In-memory [`Backend`] that records every call by name.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state());
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == name).count()
    }

    fn record(&self, name: &'static str) -> BackendResult<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(name.to_string());
        if let Some(err) = state.failures.get(name).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    async fn stall_if_scripted(&self, name: &'static str) {
        let stalled = self.state().stalled.contains(name);
        if stalled {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn get_workspace(&self, workspace_path: &str) -> BackendResult<Workspace> {
        self.stall_if_scripted("get_workspace").await;
        let state = self.record("get_workspace")?;
        if state.workspace_missing {
            return Err(BackendError::NotFound(format!("workspace {workspace_path}")));
        }
        Ok(Workspace {
            id: "ws-1".to_string(),
            full_path: workspace_path.to_string(),
            terraform_version: Some("1.6.0".to_string()),
        })
    }

    async fn create_configuration_version(
        &self,
        _workspace_path: &str,
        speculative: bool,
    ) -> BackendResult<ConfigurationVersion> {
        drop(self.record("create_configuration_version")?);
        Ok(ConfigurationVersion {
            id: "cv-1".to_string(),
            workspace_id: "ws-1".to_string(),
            speculative,
            status: ConfigurationVersionStatus::Pending,
        })
    }

    async fn upload_configuration_version(
        &self,
        _configuration_version_id: &str,
        _workspace_path: &str,
        archive: Vec<u8>,
    ) -> BackendResult<()> {
        let mut state = self.record("upload_configuration_version")?;
        state.uploaded_archives.push(archive);
        Ok(())
    }

    async fn get_configuration_version(
        &self,
        configuration_version_id: &str,
    ) -> BackendResult<ConfigurationVersion> {
        let mut state = self.record("get_configuration_version")?;
        let status = next_scripted(&mut state.configuration_version_statuses)
            .unwrap_or(ConfigurationVersionStatus::Uploaded);
        Ok(ConfigurationVersion {
            id: configuration_version_id.to_string(),
            workspace_id: "ws-1".to_string(),
            speculative: false,
            status,
        })
    }

    async fn create_run(&self, input: &CreateRunInput) -> BackendResult<Run> {
        self.stall_if_scripted("create_run").await;
        let mut state = self.record("create_run")?;
        state.created_runs.push(input.clone());
        let mut run = state.created_run.clone();
        run.is_destroy = input.is_destroy;
        Ok(run)
    }

    async fn get_run(&self, run_id: &str) -> BackendResult<Run> {
        self.stall_if_scripted("get_run").await;
        let mut state = self.record("get_run")?;
        next_scripted(&mut state.run_snapshots)
            .ok_or_else(|| BackendError::NotFound(format!("run {run_id}")))
    }

    async fn apply_run(&self, _run_id: &str, comment: Option<&str>) -> BackendResult<Run> {
        self.stall_if_scripted("apply_run").await;
        let mut state = self.record("apply_run")?;
        state.applied_comments.push(comment.map(str::to_string));
        Ok(state.apply_response.clone())
    }

    async fn cancel_run(&self, _run_id: &str, _force: bool) -> BackendResult<Run> {
        self.stall_if_scripted("cancel_run").await;
        let state = self.record("cancel_run")?;
        Ok(state.cancel_response.clone())
    }

    async fn get_job(&self, job_id: &str) -> BackendResult<Job> {
        let mut state = self.record("get_job")?;
        let status = next_scripted(&mut state.job_statuses).unwrap_or(JobStatus::Finished);
        Ok(Job {
            id: job_id.to_string(),
            status,
        })
    }

    async fn read_job_logs(
        &self,
        _job_id: &str,
        offset: u64,
        limit: u64,
    ) -> BackendResult<JobLogs> {
        let state = self.record("read_job_logs")?;
        let total = state.plan_logs.len();
        let start = (offset as usize).min(total);
        let end = start.saturating_add(limit as usize).min(total);
        Ok(JobLogs {
            offset,
            size: total as u64,
            logs: state.plan_logs[start..end].to_string(),
        })
    }

    async fn subscribe_job_logs(
        &self,
        subscription: &JobLogSubscription,
    ) -> BackendResult<JobLogStream> {
        let mut state = self.record("subscribe_job_logs")?;
        state.subscriptions.push(subscription.clone());
        let events = state.apply_events.clone();
        Ok(futures::stream::iter(events).boxed())
    }
}

/// Console capturing output and answering prompts from a script.
#[derive(Debug, Default)]
pub struct ScriptedConsole {
    /// Everything written to standard output, in order.
    pub output: String,
    /// Lines written with `print`.
    pub lines: Vec<String>,
    pub errors: Vec<String>,
    pub answers: VecDeque<String>,
    pub prompts: Vec<String>,
    pub waits_started: usize,
    pub waits_ended: usize,
}

impl ScriptedConsole {
    pub fn answering(answer: &str) -> Self {
        Self {
            answers: VecDeque::from([answer.to_string()]),
            ..Self::default()
        }
    }
}

impl Console for ScriptedConsole {
    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn print(&mut self, line: &str) {
        self.output.push_str(line);
        self.output.push('\n');
        self.lines.push(line.to_string());
    }

    fn error(&mut self, line: &str) {
        self.errors.push(line.to_string());
    }

    fn prompt(&mut self, question: &str) -> io::Result<String> {
        self.prompts.push(question.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer"))
    }

    fn begin_wait(&mut self, _message: &str) {
        self.waits_started += 1;
    }

    fn end_wait(&mut self) {
        self.waits_ended += 1;
    }
}
