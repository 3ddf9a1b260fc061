//! Run request validation and run creation.

use std::path::PathBuf;
use std::sync::Arc;

use terrapin_proto::{Backend, CreateRunInput, Run};
use tracing::{debug, info};

use crate::config::RunSettings;
use crate::console::Console;
use crate::error::RunError;
use crate::logs::{LogFormat, stream_job_logs, tail_job_logs};
use crate::outcome::{StageOutcome, evaluate_plan};
use crate::packager::{package_directory, validate_directory};
use crate::upload::ConfigurationVersionUploader;
use crate::variables::{VariableResolver, VariableSources};
use crate::wait::WaitBudget;

/// Normalized inputs for a plan, apply, or destroy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub workspace_path: String,
    /// Local configuration directory. Exclusive with `module_source`.
    pub directory: Option<PathBuf>,
    pub module_source: Option<String>,
    /// Requires `module_source`.
    pub module_version: Option<String>,
    pub variables: VariableSources,
    pub terraform_version: Option<String>,
    pub is_destroy: bool,
    pub speculative: bool,
    pub target_addresses: Vec<String>,
    pub refresh: bool,
    pub refresh_only: bool,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            workspace_path: String::new(),
            directory: None,
            module_source: None,
            module_version: None,
            variables: VariableSources::default(),
            terraform_version: None,
            is_destroy: false,
            speculative: false,
            target_addresses: Vec::new(),
            refresh: true,
            refresh_only: false,
        }
    }
}

impl RunRequest {
    pub fn new(workspace_path: impl Into<String>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            ..Self::default()
        }
    }

    /// Checks every input invariant. Runs before any remote call.
    pub fn validate(&self) -> Result<(), RunError> {
        if self.workspace_path.trim().is_empty() {
            return Err(RunError::InvalidInput("workspace path is required".to_string()));
        }

        match (&self.directory, &self.module_source) {
            (Some(_), Some(_)) => {
                return Err(RunError::InvalidInput(
                    "must not combine --directory-path and --module-source".to_string(),
                ));
            }
            (None, None) => {
                return Err(RunError::InvalidInput(
                    "either --directory-path or --module-source is required".to_string(),
                ));
            }
            _ => {}
        }
        if self.module_version.is_some() && self.module_source.is_none() {
            return Err(RunError::InvalidInput(
                "--module-version requires --module-source".to_string(),
            ));
        }

        self.variables.validate()?;

        if self.refresh_only && self.is_destroy {
            return Err(RunError::InvalidInput(
                "--refresh-only cannot be used with a destroy run".to_string(),
            ));
        }
        if self.refresh_only && !self.refresh {
            return Err(RunError::InvalidInput(
                "--refresh-only cannot be combined with --refresh=false".to_string(),
            ));
        }
        if self.target_addresses.iter().any(|t| t.trim().is_empty()) {
            return Err(RunError::InvalidInput("--target must not be empty".to_string()));
        }

        Ok(())
    }
}

/// A run whose plan stage has completed, with the plan's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRun {
    /// Snapshot fetched after the plan log closed.
    pub run: Run,
    pub outcome: StageOutcome,
}

/// Creates a run and follows its plan stage to completion.
pub struct RunCreator<'a> {
    backend: Arc<dyn Backend>,
    settings: &'a RunSettings,
    process_env: Option<Vec<(String, String)>>,
}

impl<'a> RunCreator<'a> {
    pub fn new(backend: Arc<dyn Backend>, settings: &'a RunSettings) -> Self {
        Self {
            backend,
            settings,
            process_env: None,
        }
    }

    /// Uses `env` instead of the process environment for `TF_VAR_` lookups.
    pub fn with_process_env(mut self, env: Vec<(String, String)>) -> Self {
        self.process_env = Some(env);
        self
    }

    pub async fn create(
        &self,
        request: &RunRequest,
        console: &mut dyn Console,
        budget: &WaitBudget,
    ) -> Result<PlannedRun, RunError> {
        request.validate()?;
        if let Some(directory) = &request.directory {
            validate_directory(directory, request.is_destroy)?;
        }

        let mut resolver = VariableResolver::new(request.directory.clone());
        if let Some(env) = &self.process_env {
            resolver = resolver.with_process_env(env.clone());
        }
        let variables = resolver.resolve(&request.variables)?;

        let workspace = budget
            .guard("workspace lookup", self.backend.get_workspace(&request.workspace_path))
            .await??;
        debug!(workspace_id = %workspace.id, workspace = %workspace.full_path, "Found workspace");

        let configuration_version_id = match &request.directory {
            Some(directory) => {
                let package = package_directory(directory, request.is_destroy)?;
                let uploader = ConfigurationVersionUploader::new(
                    self.backend.as_ref(),
                    self.settings.poll_interval,
                );
                let id = uploader
                    .upload(
                        &request.workspace_path,
                        request.speculative,
                        &package,
                        console,
                        budget,
                    )
                    .await?;
                Some(id)
            }
            None => None,
        };

        let input = CreateRunInput {
            workspace_path: request.workspace_path.clone(),
            configuration_version_id,
            module_source: request.module_source.clone(),
            module_version: request.module_version.clone(),
            variables: variables.into_run_variables(),
            is_destroy: request.is_destroy,
            speculative: request.speculative,
            target_addresses: request.target_addresses.clone(),
            refresh: request.refresh,
            refresh_only: request.refresh_only,
            terraform_version: request.terraform_version.clone(),
        };
        let run = budget
            .guard("run creation", self.backend.create_run(&input))
            .await??;

        info!(
            run_id = %run.id,
            workspace = %request.workspace_path,
            status = %run.status,
            "Created run"
        );
        console.print(&format!(
            "Run {} created in workspace {}",
            run.id, request.workspace_path
        ));

        let job_id = run.plan.current_job_id.clone().ok_or_else(|| {
            RunError::UnexpectedState(format!("run {} has no plan job", run.id))
        })?;

        let logs = tail_job_logs(
            Arc::clone(&self.backend),
            job_id,
            self.settings.log_chunk_size,
            self.settings.poll_interval,
        );
        stream_job_logs(logs, console, LogFormat::Raw, budget, "plan job logs").await?;

        let run = budget
            .guard("plan status", self.backend.get_run(&run.id))
            .await??;
        let outcome = evaluate_plan(&run);
        debug!(
            run_id = %run.id,
            status = %run.status,
            plan_status = %run.plan.status,
            "Plan finished"
        );

        Ok(PlannedRun { run, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBackend, ScriptedConsole, fake_run};
    use crate::packager::PackageError;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use terrapin_proto::{BackendError, PlanStatus, RunStatus, VariableCategory};
    use tokio_util::sync::CancellationToken;

    fn settings() -> RunSettings {
        RunSettings {
            poll_interval: Duration::from_millis(1),
            wait_timeout: Some(Duration::from_secs(5)),
            log_chunk_size: 1024,
        }
    }

    fn config_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let main_tf = "resource \"null_resource\" \"x\" {}\n";
        std::fs::write(dir.path().join("main.tf"), main_tf).unwrap();
        dir
    }

    fn request(dir: &TempDir) -> RunRequest {
        RunRequest {
            directory: Some(dir.path().to_path_buf()),
            ..RunRequest::new("team/prod")
        }
    }

    #[test]
    fn directory_and_module_source_are_exclusive() {
        let req = RunRequest {
            directory: Some(PathBuf::from(".")),
            module_source: Some("registry/module".to_string()),
            ..RunRequest::new("team/prod")
        };
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("must not combine"));
    }

    #[test]
    fn module_version_requires_module_source() {
        let req = RunRequest {
            directory: Some(PathBuf::from(".")),
            module_version: Some("1.0.0".to_string()),
            ..RunRequest::new("team/prod")
        };
        assert!(matches!(req.validate(), Err(RunError::InvalidInput(_))));
    }

    #[test]
    fn refresh_only_rejects_destroy_and_disabled_refresh() {
        let destroy = RunRequest {
            module_source: Some("registry/module".to_string()),
            refresh_only: true,
            is_destroy: true,
            ..RunRequest::new("team/prod")
        };
        assert!(destroy.validate().is_err());

        let no_refresh = RunRequest {
            module_source: Some("registry/module".to_string()),
            refresh_only: true,
            refresh: false,
            ..RunRequest::new("team/prod")
        };
        assert!(no_refresh.validate().is_err());
    }

    #[test]
    fn default_request_refreshes() {
        assert!(RunRequest::default().refresh);
    }

    #[tokio::test]
    async fn creates_run_from_directory_and_streams_plan_log() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| s.plan_logs = "Plan: 2 to add\n".to_string());
        let dir = config_dir();
        let mut req = request(&dir);
        req.variables.tf_vars = vec!["region=eu-west-1".to_string()];
        req.target_addresses = vec!["null_resource.x".to_string()];
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let planned = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&req, &mut console, &WaitBudget::unbounded())
            .await
            .unwrap();

        assert!(planned.outcome.is_success());
        assert_eq!(planned.run.status, RunStatus::Planned);
        assert!(console.output.contains("Plan: 2 to add"));

        let state = backend.state();
        assert_eq!(state.uploaded_archives.len(), 1);
        let input = &state.created_runs[0];
        assert_eq!(input.configuration_version_id.as_deref(), Some("cv-1"));
        assert_eq!(input.target_addresses, vec!["null_resource.x"]);
        assert!(input.refresh);
        assert!(input.variables.iter().any(|v| v.key == "region"
            && v.value == "eu-west-1"
            && v.category == VariableCategory::Terraform));
    }

    #[tokio::test]
    async fn module_source_skips_packaging() {
        let backend = Arc::new(FakeBackend::new());
        let req = RunRequest {
            module_source: Some("registry.example.com/team/net/aws".to_string()),
            module_version: Some("1.2.0".to_string()),
            ..RunRequest::new("team/prod")
        };
        let settings = settings();
        let mut console = ScriptedConsole::default();

        RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&req, &mut console, &WaitBudget::unbounded())
            .await
            .unwrap();

        assert_eq!(backend.count("create_configuration_version"), 0);
        let state = backend.state();
        assert_eq!(state.created_runs[0].configuration_version_id, None);
        assert_eq!(state.created_runs[0].module_version.as_deref(), Some("1.2.0"));
    }

    #[tokio::test]
    async fn missing_tf_files_fail_before_any_remote_call() {
        let backend = Arc::new(FakeBackend::new());
        let dir = TempDir::new().unwrap();
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &WaitBudget::unbounded())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Package(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn missing_workspace_aborts_before_upload() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| s.workspace_missing = true);
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &WaitBudget::unbounded())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Backend(BackendError::NotFound(_))));
        assert_eq!(backend.calls(), vec!["get_workspace"]);
    }

    #[tokio::test]
    async fn errored_plan_is_reported_as_failed_outcome() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| {
            s.run_snapshots = vec![fake_run(RunStatus::Errored, PlanStatus::Errored, None)].into();
        });
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let planned = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &WaitBudget::unbounded())
            .await
            .unwrap();

        assert!(!planned.outcome.is_success());
    }

    #[tokio::test]
    async fn run_without_plan_job_is_unexpected() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| s.created_run.plan.current_job_id = None);
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &WaitBudget::unbounded())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::UnexpectedState(_)));
    }

    #[tokio::test]
    async fn status_is_fetched_after_log_stream_closes() {
        let backend = Arc::new(FakeBackend::new());
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();

        RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &WaitBudget::unbounded())
            .await
            .unwrap();

        let calls = backend.calls();
        let last_log_read = calls.iter().rposition(|c| c == "read_job_logs").unwrap();
        let get_run = calls.iter().position(|c| c == "get_run").unwrap();
        assert!(get_run > last_log_read);
    }

    #[tokio::test]
    async fn missing_directory_is_reported_before_variable_discovery() {
        let backend = Arc::new(FakeBackend::new());
        let dir = TempDir::new().unwrap();
        let req = RunRequest {
            directory: Some(dir.path().join("not-here")),
            ..RunRequest::new("team/prod")
        };
        let settings = settings();
        let mut console = ScriptedConsole::default();

        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&req, &mut console, &WaitBudget::unbounded())
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::Package(PackageError::NotFound(_))));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn stalled_workspace_lookup_hits_deadline() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| {
            s.stalled.insert("get_workspace");
        });
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();
        let budget = WaitBudget::new(CancellationToken::new(), Some(Duration::from_millis(50)));
        let started = Instant::now();

        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &budget)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::Timeout {
                waiting_for: "workspace lookup",
                ..
            }
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(backend.count("create_configuration_version"), 0);
    }

    #[tokio::test]
    async fn stalled_run_creation_stops_on_cancel() {
        let backend = Arc::new(FakeBackend::new());
        backend.configure(|s| {
            s.stalled.insert("create_run");
        });
        let dir = config_dir();
        let settings = settings();
        let mut console = ScriptedConsole::default();
        let token = CancellationToken::new();
        let budget = WaitBudget::new(token.clone(), None);

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });
        let err = RunCreator::new(backend.clone(), &settings)
            .with_process_env(Vec::new())
            .create(&request(&dir), &mut console, &budget)
            .await
            .unwrap_err();
        canceller.await.unwrap();

        assert!(matches!(err, RunError::Cancelled));
        assert_eq!(backend.count("upload_configuration_version"), 1);
    }
}
