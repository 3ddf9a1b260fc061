//! Configuration version creation, upload, and processing wait.

use std::time::Duration;

use terrapin_proto::{Backend, BackendError, ConfigurationVersionStatus};
use tracing::{debug, info};

use crate::console::Console;
use crate::error::RunError;
use crate::packager::ConfigurationPackage;
use crate::wait::WaitBudget;

/// Uploads a packaged configuration and waits for the backend to process it.
pub struct ConfigurationVersionUploader<'a> {
    backend: &'a dyn Backend,
    poll_interval: Duration,
}

impl<'a> ConfigurationVersionUploader<'a> {
    pub fn new(backend: &'a dyn Backend, poll_interval: Duration) -> Self {
        Self {
            backend,
            poll_interval,
        }
    }

    /// Returns the configuration version id once the backend reports it uploaded.
    ///
    /// The upload itself is never retried; any terminal status other than
    /// `uploaded` is reported as [`RunError::UploadFailed`].
    pub async fn upload(
        &self,
        workspace_path: &str,
        speculative: bool,
        package: &ConfigurationPackage,
        console: &mut dyn Console,
        budget: &WaitBudget,
    ) -> Result<String, RunError> {
        let version = budget
            .guard(
                "configuration version creation",
                self.backend.create_configuration_version(workspace_path, speculative),
            )
            .await??;
        info!(
            configuration_version = %version.id,
            workspace = workspace_path,
            speculative,
            "Created configuration version"
        );

        let archive = package.read_bytes().map_err(|source| RunError::Io {
            path: package.path().to_path_buf(),
            source,
        })?;
        budget
            .guard(
                "configuration archive upload",
                self.backend.upload_configuration_version(&version.id, workspace_path, archive),
            )
            .await??;
        debug!(
            configuration_version = %version.id,
            checksum = package.checksum(),
            bytes = package.size(),
            "Uploaded configuration archive"
        );

        console.begin_wait("Waiting for configuration version to be processed...");
        let status = budget
            .guard("configuration version upload", self.wait_until_processed(&version.id))
            .await;
        console.end_wait();

        match status?? {
            ConfigurationVersionStatus::Uploaded => Ok(version.id),
            status => Err(RunError::UploadFailed {
                id: version.id,
                status,
            }),
        }
    }

    async fn wait_until_processed(
        &self,
        configuration_version_id: &str,
    ) -> Result<ConfigurationVersionStatus, BackendError> {
        loop {
            let version = self
                .backend
                .get_configuration_version(configuration_version_id)
                .await?;
            if version.status != ConfigurationVersionStatus::Pending {
                return Ok(version.status);
            }
            debug!(
                configuration_version = configuration_version_id,
                "Configuration version still pending"
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
