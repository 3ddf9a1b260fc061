//! Deadlines and cancellation for blocking waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::RunError;

/// Bounds each blocking wait of a command invocation.
///
/// Every wait started through [`WaitBudget::guard`] gets the full `timeout`
/// and ends early when the shared token is cancelled.
#[derive(Debug, Clone, Default)]
pub struct WaitBudget {
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl WaitBudget {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { cancel, timeout }
    }

    /// A budget with no deadline and a fresh token.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Runs `fut` until it completes, the deadline passes, or the token is cancelled.
    pub async fn guard<F>(&self, waiting_for: &'static str, fut: F) -> Result<F::Output, RunError>
    where
        F: Future,
    {
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RunError::Cancelled),
            _ = deadline => {
                let after = self.timeout.unwrap_or_default();
                warn!(waiting_for, ?after, "Wait deadline exceeded");
                Err(RunError::Timeout { waiting_for, after })
            }
            output = fut => Ok(output),
        }
    }
}
