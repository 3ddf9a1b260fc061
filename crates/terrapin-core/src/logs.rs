//! Job log streaming.

use futures::StreamExt;
use futures::stream;
use std::sync::Arc;
use std::time::Duration;

use terrapin_proto::{Backend, BackendError, BackendResult, JobLogEvent, JobLogStream};
use tracing::debug;

use crate::console::Console;
use crate::error::RunError;
use crate::wait::WaitBudget;

/// How streamed log chunks are written to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Chunks written exactly as received.
    Raw,
    /// Each event trimmed and printed as a line; empty events skipped.
    Lines,
}

struct TailState {
    backend: Arc<dyn Backend>,
    job_id: String,
    offset: u64,
    chunk_size: u64,
    poll_interval: Duration,
    drained: bool,
}

/// Tails a job's log through ranged reads.
///
/// The stream ends once the job has finished and its log has been read to
/// the end.
pub fn tail_job_logs(
    backend: Arc<dyn Backend>,
    job_id: String,
    chunk_size: u64,
    poll_interval: Duration,
) -> JobLogStream {
    let state = TailState {
        backend,
        job_id,
        offset: 0,
        chunk_size,
        poll_interval,
        drained: false,
    };

    stream::try_unfold(state, next_chunk).boxed()
}

async fn next_chunk(mut state: TailState) -> BackendResult<Option<(JobLogEvent, TailState)>> {
    loop {
        if state.drained {
            return Ok(None);
        }

        // Status first: a finished job cannot grow its log after this read.
        let finished = state.backend.get_job(&state.job_id).await?.status.is_finished();
        let chunk = state
            .backend
            .read_job_logs(&state.job_id, state.offset, state.chunk_size)
            .await?;

        let read = chunk.logs.len() as u64;
        if read > 0 {
            state.offset += read;
            if finished && read < state.chunk_size {
                state.drained = true;
            }
            let event = JobLogEvent {
                size: state.offset,
                logs: chunk.logs,
            };
            return Ok(Some((event, state)));
        }

        if finished {
            return Ok(None);
        }

        debug!(job_id = %state.job_id, offset = state.offset, "No new log output yet");
        tokio::time::sleep(state.poll_interval).await;
    }
}

/// Writes every chunk of `stream` to the console until it closes.
///
/// Returns the final log size. An error item ends the stream immediately.
pub async fn stream_job_logs(
    mut stream: JobLogStream,
    console: &mut dyn Console,
    format: LogFormat,
    budget: &WaitBudget,
    waiting_for: &'static str,
) -> Result<u64, RunError> {
    let drain = async {
        let mut size = 0;
        while let Some(event) = stream.next().await {
            let event = event?;
            size = event.size;
            match format {
                LogFormat::Raw => console.write(&event.logs),
                LogFormat::Lines => {
                    let line = event.logs.trim();
                    if !line.is_empty() {
                        console.print(line);
                    }
                }
            }
        }
        Ok::<u64, BackendError>(size)
    };

    Ok(budget.guard(waiting_for, drain).await??)
}
