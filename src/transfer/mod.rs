//! Transfer engines and their building blocks

pub mod download;
mod error;
pub mod http;
pub mod multipart;
pub mod progress;
pub mod upload;

pub use error::{ErrorKind, Result, TransferError};
pub use progress::{ProgressPolicy, ProgressThrottler};

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::{EventSink, TransferEvent};
use crate::jobs::JobId;

/// What a running engine sees of its job
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub config: Arc<Config>,
    pub sink: Arc<dyn EventSink>,
    pub cancel: CancellationToken,
}

impl JobContext {
    pub fn emit(&self, event: TransferEvent) {
        self.sink.emit(self.job_id, event);
    }

    pub fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(TransferError::Aborted);
        }
        Ok(())
    }

    /// Run `fut` unless the job is cancelled first
    pub async fn cancellable<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(TransferError::Aborted),
            result = fut => result,
        }
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
