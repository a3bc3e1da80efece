//! Live job bookkeeping
//!
//! Each submitted job gets its own tokio task and cancellation token. The
//! entry is keyed by the caller's job id and stamped with a generation, so a
//! finishing job can only ever remove its own entry, never a successor that
//! reused the id.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use std::any::Any;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::types::{JobId, TransferKind, TransferRequest};
use crate::config::Config;
use crate::events::{EventSink, TransferEvent};
use crate::humanize::ByteSize;
use crate::observability::Metrics;
use crate::transfer::download::run_download;
use crate::transfer::upload::run_upload;
use crate::transfer::{JobContext, Result as TransferResult, TransferError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("job {0} is already running")]
    DuplicateJob(JobId),

    #[error("no tokio runtime available to run jobs")]
    NoRuntime,
}

#[derive(Debug)]
pub struct JobEntry {
    pub kind: TransferKind,
    cancel: CancellationToken,
    generation: u64,
}

/// Identifies one submission of a job id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTicket {
    pub id: JobId,
    generation: u64,
}

type JobMap = Arc<DashMap<JobId, JobEntry>>;

pub struct JobRegistry {
    jobs: JobMap,
    next_generation: AtomicU64,
    config: Arc<Config>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    runtime: Handle,
}

impl JobRegistry {
    /// Create a registry that spawns jobs on the current tokio runtime
    pub fn new(config: Arc<Config>, sink: Arc<dyn EventSink>) -> Result<Self, RegistryError> {
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;
        Ok(Self::with_runtime(config, sink, runtime))
    }

    pub fn with_runtime(config: Arc<Config>, sink: Arc<dyn EventSink>, runtime: Handle) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            config,
            sink,
            metrics: Arc::new(Metrics::new()),
            runtime,
        }
    }

    /// Track `id` and start its engine
    ///
    /// A live id is rejected and its existing job is left untouched.
    pub fn submit(&self, id: JobId, request: TransferRequest) -> Result<JobTicket, RegistryError> {
        let kind = request.kind();
        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.jobs.entry(id) {
            Entry::Occupied(_) => {
                self.metrics.job_rejected();
                warn!(job_id = id, %kind, "Rejected duplicate job id");
                return Err(RegistryError::DuplicateJob(id));
            }
            Entry::Vacant(slot) => {
                slot.insert(JobEntry {
                    kind,
                    cancel: cancel.clone(),
                    generation,
                });
            }
        }

        let ticket = JobTicket { id, generation };
        let release = ReleaseGuard {
            jobs: Arc::clone(&self.jobs),
            ticket,
        };
        let ctx = JobContext {
            job_id: id,
            config: Arc::clone(&self.config),
            sink: Arc::clone(&self.sink),
            cancel,
        };

        self.metrics.job_started();
        info!(job_id = id, %kind, "Job submitted");
        self.runtime
            .spawn(run_job(ctx, request, release, Arc::clone(&self.metrics)));

        Ok(ticket)
    }

    /// Cancel a live job of any kind
    pub fn cancel(&self, id: JobId) -> bool {
        self.cancel_matching(id, |_| true)
    }

    /// Cancel `id` only if it is a job of `kind`
    pub fn cancel_kind(&self, id: JobId, kind: TransferKind) -> bool {
        self.cancel_matching(id, |entry| entry.kind == kind)
    }

    fn cancel_matching(&self, id: JobId, matches: impl Fn(&JobEntry) -> bool) -> bool {
        match self.jobs.get(&id) {
            Some(entry) if matches(entry.value()) => {
                entry.cancel.cancel();
                info!(job_id = id, kind = %entry.kind, "Job cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Drop the entry for `ticket` if it is still the live one for its id
    pub fn complete(&self, ticket: &JobTicket) -> bool {
        release(&self.jobs, ticket)
    }

    pub fn is_active(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    /// Live ids in ascending order
    pub fn active_jobs(&self) -> Vec<(JobId, TransferKind)> {
        let mut jobs: Vec<_> = self
            .jobs
            .iter()
            .map(|entry| (*entry.key(), entry.value().kind))
            .collect();
        jobs.sort_unstable_by_key(|(id, _)| *id);
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }
}

fn release(jobs: &DashMap<JobId, JobEntry>, ticket: &JobTicket) -> bool {
    jobs.remove_if(&ticket.id, |_, entry| entry.generation == ticket.generation)
        .is_some()
}

/// Releases the job id when the task ends, including on panic
struct ReleaseGuard {
    jobs: JobMap,
    ticket: JobTicket,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        release(&self.jobs, &self.ticket);
    }
}

async fn run_job(
    ctx: JobContext,
    request: TransferRequest,
    release: ReleaseGuard,
    metrics: Arc<Metrics>,
) {
    let kind = request.kind();
    let engine = execute(ctx.clone(), request, Arc::clone(&metrics));
    finish(ctx, kind, engine, release, metrics).await;
}

/// Drive the engine for `request` into its terminal event
async fn execute(
    ctx: JobContext,
    request: TransferRequest,
    metrics: Arc<Metrics>,
) -> TransferResult<TransferEvent> {
    let job_id = ctx.job_id;
    match &request {
        TransferRequest::Download(download) => run_download(&ctx, download).await.map(|outcome| {
            info!(
                job_id,
                status = outcome.status_code,
                bytes = outcome.bytes_written,
                "Download complete"
            );
            metrics.job_completed(outcome.bytes_written);
            TransferEvent::DownloadComplete {
                status_code: outcome.status_code,
                bytes_written: outcome.bytes_written,
            }
        }),
        TransferRequest::Upload(upload) => run_upload(&ctx, upload).await.map(|outcome| {
            info!(
                job_id,
                status = outcome.status_code,
                size = %ByteSize(outcome.bytes_sent),
                "Upload complete"
            );
            metrics.job_completed(outcome.bytes_sent);
            TransferEvent::UploadComplete {
                status_code: outcome.status_code,
                headers: outcome.headers,
                body: outcome.body,
            }
        }),
    }
}

/// Await `engine`, release the id and emit exactly one terminal event
///
/// A panicking engine is reported as an `Io` error.
async fn finish<F>(
    ctx: JobContext,
    kind: TransferKind,
    engine: F,
    release: ReleaseGuard,
    metrics: Arc<Metrics>,
) where
    F: Future<Output = TransferResult<TransferEvent>>,
{
    let job_id = ctx.job_id;
    let result = match AssertUnwindSafe(engine).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(job_id, %kind, panic = message, "Job panicked");
            Err(TransferError::Io(io::Error::other(format!(
                "transfer task panicked: {message}"
            ))))
        }
    };

    let event = result.unwrap_or_else(|err| {
        match &err {
            TransferError::Aborted => {
                metrics.job_aborted();
                info!(job_id, %kind, "Job aborted");
            }
            other => {
                metrics.job_failed();
                warn!(job_id, %kind, error = %other, "Job failed");
            }
        }
        TransferEvent::error(&err)
    });

    // The id is free again before the caller hears about the outcome
    drop(release);
    ctx.emit(event);
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
