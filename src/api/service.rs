use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::events::{EventSink, TransferEvent};
use crate::jobs::{
    DownloadRequest, FileDescriptor, JobId, JobRegistry, RegistryError, TransferKind,
    UploadRequest,
};
use crate::observability::MetricsSnapshot;

pub struct TransferService {
    config: Arc<Config>,
    registry: JobRegistry,
}

impl TransferService {
    /// Build a service on the current tokio runtime
    pub fn new(config: Config, sink: impl EventSink) -> Result<Self, RegistryError> {
        let config = Arc::new(config);
        let registry = JobRegistry::new(Arc::clone(&config), Arc::new(sink))?;
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.registry.metrics().snapshot()
    }

    pub fn start_download(&self, job_id: JobId, request: DownloadRequest) -> Result<(), RegistryError> {
        self.registry.submit(job_id, request.into()).map(|_| ())
    }

    /// Cancel a running download; `false` if `job_id` is not one
    pub fn stop_download(&self, job_id: JobId) -> bool {
        self.registry.cancel_kind(job_id, TransferKind::Download)
    }

    pub fn start_upload(&self, job_id: JobId, request: UploadRequest) -> Result<(), RegistryError> {
        self.registry.submit(job_id, request.into()).map(|_| ())
    }

    /// Start an upload whose files come as flat
    /// `[field_name, file_name, file_path, mime_type]*` groups
    ///
    /// A list that does not split into groups of four is reported through an
    /// `Error` event for `job_id`; no job is started.
    pub fn start_upload_encoded<S: AsRef<str>>(
        &self,
        job_id: JobId,
        flat_files: &[S],
        mut request: UploadRequest,
    ) -> Result<(), RegistryError> {
        match FileDescriptor::parse_flat(flat_files) {
            Ok(files) => {
                request.files.extend(files);
                self.start_upload(job_id, request)
            }
            Err(err) => {
                if self.registry.is_active(job_id) {
                    return Err(RegistryError::DuplicateJob(job_id));
                }
                warn!(job_id, error = %err, "Rejected upload file list");
                self.registry.sink().emit(job_id, TransferEvent::error(&err));
                Ok(())
            }
        }
    }

    /// Cancel a running upload; `false` if `job_id` is not one
    pub fn stop_upload(&self, job_id: JobId) -> bool {
        self.registry.cancel_kind(job_id, TransferKind::Upload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelSink;
    use crate::transfer::ErrorKind;

    #[tokio::test]
    async fn test_malformed_flat_list_reports_error() {
        let (sink, mut rx) = ChannelSink::new();
        let service = TransferService::new(Config::default(), sink).unwrap();
        let request = UploadRequest::builder()
            .to_url("http://127.0.0.1:9/upload")
            .build();

        service
            .start_upload_encoded(4, &["field", "name.txt"], request)
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.job_id, 4);
        assert!(matches!(
            event.event,
            TransferEvent::Error {
                kind: ErrorKind::MalformedRequest,
                ..
            }
        ));
        assert!(!service.registry().is_active(4));
    }

    #[tokio::test]
    async fn test_stop_unknown_jobs() {
        let (sink, _rx) = ChannelSink::new();
        let service = TransferService::new(Config::default(), sink).unwrap();

        assert!(!service.stop_download(1));
        assert!(!service.stop_upload(1));
        assert_eq!(service.metrics().jobs_started, 0);
    }
}
