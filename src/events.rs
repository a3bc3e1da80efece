//! Job events and where they go
//!
//! Engines never block on delivery: [`EventSink::emit`] is fire-and-forget.
//! Every job ends with exactly one terminal event (`DownloadComplete`,
//! `UploadComplete` or `Error`), emitted after its id has been released.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::jobs::{HeadersMap, JobId};
use crate::transfer::{ErrorKind, TransferError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    DownloadBegin {
        status_code: u16,
        content_length: Option<u64>,
        headers: HeadersMap,
    },
    DownloadProgress {
        content_length: Option<u64>,
        bytes_written: u64,
    },
    DownloadComplete {
        status_code: u16,
        bytes_written: u64,
    },
    UploadBegin,
    UploadProgress {
        total_expected: u64,
        total_sent: u64,
    },
    UploadComplete {
        status_code: u16,
        headers: HeadersMap,
        body: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl TransferEvent {
    pub fn error(err: &TransferError) -> Self {
        TransferEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Whether this event ends its job
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferEvent::DownloadComplete { .. }
                | TransferEvent::UploadComplete { .. }
                | TransferEvent::Error { .. }
        )
    }
}

/// An event tagged with the job that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    #[serde(flatten)]
    pub event: TransferEvent,
}

/// Receives events from running jobs; must not block
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, job_id: JobId, event: TransferEvent);
}

impl<F> EventSink for F
where
    F: Fn(JobId, TransferEvent) + Send + Sync + 'static,
{
    fn emit(&self, job_id: JobId, event: TransferEvent) {
        self(job_id, event)
    }
}

/// Forwards events into an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, job_id: JobId, event: TransferEvent) {
        if self.tx.send(JobEvent { job_id, event }).is_err() {
            tracing::trace!(job_id, "Event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_event_json_shape() {
        let event = JobEvent {
            job_id: 7,
            event: TransferEvent::DownloadProgress {
                content_length: Some(100),
                bytes_written: 50,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "job_id": 7,
                "event": "download_progress",
                "content_length": 100,
                "bytes_written": 50
            })
        );
    }

    #[test]
    fn test_error_event_carries_kind() {
        let event = TransferEvent::error(&TransferError::Aborted);
        assert!(event.is_terminal());
        assert_eq!(
            event,
            TransferEvent::Error {
                kind: ErrorKind::Aborted,
                message: "transfer has been aborted".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.emit(1, TransferEvent::UploadBegin);
        sink.emit(
            1,
            TransferEvent::UploadProgress {
                total_expected: 10,
                total_sent: 10,
            },
        );

        assert_eq!(rx.recv().await.unwrap().event, TransferEvent::UploadBegin);
        assert!(!rx.recv().await.unwrap().event.is_terminal());
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.emit(1, TransferEvent::UploadBegin);
    }

    #[test]
    fn test_closure_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = move |job_id: JobId, event: TransferEvent| {
            captured.lock().unwrap().push((job_id, event));
        };

        sink.emit(3, TransferEvent::UploadBegin);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
