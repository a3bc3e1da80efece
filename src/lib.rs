pub mod api;
pub mod config;
pub mod events;
pub mod humanize;
pub mod jobs;
pub mod observability;
pub mod transfer;

pub use api::TransferService;
pub use events::{ChannelSink, EventSink, JobEvent, TransferEvent};
pub use jobs::{DownloadRequest, FileDescriptor, JobId, UploadRequest};
