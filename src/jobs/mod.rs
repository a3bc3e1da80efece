//! Job requests, validation and the live-job registry

pub mod registry;
mod types;
pub mod validation;

pub use registry::{JobRegistry, JobTicket, RegistryError};
pub use types::{
    DownloadOutcome, DownloadRequest, FileDescriptor, HeadersMap, JobId, TransferKind,
    TransferRequest, UploadOutcome, UploadRequest,
};
