use bon::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::transfer::TransferError;

/// Caller-chosen job identifier, unique among live jobs
pub type JobId = i32;

/// Single-valued header map; keys are unique
pub type HeadersMap = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Download,
    Upload,
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferKind::Download => f.write_str("download"),
            TransferKind::Upload => f.write_str("upload"),
        }
    }
}

/// Fetch `from_url` into `to_path`
///
/// Unset timeouts and progress settings fall back to the loaded config.
#[derive(Debug, Clone, Builder)]
pub struct DownloadRequest {
    #[builder(into)]
    pub from_url: String,
    #[builder(into)]
    pub to_path: PathBuf,
    #[builder(default)]
    pub headers: HeadersMap,
    /// 0 disables the interval policy
    pub progress_interval_ms: Option<u64>,
    /// Percentage bucket size; 0 emits on every read
    pub progress_divider: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    #[builder(default = true)]
    pub want_begin: bool,
    #[builder(default = true)]
    pub want_progress: bool,
}

/// Send fields and files to `to_url`
#[derive(Debug, Clone, Builder)]
pub struct UploadRequest {
    #[builder(into)]
    pub to_url: String,
    /// POST, PUT or PATCH; the configured default when unset
    #[builder(into)]
    pub method: Option<String>,
    #[builder(default)]
    pub headers: HeadersMap,
    /// Form fields in send order
    #[builder(default)]
    pub fields: Vec<(String, String)>,
    #[builder(default)]
    pub files: Vec<FileDescriptor>,
    /// Send the file bytes back to back with no multipart framing
    #[builder(default)]
    pub binary_stream_only: bool,
    #[builder(default = true)]
    pub want_begin: bool,
    #[builder(default = true)]
    pub want_progress: bool,
}

/// One file of an upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub field_name: String,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Inferred from the extension when absent
    pub mime_type: Option<String>,
}

impl FileDescriptor {
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            file_path: file_path.as_ref().to_path_buf(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Form field name, falling back to the file name when empty
    pub fn form_name(&self) -> &str {
        if self.field_name.is_empty() {
            &self.file_name
        } else {
            &self.field_name
        }
    }

    /// Decode `[field_name, file_name, file_path, mime_type]*`
    ///
    /// An empty `mime_type` entry means "infer from the extension".
    pub fn parse_flat<S: AsRef<str>>(flat: &[S]) -> Result<Vec<Self>, TransferError> {
        if flat.len() % 4 != 0 {
            return Err(TransferError::MalformedRequest(format!(
                "file descriptor list has {} entries, expected a multiple of 4",
                flat.len()
            )));
        }

        let files = flat
            .chunks_exact(4)
            .map(|group| {
                let mime_type = group[3].as_ref();
                FileDescriptor {
                    field_name: group[0].as_ref().to_string(),
                    file_name: group[1].as_ref().to_string(),
                    file_path: PathBuf::from(group[2].as_ref()),
                    mime_type: (!mime_type.is_empty()).then(|| mime_type.to_string()),
                }
            })
            .collect();
        Ok(files)
    }
}

/// A job submitted to the registry
#[derive(Debug, Clone)]
pub enum TransferRequest {
    Download(DownloadRequest),
    Upload(UploadRequest),
}

impl TransferRequest {
    pub fn kind(&self) -> TransferKind {
        match self {
            TransferRequest::Download(_) => TransferKind::Download,
            TransferRequest::Upload(_) => TransferKind::Upload,
        }
    }
}

impl From<DownloadRequest> for TransferRequest {
    fn from(request: DownloadRequest) -> Self {
        TransferRequest::Download(request)
    }
}

impl From<UploadRequest> for TransferRequest {
    fn from(request: UploadRequest) -> Self {
        TransferRequest::Upload(request)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub status_code: u16,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub status_code: u16,
    /// File bytes handed to the transport
    pub bytes_sent: u64,
    pub headers: HeadersMap,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flat_groups_of_four() {
        let flat = [
            "photo", "a.png", "/tmp/a.png", "",
            "", "b.bin", "/tmp/b.bin", "application/x-custom",
        ];
        let files = FileDescriptor::parse_flat(&flat).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].form_name(), "photo");
        assert_eq!(files[0].mime_type, None);
        assert_eq!(files[1].form_name(), "b.bin");
        assert_eq!(files[1].mime_type.as_deref(), Some("application/x-custom"));
        assert_eq!(files[1].file_path, PathBuf::from("/tmp/b.bin"));
    }

    #[test]
    fn test_parse_flat_rejects_partial_group() {
        let flat = ["photo", "a.png", "/tmp/a.png"];
        assert!(matches!(
            FileDescriptor::parse_flat(&flat),
            Err(TransferError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_parse_flat_empty_list() {
        let flat: [&str; 0] = [];
        assert!(FileDescriptor::parse_flat(&flat).unwrap().is_empty());
    }

    #[test]
    fn test_download_builder_defaults() {
        let request = DownloadRequest::builder()
            .from_url("http://localhost/file")
            .to_path("/tmp/file")
            .progress_divider(10)
            .build();

        assert!(request.want_begin);
        assert!(request.want_progress);
        assert!(request.headers.is_empty());
        assert_eq!(request.progress_divider, Some(10));
        assert_eq!(request.progress_interval_ms, None);
    }

    #[test]
    fn test_upload_builder_and_kind() {
        let request = UploadRequest::builder()
            .to_url("http://localhost/upload")
            .method("PUT")
            .fields(vec![("k".to_string(), "v".to_string())])
            .build();

        assert_eq!(request.method.as_deref(), Some("PUT"));
        assert!(!request.binary_stream_only);
        assert_eq!(TransferRequest::from(request).kind(), TransferKind::Upload);
    }
}
