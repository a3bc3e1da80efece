//! Upload body construction
//!
//! Multipart bodies are framed by hand so the exact length is known before
//! the request is sent:
//!
//! ```text
//! --*****\r\n
//! Content-Disposition: form-data; name="<key>"\r\n
//! \r\n
//! <value>\r\n
//! --*****\r\n
//! Content-Disposition: form-data; name="<field>"; filename="<file>"\r\n
//! Content-Type: <mime>\r\n
//! Content-length: <len>\r\n
//! \r\n
//! <file bytes>\r\n
//! --*****--\r\n
//! ```
//!
//! Binary-stream-only bodies are the raw file bytes back to back.

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use futures_util::stream;
use mime::Mime;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::{Result, TransferError};
use crate::jobs::FileDescriptor;

pub const BOUNDARY: &str = "*****";
const CRLF: &str = "\r\n";
const FALLBACK_MIME: &str = "*/*";

/// Progress callback, invoked with cumulative file bytes handed to the transport
pub type UploadProgressFn = Box<dyn FnMut(u64) + Send>;

/// Bounds for the file segment written between progress callbacks
#[derive(Debug, Clone, Copy)]
pub struct SegmentSizing {
    pub min: u64,
    pub max: u64,
}

impl SegmentSizing {
    /// One hundredth of the file, clamped to `[min, max]`
    pub fn segment_for(&self, file_len: u64) -> u64 {
        let min = self.min.max(1);
        file_len.div_ceil(100).clamp(min, self.max.max(min))
    }
}

impl Default for SegmentSizing {
    fn default() -> Self {
        Self {
            min: 4 * 1024,
            max: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
enum Part {
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Part {
    fn len(&self) -> u64 {
        match self {
            Part::Bytes(bytes) => bytes.len() as u64,
            Part::File { len, .. } => *len,
        }
    }
}

/// Collects fields and files for one upload
#[derive(Debug, Clone, Default)]
pub struct MultipartBodyBuilder {
    binary_stream_only: bool,
    fields: Vec<(String, String)>,
    files: Vec<FileDescriptor>,
}

impl MultipartBodyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary_stream_only(mut self, enabled: bool) -> Self {
        self.binary_stream_only = enabled;
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.fields.extend(fields);
        self
    }

    pub fn file(mut self, file: FileDescriptor) -> Self {
        self.files.push(file);
        self
    }

    pub fn files<I>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        self.files.extend(files);
        self
    }

    /// Stat every file and lay out the body parts
    pub async fn build(self) -> Result<MultipartBody> {
        let mut parts = Vec::new();
        let mut file_bytes = 0u64;

        if !self.binary_stream_only {
            for (name, value) in &self.fields {
                parts.push(Part::Bytes(Bytes::from(format!(
                    "--{BOUNDARY}{CRLF}Content-Disposition: form-data; name=\"{name}\"{CRLF}{CRLF}{value}{CRLF}"
                ))));
            }
        }

        for file in self.files {
            let metadata = tokio::fs::metadata(&file.file_path)
                .await
                .map_err(|err| TransferError::unopenable(&file.file_path, err))?;
            if !metadata.is_file() {
                return Err(TransferError::NotFound(format!(
                    "{}: not a regular file",
                    file.file_path.display()
                )));
            }
            let len = metadata.len();
            file_bytes += len;

            if self.binary_stream_only {
                parts.push(Part::File {
                    path: file.file_path,
                    len,
                });
                continue;
            }

            let mime_type = match file.mime_type.as_deref() {
                Some(explicit) if !explicit.is_empty() => explicit.to_string(),
                _ => infer_mime_type(&file.file_path),
            };
            parts.push(Part::Bytes(Bytes::from(format!(
                "--{BOUNDARY}{CRLF}\
                 Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"{CRLF}\
                 Content-Type: {mime_type}{CRLF}\
                 Content-length: {len}{CRLF}{CRLF}",
                file.form_name(),
                file.file_name
            ))));
            parts.push(Part::File {
                path: file.file_path,
                len,
            });
            parts.push(Part::Bytes(Bytes::from_static(CRLF.as_bytes())));
        }

        if !self.binary_stream_only {
            parts.push(Part::Bytes(Bytes::from(format!("--{BOUNDARY}--{CRLF}"))));
        }

        let content_length = parts.iter().map(Part::len).sum();
        debug!(
            parts = parts.len(),
            content_length,
            file_bytes,
            binary = self.binary_stream_only,
            "Upload body planned"
        );

        Ok(MultipartBody {
            parts,
            content_length,
            file_bytes,
            binary_stream_only: self.binary_stream_only,
        })
    }
}

/// A planned upload body; file contents are read lazily while streaming
#[derive(Debug, Clone)]
pub struct MultipartBody {
    parts: Vec<Part>,
    content_length: u64,
    file_bytes: u64,
    binary_stream_only: bool,
}

impl MultipartBody {
    /// Exact number of bytes the stream will yield
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Sum of all file sizes; the denominator for upload progress
    pub fn total_file_bytes(&self) -> u64 {
        self.file_bytes
    }

    pub fn is_binary_stream_only(&self) -> bool {
        self.binary_stream_only
    }

    /// `multipart/form-data;boundary=*****`, or `None` for raw bodies
    pub fn content_type(&self) -> Option<String> {
        (!self.binary_stream_only).then(|| format!("multipart/form-data;boundary={BOUNDARY}"))
    }

    /// Stream the body
    ///
    /// Cancellation is observed before each file is opened. The stream fails
    /// if the bytes produced differ from [`content_length`](Self::content_length).
    pub fn into_stream(
        self,
        sizing: SegmentSizing,
        cancel: CancellationToken,
        on_progress: UploadProgressFn,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let cursor = BodyCursor {
            parts: self.parts.into(),
            open: None,
            expected: self.content_length,
            sent: 0,
            file_sent: 0,
            sizing,
            cancel,
            on_progress,
        };
        stream::try_unfold(cursor, BodyCursor::next_chunk)
    }
}

struct OpenFile {
    file: tokio::fs::File,
    remaining: u64,
    segment: u64,
}

struct BodyCursor {
    parts: VecDeque<Part>,
    open: Option<OpenFile>,
    expected: u64,
    sent: u64,
    file_sent: u64,
    sizing: SegmentSizing,
    cancel: CancellationToken,
    on_progress: UploadProgressFn,
}

impl BodyCursor {
    async fn next_chunk(mut self) -> io::Result<Option<(Bytes, Self)>> {
        loop {
            if let Some(open) = self.open.as_mut() {
                if open.remaining == 0 {
                    self.open = None;
                    continue;
                }
                let want = open.segment.min(open.remaining);
                let mut buf = BytesMut::zeroed(want as usize);
                open.file.read_exact(&mut buf).await?;
                open.remaining -= want;

                self.sent += want;
                self.file_sent += want;
                (self.on_progress)(self.file_sent);
                return Ok(Some((buf.freeze(), self)));
            }

            match self.parts.pop_front() {
                Some(Part::Bytes(bytes)) => {
                    self.sent += bytes.len() as u64;
                    return Ok(Some((bytes, self)));
                }
                Some(Part::File { path, len }) => {
                    if self.cancel.is_cancelled() {
                        return Err(io::Error::new(
                            io::ErrorKind::Interrupted,
                            "upload has been aborted",
                        ));
                    }
                    let file = tokio::fs::File::open(&path).await?;
                    self.open = Some(OpenFile {
                        file,
                        remaining: len,
                        segment: self.sizing.segment_for(len),
                    });
                }
                None => {
                    if self.sent != self.expected {
                        return Err(io::Error::other(format!(
                            "upload body length mismatch: planned {} bytes, produced {}",
                            self.expected, self.sent
                        )));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

/// MIME type from the file extension, `*/*` when unknown
pub fn infer_mime_type(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| mime_for_extension(&ext.to_ascii_lowercase()))
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

fn mime_for_extension(ext: &str) -> Option<Mime> {
    let known = match ext {
        "txt" | "text" | "log" => mime::TEXT_PLAIN,
        "html" | "htm" => mime::TEXT_HTML,
        "css" => mime::TEXT_CSS,
        "csv" => mime::TEXT_CSV,
        "xml" => mime::TEXT_XML,
        "js" | "mjs" => mime::TEXT_JAVASCRIPT,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "bin" => mime::APPLICATION_OCTET_STREAM,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        other => return other_mime(other),
    };
    Some(known)
}

/// Types without a constant in the `mime` crate
fn other_mime(ext: &str) -> Option<Mime> {
    let essence = match ext {
        "webp" => "image/webp",
        "heic" => "image/heic",
        "ico" => "image/x-icon",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "apk" => "application/vnd.android.package-archive",
        _ => return None,
    };
    essence.parse().ok()
}
