use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use thiserror::Error;

/// Terminal failure of a transfer job
///
/// A non-2xx HTTP status is not an error at this level; it is reported as a
/// completion carrying that status.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),

    #[error("transfer has been aborted")]
    Aborted,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, TransferError>;

/// Wire-level classification of a [`TransferError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Io,
    Aborted,
    MalformedRequest,
    NotFound,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Connection(_) => ErrorKind::Connection,
            TransferError::Timeout(_) => ErrorKind::Timeout,
            TransferError::Io(_) => ErrorKind::Io,
            TransferError::Aborted => ErrorKind::Aborted,
            TransferError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            TransferError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    /// Failure to open a local path (download destination or upload source)
    pub fn unopenable(path: &std::path::Path, err: io::Error) -> Self {
        TransferError::NotFound(format!("{}: {}", path.display(), err))
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(err: reqwest::Error) -> Self {
        let message = describe(&err);
        if err.is_timeout() {
            TransferError::Timeout(message)
        } else if err.is_builder() {
            TransferError::MalformedRequest(message)
        } else {
            TransferError::Connection(message)
        }
    }
}

impl From<io::Error> for TransferError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            return TransferError::Timeout(describe(&err));
        }

        // Body streams wrap reqwest failures into io::Error
        let network = err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<reqwest::Error>());
        match network {
            Some(inner) if inner.is_timeout() => TransferError::Timeout(describe(inner)),
            Some(inner) => TransferError::Connection(describe(inner)),
            None => TransferError::Io(err),
        }
    }
}

/// Convert a reqwest body error into io::Error, keeping timeouts recognizable
pub(crate) fn into_io_error(err: reqwest::Error) -> io::Error {
    let kind = if err.is_timeout() {
        io::ErrorKind::TimedOut
    } else {
        io::ErrorKind::Other
    };
    io::Error::new(kind, err)
}

/// Flatten an error and its sources into one line
fn describe(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: TransferError = io::Error::new(io::ErrorKind::TimedOut, "read stalled").into();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("read stalled"));
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let err: TransferError = io::Error::new(io::ErrorKind::WriteZero, "disk full").into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_describe_includes_sources() {
        let inner = io::Error::new(io::ErrorKind::Other, "connection reset");
        let outer = io::Error::new(io::ErrorKind::Other, inner);
        assert_eq!(describe(&outer), "connection reset");

        let err = TransferError::unopenable(
            std::path::Path::new("/nope/file.bin"),
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("/nope/file.bin"));
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedRequest).unwrap();
        assert_eq!(json, "\"malformed_request\"");
    }
}
