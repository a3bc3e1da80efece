use reqwest::Method;
use thiserror::Error;

use super::types::{DownloadRequest, HeadersMap, UploadRequest};
use crate::transfer::TransferError;

const ALLOWED_UPLOAD_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("url '{0}' must use http or https")]
    UnsupportedScheme(String),
    #[error("destination path must not be empty")]
    EmptyDestination,
    #[error("header name '{0}' is not a valid HTTP token")]
    InvalidHeaderName(String),
    #[error("header '{0}' has a value that is not valid in HTTP")]
    InvalidHeaderValue(String),
    #[error("upload method '{0}' is not one of POST, PUT, PATCH")]
    UnsupportedMethod(String),
    #[error("upload needs at least one file")]
    NoFiles,
    #[error("file '{0}' has an empty path")]
    EmptyFilePath(String),
}

impl From<RequestValidationError> for TransferError {
    fn from(err: RequestValidationError) -> Self {
        TransferError::MalformedRequest(err.to_string())
    }
}

pub fn validate_download(request: &DownloadRequest) -> Result<(), RequestValidationError> {
    validate_url(&request.from_url)?;
    if request.to_path.as_os_str().is_empty() {
        return Err(RequestValidationError::EmptyDestination);
    }
    validate_headers(&request.headers)
}

/// Check an upload and resolve its method against `default_method`
pub fn validate_upload(
    request: &UploadRequest,
    default_method: &str,
) -> Result<Method, RequestValidationError> {
    validate_url(&request.to_url)?;
    validate_headers(&request.headers)?;

    if request.files.is_empty() {
        return Err(RequestValidationError::NoFiles);
    }
    if let Some(file) = request
        .files
        .iter()
        .find(|file| file.file_path.as_os_str().is_empty())
    {
        return Err(RequestValidationError::EmptyFilePath(file.file_name.clone()));
    }

    let requested = request.method.as_deref().unwrap_or(default_method);
    let method = requested.trim().to_ascii_uppercase();
    if !ALLOWED_UPLOAD_METHODS.contains(&method.as_str()) {
        return Err(RequestValidationError::UnsupportedMethod(requested.to_string()));
    }
    Method::from_bytes(method.as_bytes())
        .map_err(|_| RequestValidationError::UnsupportedMethod(requested.to_string()))
}

fn validate_url(url: &str) -> Result<(), RequestValidationError> {
    let lower = url.trim_start().to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        Ok(())
    } else {
        Err(RequestValidationError::UnsupportedScheme(url.to_string()))
    }
}

fn validate_headers(headers: &HeadersMap) -> Result<(), RequestValidationError> {
    for (name, value) in headers {
        if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(RequestValidationError::InvalidHeaderName(name.clone()));
        }
        if reqwest::header::HeaderValue::from_str(value).is_err() {
            return Err(RequestValidationError::InvalidHeaderValue(name.clone()));
        }
    }
    Ok(())
}
