//! Upload engine
//!
//! Uploads never follow redirects. Cancellation is observed between files,
//! before the request goes out and before the response is read; a file
//! already being streamed is finished first.

use reqwest::Body;
use tracing::debug;

use super::error::{Result, TransferError};
use super::http::{HttpTransferClient, Timeouts, flatten_headers};
use super::multipart::{MultipartBodyBuilder, SegmentSizing, UploadProgressFn};
use super::JobContext;
use crate::events::TransferEvent;
use crate::jobs::validation::validate_upload;
use crate::jobs::{UploadOutcome, UploadRequest};

pub async fn run_upload(ctx: &JobContext, request: &UploadRequest) -> Result<UploadOutcome> {
    let upload = &ctx.config.upload;
    let method = validate_upload(request, &upload.default_method)?;

    let body = MultipartBodyBuilder::new()
        .binary_stream_only(request.binary_stream_only)
        .fields(request.fields.iter().cloned())
        .files(request.files.iter().cloned())
        .build()
        .await?;

    if request.want_begin {
        ctx.emit(TransferEvent::UploadBegin);
    }

    let http = &ctx.config.http;
    let client = HttpTransferClient::new(
        http,
        Timeouts::from_millis(http.connect_timeout_ms, http.read_timeout_ms),
    )?;

    let total_expected = body.total_file_bytes();
    let content_type = body.content_type();
    // Raw bodies go out chunked
    let content_length = content_type.as_ref().map(|_| body.content_length());
    let sizing = SegmentSizing {
        min: upload.min_segment.as_u64(),
        max: upload.max_segment.as_u64(),
    };

    let on_progress: UploadProgressFn = if request.want_progress {
        let sink = ctx.sink.clone();
        let job_id = ctx.job_id;
        Box::new(move |total_sent| {
            sink.emit(
                job_id,
                TransferEvent::UploadProgress {
                    total_expected,
                    total_sent,
                },
            )
        })
    } else {
        Box::new(|_| {})
    };

    debug!(
        job_id = ctx.job_id,
        url = %request.to_url,
        %method,
        total_expected,
        ?content_length,
        "Upload body ready"
    );

    ctx.ensure_not_cancelled()?;
    let stream = body.into_stream(sizing, ctx.cancel.clone(), on_progress);
    let sent = client
        .send_body(
            method,
            &request.to_url,
            &request.headers,
            content_type.as_deref(),
            content_length,
            Body::wrap_stream(stream),
        )
        .await;

    let response = match sent {
        Ok(response) => response,
        Err(_) if ctx.cancel.is_cancelled() => return Err(TransferError::Aborted),
        Err(err) => return Err(err),
    };
    ctx.ensure_not_cancelled()?;

    let status_code = response.status().as_u16();
    let headers = flatten_headers(response.headers());
    let body = response.text().await?;

    Ok(UploadOutcome {
        status_code,
        bytes_sent: total_expected,
        headers,
        body,
    })
}
