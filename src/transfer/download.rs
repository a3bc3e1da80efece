//! Download engine
//!
//! `Connecting -> (Redirecting)? -> Transferring -> Completed | Failed | Aborted`
//!
//! The destination file is only created once the final response is 2xx.
//! Partial output is left on disk when a transfer fails or is aborted.

use futures_util::TryStreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info};

use super::error::{Result, TransferError, into_io_error};
use super::http::{HttpTransferClient, Timeouts, flatten_headers};
use super::progress::{ProgressPolicy, ProgressThrottler};
use super::JobContext;
use crate::events::TransferEvent;
use crate::humanize::ByteSize;
use crate::jobs::validation::validate_download;
use crate::jobs::{DownloadOutcome, DownloadRequest};

pub async fn run_download(ctx: &JobContext, request: &DownloadRequest) -> Result<DownloadOutcome> {
    validate_download(request)?;

    let http = &ctx.config.http;
    let timeouts = Timeouts::from_millis(
        request.connect_timeout_ms.unwrap_or(http.connect_timeout_ms),
        request.read_timeout_ms.unwrap_or(http.read_timeout_ms),
    );
    let client = HttpTransferClient::new(http, timeouts)?;

    let response = ctx
        .cancellable(client.get(&request.from_url, &request.headers))
        .await?;

    let status = response.status();
    if !status.is_success() {
        info!(
            job_id = ctx.job_id,
            url = %response.url(),
            status = status.as_u16(),
            "Download finished without a body"
        );
        return Ok(DownloadOutcome {
            status_code: status.as_u16(),
            bytes_written: 0,
        });
    }

    let content_length = response.content_length();
    if request.want_begin {
        ctx.emit(TransferEvent::DownloadBegin {
            status_code: status.as_u16(),
            content_length,
            headers: flatten_headers(response.headers()),
        });
    }

    let mut file = tokio::fs::File::create(&request.to_path)
        .await
        .map_err(|err| TransferError::unopenable(&request.to_path, err))?;

    let download = &ctx.config.download;
    let mut throttler = ProgressThrottler::new(ProgressPolicy {
        interval_ms: request
            .progress_interval_ms
            .unwrap_or(download.progress_interval_ms),
        divider: request.progress_divider.unwrap_or(download.progress_divider),
    });

    let reader = StreamReader::new(response.bytes_stream().map_err(into_io_error));
    tokio::pin!(reader);
    let mut buf = vec![0u8; download.chunk_size.as_usize().max(1)];
    let mut bytes_written = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(TransferError::Aborted),
            read = reader.read(&mut buf) => read?,
        };
        if read == 0 {
            break;
        }

        file.write_all(&buf[..read]).await?;
        bytes_written += read as u64;
        ctx.ensure_not_cancelled()?;

        if request.want_progress && throttler.should_emit(content_length, bytes_written) {
            ctx.emit(TransferEvent::DownloadProgress {
                content_length,
                bytes_written,
            });
        }
    }

    file.flush().await?;
    debug!(
        job_id = ctx.job_id,
        path = %request.to_path.display(),
        size = %ByteSize(bytes_written),
        "Download body written"
    );

    Ok(DownloadOutcome {
        status_code: status.as_u16(),
        bytes_written,
    })
}
