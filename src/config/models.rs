use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings shared by every job
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Used when a download request carries no timeout of its own
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Timeouts for the single redirect hop
    #[serde(default = "default_redirect_timeout_ms")]
    pub redirect_connect_timeout_ms: u64,
    #[serde(default = "default_redirect_timeout_ms")]
    pub redirect_read_timeout_ms: u64,
}

impl HttpConfig {
    pub fn redirect_timeouts(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.redirect_connect_timeout_ms),
            Duration::from_millis(self.redirect_read_timeout_ms),
        )
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            redirect_connect_timeout_ms: default_redirect_timeout_ms(),
            redirect_read_timeout_ms: default_redirect_timeout_ms(),
        }
    }
}

fn default_user_agent() -> String {
    format!("transferbox/{}", env!("CARGO_PKG_VERSION"))
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    60_000
}

fn default_redirect_timeout_ms() -> u64 {
    5_000
}

/// Download streaming and progress defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Read buffer size for the response body
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    #[serde(default)]
    pub progress_interval_ms: u64,
    #[serde(default)]
    pub progress_divider: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            progress_interval_ms: 0,
            progress_divider: 0,
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize::kib(8)
}

/// Upload segmenting defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    /// Smallest file segment written between progress events
    #[serde(default = "default_min_segment")]
    pub min_segment: ByteSize,
    #[serde(default = "default_max_segment")]
    pub max_segment: ByteSize,
    #[serde(default = "default_method")]
    pub default_method: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            min_segment: default_min_segment(),
            max_segment: default_max_segment(),
            default_method: default_method(),
        }
    }
}

fn default_min_segment() -> ByteSize {
    ByteSize::kib(4)
}

fn default_max_segment() -> ByteSize {
    ByteSize::mib(1)
}

fn default_method() -> String {
    "POST".to_string()
}

/// Log filter used when `RUST_LOG` is not set
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

fn default_filter() -> String {
    "transferbox=info".to_string()
}
