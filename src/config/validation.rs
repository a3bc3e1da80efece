use super::models::Config;
use crate::humanize::ByteSize;
use thiserror::Error;

const MAX_CHUNK_SIZE: ByteSize = ByteSize::mib(16);
const ALLOWED_METHODS: &[&str] = &["POST", "PUT", "PATCH"];

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Timeout must be positive: {field} = 0")]
    ZeroTimeout { field: &'static str },

    #[error("download.chunk_size must be between 1B and {max} (got {actual})")]
    InvalidChunkSize { actual: ByteSize, max: ByteSize },

    #[error("upload.min_segment ({min}) exceeds upload.max_segment ({max})")]
    SegmentRangeInverted { min: ByteSize, max: ByteSize },

    #[error("upload.min_segment must be positive")]
    ZeroSegment,

    #[error("download.progress_divider must be at most 100 (got {0})")]
    DividerOutOfRange(u32),

    #[error("Unsupported upload method '{0}', expected one of POST, PUT, PATCH")]
    UnsupportedMethod(String),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_timeouts(config)?;
    validate_download(config)?;
    validate_upload(config)?;
    Ok(())
}

fn validate_timeouts(config: &Config) -> Result<(), ValidationError> {
    let http = &config.http;
    let fields = [
        ("http.connect_timeout_ms", http.connect_timeout_ms),
        ("http.read_timeout_ms", http.read_timeout_ms),
        ("http.redirect_connect_timeout_ms", http.redirect_connect_timeout_ms),
        ("http.redirect_read_timeout_ms", http.redirect_read_timeout_ms),
    ];

    match fields.iter().find(|(_, value)| *value == 0) {
        Some((field, _)) => Err(ValidationError::ZeroTimeout { field }),
        None => Ok(()),
    }
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let chunk_size = config.download.chunk_size;
    if chunk_size.as_u64() == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(ValidationError::InvalidChunkSize {
            actual: chunk_size,
            max: MAX_CHUNK_SIZE,
        });
    }

    if config.download.progress_divider > 100 {
        return Err(ValidationError::DividerOutOfRange(
            config.download.progress_divider,
        ));
    }

    Ok(())
}

fn validate_upload(config: &Config) -> Result<(), ValidationError> {
    let upload = &config.upload;
    if upload.min_segment.as_u64() == 0 {
        return Err(ValidationError::ZeroSegment);
    }
    if upload.min_segment > upload.max_segment {
        return Err(ValidationError::SegmentRangeInverted {
            min: upload.min_segment,
            max: upload.max_segment,
        });
    }

    let method = upload.default_method.to_ascii_uppercase();
    if !ALLOWED_METHODS.contains(&method.as_str()) {
        return Err(ValidationError::UnsupportedMethod(
            upload.default_method.clone(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.http.redirect_read_timeout_ms = 0;

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ZeroTimeout {
                field: "http.redirect_read_timeout_ms"
            })
        ));
    }

    #[test]
    fn test_chunk_size_bounds() {
        let mut config = Config::default();
        config.download.chunk_size = ByteSize(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidChunkSize { .. })
        ));

        config.download.chunk_size = ByteSize::mib(32);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidChunkSize { .. })
        ));
    }

    #[test]
    fn test_divider_out_of_range() {
        let mut config = Config::default();
        config.download.progress_divider = 101;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DividerOutOfRange(101))
        ));
    }

    #[test]
    fn test_segment_range_inverted() {
        let mut config = Config::default();
        config.upload.min_segment = ByteSize::mib(2);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::SegmentRangeInverted { .. })
        ));
    }

    #[test]
    fn test_method_is_case_insensitive() {
        let mut config = Config::default();
        config.upload.default_method = "put".to_string();
        assert!(validate(&config).is_ok());

        config.upload.default_method = "DELETE".to_string();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::UnsupportedMethod(_))
        ));
    }
}
