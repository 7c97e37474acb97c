use thiserror::Error;

use crate::decode::DecodeError;

/// Application-wide error types for volley.
#[derive(Error, Debug)]
pub enum AppError {
    /// Pipeline configuration rejected before any work started.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A delivered payload could not be decoded into a record.
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// A channel closed while the pipeline still needed it.
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// A worker or aggregator task panicked or was aborted.
    #[error("Worker failure: {0}")]
    Worker(String),
}

impl AppError {
    /// Returns true if the error came from payload content rather than
    /// from the pipeline machinery or its configuration.
    pub fn is_data_error(&self) -> bool {
        matches!(self, AppError::Decode(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_errors() {
        let err = AppError::from(DecodeError::InnerNotObject {
            found: "array".into(),
        });
        assert!(err.is_data_error());
        assert!(!AppError::Config("workers must be > 0".into()).is_data_error());
        assert!(!AppError::ChannelClosed("request").is_data_error());
    }

    #[test]
    fn test_display_names_stage() {
        let err = AppError::from(DecodeError::InnerNotObject {
            found: "array".into(),
        });
        assert_eq!(
            err.to_string(),
            "Decode error: inner payload is not a JSON object (found array)"
        );
    }
}
