//! Error types for the Wyoming client.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WyomingError {
    // Wire-level errors
    #[error("Framing error: {message}")]
    Framing { message: String },

    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    // Transport errors
    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("No response from server within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    // Reported by the server through an `error` event
    #[error("Server error: {message}")]
    Server {
        message: String,
        code: Option<String>,
    },

    // Audio input errors
    #[error("Audio format mismatch: expected {expected}, got {actual}")]
    AudioFormatMismatch { expected: String, actual: String },

    #[error("Audio decoding failed: {0}")]
    Audio(#[from] hound::Error),

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WyomingError {
    pub(crate) fn framing(message: impl Into<String>) -> Self {
        Self::Framing {
            message: message.into(),
        }
    }

    pub(crate) fn violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Whether a caller may retry the request on a fresh connection.
    ///
    /// Framing and protocol errors mean both ends disagree about the stream
    /// and retrying the same input will not help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, WyomingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_framing_display() {
        let error = WyomingError::framing("header is not valid JSON");
        assert_eq!(error.to_string(), "Framing error: header is not valid JSON");
    }

    #[test]
    fn test_protocol_violation_display() {
        let error = WyomingError::violation("audio-chunk sent before audio-start");
        assert_eq!(
            error.to_string(),
            "Protocol violation: audio-chunk sent before audio-start"
        );
    }

    #[test]
    fn test_connection_display() {
        let error = WyomingError::connection("stream closed");
        assert_eq!(error.to_string(), "Connection failed: stream closed");
    }

    #[test]
    fn test_timeout_display() {
        let error = WyomingError::Timeout(Duration::from_secs(30));
        assert_eq!(error.to_string(), "No response from server within 30s");
    }

    #[test]
    fn test_server_display() {
        let error = WyomingError::Server {
            message: "model not loaded".to_string(),
            code: Some("model-missing".to_string()),
        };
        assert_eq!(error.to_string(), "Server error: model not loaded");
    }

    #[test]
    fn test_audio_format_mismatch_display() {
        let error = WyomingError::AudioFormatMismatch {
            expected: "16000Hz 1ch 16-bit".to_string(),
            actual: "44100Hz 2ch 16-bit".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio format mismatch: expected 16000Hz 1ch 16-bit, got 44100Hz 2ch 16-bit"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let error = WyomingError::ConfigInvalidValue {
            key: "transcription.chunk_size".to_string(),
            message: "must be greater than zero".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for transcription.chunk_size: must be greater than zero"
        );
    }

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(WyomingError::connection("reset").is_retryable());
        assert!(WyomingError::Timeout(Duration::from_secs(1)).is_retryable());

        assert!(!WyomingError::framing("bad").is_retryable());
        assert!(!WyomingError::violation("bad").is_retryable());
        assert!(!WyomingError::Server {
            message: "bad".to_string(),
            code: None,
        }
        .is_retryable());
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: WyomingError = io_error.into();
        assert!(error.to_string().contains("file not found"));

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<WyomingError>();
        assert_sync::<WyomingError>();
    }
}
