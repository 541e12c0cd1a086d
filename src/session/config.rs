use crate::protocol::{AudioFormat, TranscribeOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-connection settings for a transcription session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Bytes of PCM audio per `audio-chunk` message
    /// Default: 4096
    pub chunk_size: usize,

    /// How long to wait for `info` or `transcript` before giving up
    /// Default: 60 seconds (large models on CPU can take a while)
    pub response_timeout: Duration,

    /// Format declared in `audio-start` and restated in every chunk
    pub audio_format: AudioFormat,

    /// Model and language requested with `transcribe`
    pub transcribe: TranscribeOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            response_timeout: Duration::from_secs(60),
            audio_format: AudioFormat::default(), // 16kHz mono s16le
            transcribe: TranscribeOptions::default(),
        }
    }
}
