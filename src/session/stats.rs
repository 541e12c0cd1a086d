use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one completed transcription exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Transcribed text
    pub text: String,

    /// Session that produced the transcript
    pub session_id: String,

    /// When the transcript arrived
    pub received_at: DateTime<Utc>,

    /// Number of `audio-chunk` messages sent
    pub chunks_sent: usize,

    /// Total PCM bytes sent
    pub audio_bytes: usize,

    /// Length of the audio in seconds
    pub audio_duration_secs: f64,
}
