//! Transcription session management
//!
//! This module provides the `WyomingSession` abstraction that manages:
//! - Framing of outgoing and incoming messages on one byte stream
//! - The transcribe → audio-start → audio-chunk* → audio-stop → transcript sequence
//! - The optional describe → info capability exchange
//! - Response timeouts while waiting on the server

mod config;
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use session::WyomingSession;
pub use state::{Phase, SendEffect, TranscriptionState};
pub use stats::Transcript;
