pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod session;

pub use audio::AudioFile;
pub use client::{Transcriber, WyomingClient};
pub use config::Config;
pub use error::{Result, WyomingError};
pub use protocol::{
    encode_frame, AudioFormat, Envelope, Event, Frame, FrameDecoder, ServiceInfo,
    TranscribeOptions,
};
pub use session::{Phase, SessionConfig, Transcript, WyomingSession};
