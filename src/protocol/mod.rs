//! Wyoming wire protocol
//!
//! Each message is one line of JSON (the [`Envelope`]) terminated by `\n`,
//! optionally followed by `data_length` bytes of JSON data and then
//! `payload_length` bytes of binary payload.

pub mod codec;
pub mod envelope;
pub mod events;

pub use codec::{encode_frame, FrameDecoder, MAX_HEADER_BYTES};
pub use envelope::{Envelope, Frame};
pub use events::{
    event_type, AsrModel, AsrProgram, AudioFormat, Event, ServiceInfo, TranscribeOptions,
};
