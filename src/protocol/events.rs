use super::envelope::{Envelope, Frame};
use crate::error::{Result, WyomingError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Wire names of the message types this client knows.
pub mod event_type {
    pub const DESCRIBE: &str = "describe";
    pub const INFO: &str = "info";
    pub const TRANSCRIBE: &str = "transcribe";
    pub const AUDIO_START: &str = "audio-start";
    pub const AUDIO_CHUNK: &str = "audio-chunk";
    pub const AUDIO_STOP: &str = "audio-stop";
    pub const TRANSCRIPT: &str = "transcript";
    pub const ERROR: &str = "error";

    // Streaming progress events sent by newer servers before the final transcript
    pub const TRANSCRIPT_START: &str = "transcript-start";
    pub const TRANSCRIPT_CHUNK: &str = "transcript-chunk";
    pub const TRANSCRIPT_STOP: &str = "transcript-stop";
}

/// PCM stream parameters, restated in `audio-start` and every `audio-chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub rate: u32,
    /// Bytes per sample
    pub width: u16,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            rate: 16000, // 16kHz speech models
            width: 2,    // s16le
            channels: 1, // Mono
        }
    }
}

impl AudioFormat {
    pub fn bytes_per_second(&self) -> u64 {
        self.rate as u64 * self.width as u64 * self.channels as u64
    }

    /// Playback length of `bytes` bytes of audio in this format.
    pub fn duration_secs(&self, bytes: usize) -> f64 {
        match self.bytes_per_second() {
            0 => 0.0,
            rate => bytes as f64 / rate as f64,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}-bit",
            self.rate,
            self.channels,
            self.width as u32 * 8
        )
    }
}

/// Optional model and language selection sent with `transcribe`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscribeOptions {
    /// Model name as advertised in `info`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// A speech-to-text model advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsrModel {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// A speech-to-text program and the models it serves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsrProgram {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub models: Vec<AsrModel>,
}

/// Server capabilities returned in answer to `describe`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub asr: Vec<AsrProgram>,

    /// Everything else the server sent (tts, wake, handle, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceInfo {
    /// Languages of installed ASR models, deduplicated in advertised order.
    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = Vec::new();
        for model in self.installed_models() {
            for language in &model.languages {
                if !languages.contains(&language.as_str()) {
                    languages.push(language);
                }
            }
        }
        languages
    }

    pub fn installed_models(&self) -> impl Iterator<Item = &AsrModel> {
        self.asr
            .iter()
            .filter(|program| program.installed)
            .flat_map(|program| program.models.iter())
            .filter(|model| model.installed)
    }
}

/// A typed Wyoming message.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Describe,
    Info(ServiceInfo),
    Transcribe(TranscribeOptions),
    AudioStart(AudioFormat),
    AudioChunk { format: AudioFormat, audio: Vec<u8> },
    AudioStop,
    Transcript { text: String },
    Error { text: String, code: Option<String> },
    /// A message type this client does not interpret
    Other(String),
}

impl Event {
    pub fn event_type(&self) -> &str {
        match self {
            Event::Describe => event_type::DESCRIBE,
            Event::Info(_) => event_type::INFO,
            Event::Transcribe(_) => event_type::TRANSCRIBE,
            Event::AudioStart(_) => event_type::AUDIO_START,
            Event::AudioChunk { .. } => event_type::AUDIO_CHUNK,
            Event::AudioStop => event_type::AUDIO_STOP,
            Event::Transcript { .. } => event_type::TRANSCRIPT,
            Event::Error { .. } => event_type::ERROR,
            Event::Other(name) => name.as_str(),
        }
    }

    /// Build the frame that carries this event on the wire.
    pub fn into_frame(self) -> Result<Frame> {
        let frame = match self {
            Event::Describe => Frame::new(Envelope::new(event_type::DESCRIBE)),
            Event::Info(info) => {
                Frame::new(Envelope::new(event_type::INFO).with_data(to_object(&info)?))
            }
            Event::Transcribe(options) => {
                Frame::new(Envelope::new(event_type::TRANSCRIBE).with_data(to_object(&options)?))
            }
            Event::AudioStart(format) => {
                Frame::new(Envelope::new(event_type::AUDIO_START).with_data(to_object(&format)?))
            }
            Event::AudioChunk { format, audio } => {
                Frame::new(Envelope::new(event_type::AUDIO_CHUNK).with_data(to_object(&format)?))
                    .with_payload(audio)
            }
            Event::AudioStop => Frame::new(Envelope::new(event_type::AUDIO_STOP).with_data(Map::new())),
            Event::Transcript { text } => {
                let mut data = Map::new();
                data.insert("text".to_string(), Value::String(text));
                Frame::new(Envelope::new(event_type::TRANSCRIPT).with_data(data))
            }
            Event::Error { text, code } => {
                let mut data = Map::new();
                data.insert("text".to_string(), Value::String(text));
                if let Some(code) = code {
                    data.insert("code".to_string(), Value::String(code));
                }
                Frame::new(Envelope::new(event_type::ERROR).with_data(data))
            }
            Event::Other(name) => Frame::new(Envelope::new(name)),
        };
        Ok(frame)
    }

    /// Interpret a decoded frame.
    ///
    /// For `transcript`, text from the `data_length` section takes precedence
    /// over inline `data.text`.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let kind = frame.event_type().to_string();
        let event = match kind.as_str() {
            event_type::DESCRIBE => Event::Describe,
            event_type::INFO => {
                let mut info: ServiceInfo = from_object(&frame, frame.merged_data()?)?;
                if info.version.is_none() {
                    info.version = frame.envelope.version.clone();
                }
                Event::Info(info)
            }
            event_type::TRANSCRIBE => Event::Transcribe(from_object(&frame, frame.merged_data()?)?),
            event_type::AUDIO_START => Event::AudioStart(from_object(&frame, frame.merged_data()?)?),
            event_type::AUDIO_CHUNK => {
                let format = from_object(&frame, frame.merged_data()?)?;
                Event::AudioChunk {
                    format,
                    audio: frame.payload.unwrap_or_default(),
                }
            }
            event_type::AUDIO_STOP => Event::AudioStop,
            event_type::TRANSCRIPT => {
                let data = frame.merged_data()?;
                match data.get("text") {
                    Some(Value::String(text)) => Event::Transcript { text: text.clone() },
                    _ => return Err(WyomingError::violation("transcript carries no text")),
                }
            }
            event_type::ERROR => {
                let data = frame.merged_data()?;
                let field = |name: &str| data.get(name).and_then(Value::as_str).map(str::to_string);
                Event::Error {
                    text: field("text").unwrap_or_else(|| "unknown error".to_string()),
                    code: field("code"),
                }
            }
            other => Event::Other(other.to_string()),
        };
        Ok(event)
    }
}

fn to_object<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(WyomingError::framing(format!(
            "event data must be a JSON object, got {}",
            other
        ))),
        Err(e) => Err(WyomingError::framing(format!("Failed to serialize event data: {}", e))),
    }
}

fn from_object<T: DeserializeOwned>(frame: &Frame, data: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(data)).map_err(|e| {
        WyomingError::violation(format!("malformed {} data: {}", frame.event_type(), e))
    })
}
