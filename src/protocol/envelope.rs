use crate::error::{Result, WyomingError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Header line of a Wyoming message.
///
/// Serialized as one compact JSON object per line. `data_length` and
/// `payload_length` announce how many raw bytes follow the line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Length of a JSON object that follows the line and extends `data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_length: Option<u64>,

    /// Length of the binary payload (after the data bytes, if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Envelope {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: None,
            data_length: None,
            payload_length: None,
            version: None,
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }
}

/// One complete message: header plus the bytes it declared.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub envelope: Envelope,

    /// `data_length` bytes holding a JSON object
    pub data_bytes: Option<Vec<u8>>,

    /// `payload_length` bytes of binary payload (PCM audio for `audio-chunk`)
    pub payload: Option<Vec<u8>>,
}

impl Frame {
    pub fn new(envelope: Envelope) -> Self {
        Self {
            envelope,
            data_bytes: None,
            payload: None,
        }
    }

    pub fn with_data_bytes(mut self, data_bytes: Vec<u8>) -> Self {
        self.data_bytes = Some(data_bytes);
        self
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn event_type(&self) -> &str {
        &self.envelope.event_type
    }

    /// Inline `data` overlaid with the fields of the trailing data bytes.
    ///
    /// Fields from the data bytes win, so a server that sends the text in
    /// both places is read from the `data_length` section.
    pub fn merged_data(&self) -> Result<Map<String, Value>> {
        let mut merged = self.envelope.data.clone().unwrap_or_default();

        if let Some(bytes) = &self.data_bytes {
            let extra: Map<String, Value> = serde_json::from_slice(bytes).map_err(|e| {
                WyomingError::framing(format!(
                    "{} data section is not a JSON object: {}",
                    self.envelope.event_type, e
                ))
            })?;
            merged.extend(extra);
        }

        Ok(merged)
    }
}
