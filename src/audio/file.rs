use super::convert::{decimate, samples_to_pcm, stereo_to_mono};
use crate::error::{Result, WyomingError};
use crate::protocol::AudioFormat;
use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::info;

/// Decoded 16-bit WAV audio.
///
/// The WAV header is consumed by the decoder; only samples are kept, so
/// nothing but raw PCM ever reaches the server.
#[derive(Debug)]
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)?;
        Self::decode(reader, path.display().to_string())
    }

    /// Decode a WAV file held in memory
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = WavReader::new(Cursor::new(bytes))?;
        Self::decode(reader, "<memory>".to_string())
    }

    fn decode<R: Read>(reader: WavReader<R>, path: String) -> Result<Self> {
        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != SampleFormat::Int {
            return Err(WyomingError::AudioFormatMismatch {
                expected: "16-bit integer PCM".to_string(),
                actual: format!("{}-bit {:?}", spec.bits_per_sample, spec.sample_format),
            });
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path,
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            rate: self.sample_rate,
            width: 2,
            channels: self.channels,
        }
    }

    /// Convert to raw PCM bytes in `target` format.
    ///
    /// Supports stereo → mono and integer-ratio downsampling (e.g. 48kHz → 16kHz).
    pub fn to_pcm(&self, target: AudioFormat) -> Result<Vec<u8>> {
        let mismatch = || WyomingError::AudioFormatMismatch {
            expected: target.to_string(),
            actual: self.format().to_string(),
        };

        if target.width != 2 {
            return Err(mismatch());
        }

        let samples = match (self.channels, target.channels) {
            (from, to) if from == to => self.samples.clone(),
            (2, 1) => stereo_to_mono(&self.samples),
            _ => return Err(mismatch()),
        };

        let samples = if self.sample_rate == target.rate {
            samples
        } else if target.rate > 0
            && self.sample_rate > target.rate
            && self.sample_rate % target.rate == 0
            && target.channels == 1
        {
            decimate(&samples, (self.sample_rate / target.rate) as usize)
        } else {
            return Err(mismatch());
        };

        Ok(samples_to_pcm(&samples))
    }
}
