// Integration tests for audio file processing
//
// These tests verify that WAV files are read correctly and turned into the
// raw PCM stream a Wyoming server expects.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use wyoming_client::audio::{chunk_count, chunks};
use wyoming_client::{AudioFile, AudioFormat, WyomingError};

fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("speech.wav");
    write_wav(&path, 16000, 1, &vec![0i16; 8000])?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert_eq!(audio.duration_seconds, 0.5);
    assert!(audio.path.contains("speech.wav"));

    Ok(())
}

#[test]
fn test_pcm_matches_wav_body() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("ramp.wav");
    let samples: Vec<i16> = (0..1000).map(|i| (i * 7 - 3500) as i16).collect();
    write_wav(&path, 16000, 1, &samples)?;

    let pcm = AudioFile::open(&path)?.to_pcm(AudioFormat::default())?;
    let file_bytes = std::fs::read(&path)?;

    // Canonical PCM WAV: 44-byte header, then the samples
    assert_eq!(pcm.len(), 2000);
    assert_eq!(pcm.as_slice(), &file_bytes[44..]);

    Ok(())
}

#[test]
fn test_ten_second_clip_chunking() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("ten-seconds.wav");
    write_wav(&path, 16000, 1, &vec![100i16; 160_000])?;

    let pcm = AudioFile::open(&path)?.to_pcm(AudioFormat::default())?;

    assert_eq!(pcm.len(), 320_000);
    assert_eq!(chunk_count(pcm.len(), 4096), 79);
    assert_eq!(chunks(&pcm, 4096)?.count(), 79);

    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_unsupported_conversion() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let path = temp_dir.path().join("surround.wav");
    write_wav(&path, 16000, 4, &vec![0i16; 400])?;

    let err = AudioFile::open(&path)?
        .to_pcm(AudioFormat::default())
        .unwrap_err();

    assert!(matches!(err, WyomingError::AudioFormatMismatch { .. }));

    Ok(())
}
