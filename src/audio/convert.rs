use crate::error::{Result, WyomingError};

/// Average interleaved stereo samples into mono.
pub fn stereo_to_mono(samples: &[i16]) -> Vec<i16> {
    samples
        .chunks_exact(2)
        .map(|pair| ((pair[0] as i32 + pair[1] as i32) / 2) as i16)
        .collect()
}

/// Downsample mono audio by keeping every `ratio`-th sample.
pub fn decimate(samples: &[i16], ratio: usize) -> Vec<i16> {
    if ratio <= 1 {
        return samples.to_vec();
    }
    samples.iter().step_by(ratio).copied().collect()
}

/// Encode samples as PCM s16le bytes.
pub fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Split PCM audio into `chunk_size`-byte pieces; the last may be shorter.
pub fn chunks(pcm: &[u8], chunk_size: usize) -> Result<std::slice::Chunks<'_, u8>> {
    validate_chunk_size(chunk_size)?;
    Ok(pcm.chunks(chunk_size))
}

pub fn validate_chunk_size(chunk_size: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(WyomingError::ConfigInvalidValue {
            key: "chunk_size".to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

/// Number of `audio-chunk` messages needed for `len` bytes.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    if chunk_size == 0 {
        return 0;
    }
    len.div_ceil(chunk_size)
}
