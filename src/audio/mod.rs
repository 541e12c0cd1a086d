pub mod convert;
pub mod file;

pub use convert::{
    chunk_count, chunks, decimate, samples_to_pcm, stereo_to_mono,
    validate_chunk_size,
};
pub use file::AudioFile;
