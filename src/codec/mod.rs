//! PCM codec
//!
//! Frames graph audio into s16le chunks for the process and decodes
//! the process output back into samples.

pub mod chunk;
pub mod decoder;
pub mod encoder;

pub use chunk::{Chunk, ChunkQueue, Disposition};
pub use decoder::PcmDecoder;
pub use encoder::PcmEncoder;
