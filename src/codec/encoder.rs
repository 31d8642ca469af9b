//! PCM framer
//!
//! Turns pulled audio blocks into s16le byte chunks, one chunk per
//! metadata event plus one for trailing audio, each tagged with what to do
//! once the process has consumed it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::audio::AudioBlock;
use crate::codec::chunk::{Chunk, Disposition};
use crate::config::AudioFormat;
use crate::error::CodecError;

/// Size of the streaming WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// PCM framer with statistics
pub struct PcmEncoder {
    format: AudioFormat,
    /// Blocks framed
    blocks_framed: u64,
    /// Total bytes produced
    bytes_produced: u64,
}

impl PcmEncoder {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            blocks_framed: 0,
            bytes_produced: 0,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// WAV header announcing an unbounded 16-bit PCM stream
    pub fn wav_header(&self) -> Bytes {
        let channels = self.format.channels;
        let rate = self.format.sample_rate;
        let block_align = channels * 2;
        let byte_rate = rate * block_align as u32;

        let mut header = BytesMut::with_capacity(WAV_HEADER_LEN);
        header.put_slice(b"RIFF");
        header.put_u32_le(u32::MAX);
        header.put_slice(b"WAVE");
        header.put_slice(b"fmt ");
        header.put_u32_le(16);
        header.put_u16_le(1); // PCM
        header.put_u16_le(channels);
        header.put_u32_le(rate);
        header.put_u32_le(byte_rate);
        header.put_u16_le(block_align);
        header.put_u16_le(16);
        header.put_slice(b"data");
        header.put_u32_le(u32::MAX);
        header.freeze()
    }

    /// Frame one block into chunks, in offset order.
    ///
    /// Chunk lengths sum to `2 * frames * channels`. Metadata offsets past
    /// the block end are clamped to it.
    pub fn frame(&mut self, block: &AudioBlock) -> Result<Vec<Chunk>, CodecError> {
        if block.channels != self.format.channels {
            return Err(CodecError::InvalidChannels(block.channels));
        }

        let frames = block.frames();
        let bytes_per_frame = self.format.bytes_per_frame();
        let pcm = encode_samples(&block.samples[..frames * block.channels as usize]);

        let mut chunks = Vec::with_capacity(block.metadata.len() + 1);
        let mut start = 0usize;
        for (offset, metadata) in &block.metadata {
            let offset = (*offset).clamp(start, frames);
            let data = pcm.slice(start * bytes_per_frame..offset * bytes_per_frame);
            let disposition = if offset == frames && block.ends_track {
                Disposition::MetadataAndBreak(metadata.clone())
            } else {
                Disposition::Metadata(metadata.clone())
            };
            chunks.push(Chunk::new(data, disposition));
            start = offset;
        }

        if start < frames || (block.metadata.is_empty() && block.ends_track) {
            let data = pcm.slice(start * bytes_per_frame..);
            let disposition = if block.ends_track {
                Disposition::Break
            } else {
                Disposition::Nothing
            };
            chunks.push(Chunk::new(data, disposition));
        }

        self.blocks_framed += 1;
        self.bytes_produced += pcm.len() as u64;
        Ok(chunks)
    }

    /// Get statistics
    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            blocks_framed: self.blocks_framed,
            bytes_produced: self.bytes_produced,
        }
    }
}

/// Convert interleaved f32 samples to s16le bytes
pub fn encode_samples(samples: &[f32]) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * 2);
    for sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        out.put_i16_le(value);
    }
    out.freeze()
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub blocks_framed: u64,
    pub bytes_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::metadata;
    use proptest::prelude::*;

    fn encoder() -> PcmEncoder {
        PcmEncoder::new(AudioFormat {
            sample_rate: 44100,
            channels: 2,
        })
    }

    #[test]
    fn test_wav_header() {
        let header = encoder().wav_header();
        assert_eq!(header.len(), WAV_HEADER_LEN);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..16], b"WAVEfmt ");
        assert_eq!(u16::from_le_bytes([header[22], header[23]]), 2);
        assert_eq!(
            u32::from_le_bytes([header[24], header[25], header[26], header[27]]),
            44100
        );
        assert_eq!(u16::from_le_bytes([header[34], header[35]]), 16);
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn test_sample_conversion() {
        let bytes = encode_samples(&[0.0, 1.0, -1.0, 2.0]);
        let values: Vec<i16> = bytes
            .chunks(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(values, vec![0, 32767, -32767, 32767]);
    }

    #[test]
    fn test_plain_block_is_one_chunk() {
        let chunks = encoder().frame(&AudioBlock::silence(100, 2)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 400);
        assert_eq!(chunks[0].disposition(), &Disposition::Nothing);
    }

    #[test]
    fn test_track_end_without_metadata_is_break() {
        let chunks = encoder()
            .frame(&AudioBlock::silence(10, 2).ending_track())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].disposition(), &Disposition::Break);
    }

    #[test]
    fn test_empty_track_end_still_breaks() {
        let chunks = encoder()
            .frame(&AudioBlock::silence(0, 2).ending_track())
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
        assert_eq!(chunks[0].disposition(), &Disposition::Break);
    }

    #[test]
    fn test_metadata_at_end_of_track() {
        let m = metadata([("title", "x")]);
        let block = AudioBlock::silence(10, 2)
            .with_metadata(10, m.clone())
            .ending_track();
        let chunks = encoder().frame(&block).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].disposition(), &Disposition::MetadataAndBreak(m));
    }

    #[test]
    fn test_metadata_splits_block() {
        let block = AudioBlock::silence(10, 2)
            .with_metadata(0, metadata([("n", "0")]))
            .with_metadata(4, metadata([("n", "4")]))
            .ending_track();
        let chunks = encoder().frame(&block).unwrap();
        let lens: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(lens, vec![0, 16, 24]);
        assert!(matches!(chunks[0].disposition(), Disposition::Metadata(_)));
        assert!(matches!(chunks[1].disposition(), Disposition::Metadata(_)));
        assert_eq!(chunks[2].disposition(), &Disposition::Break);
    }

    #[test]
    fn test_channel_mismatch() {
        let err = encoder().frame(&AudioBlock::silence(4, 1)).unwrap_err();
        assert_eq!(err, CodecError::InvalidChannels(1));
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_block(
            frames in 0usize..2000,
            raw_offsets in proptest::collection::btree_set(0usize..2000, 0..8),
            ends_track in any::<bool>(),
        ) {
            let offsets: Vec<usize> = raw_offsets.into_iter().filter(|o| *o <= frames).collect();
            let mut block = AudioBlock::silence(frames, 2);
            for (i, offset) in offsets.iter().enumerate() {
                block = block.with_metadata(*offset, metadata([("i", i.to_string())]));
            }
            block.ends_track = ends_track;

            let chunks = encoder().frame(&block).unwrap();
            let last = offsets.last().copied();
            let trailing = match last {
                Some(o) => o < frames,
                None => frames > 0 || ends_track,
            };
            prop_assert_eq!(chunks.len(), offsets.len() + trailing as usize);

            let total: usize = chunks.iter().map(Chunk::len).sum();
            prop_assert_eq!(total, 2 * frames * 2);

            for (chunk, offset) in chunks.iter().zip(&offsets) {
                let expect_break = ends_track && *offset == frames;
                prop_assert_eq!(
                    matches!(chunk.disposition(), Disposition::MetadataAndBreak(_)),
                    expect_break
                );
            }
        }
    }
}
