//! PCM decoder for process output
//!
//! Decodes s16le bytes back to f32 samples. Reads may split frames at any
//! byte, so incomplete frames are carried over to the next call. A process
//! that answers with a WAV stream has its RIFF header skipped first.

use bytes::{Buf, BytesMut};

use crate::config::AudioFormat;
use crate::error::CodecError;

/// Longest RIFF header accepted before the `data` chunk
pub const MAX_HEADER_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    /// Not enough bytes yet to tell raw PCM from WAV
    Sniffing,
    /// Inside a RIFF header, before the `data` chunk
    InHeader,
    /// Raw PCM
    Pcm,
}

/// Stateful s16le decoder for one process generation
pub struct PcmDecoder {
    format: AudioFormat,
    state: HeaderState,
    pending: BytesMut,
    /// Frames decoded
    frames_decoded: u64,
    /// WAV headers skipped
    headers_skipped: u64,
}

impl PcmDecoder {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            state: HeaderState::Sniffing,
            pending: BytesMut::new(),
            frames_decoded: 0,
            headers_skipped: 0,
        }
    }

    /// Forget carried bytes and expect a possible header again
    pub fn reset(&mut self) {
        self.state = HeaderState::Sniffing;
        self.pending.clear();
    }

    /// Bytes carried over, waiting for the rest of a frame or header
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode bytes into interleaved samples.
    ///
    /// On a malformed or mismatched header the decoder falls back to raw
    /// PCM for the rest of the generation and reports the error once.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        self.pending.extend_from_slice(data);

        if self.state == HeaderState::Sniffing {
            let probe = self.pending.len().min(4);
            if self.pending[..probe] != b"RIFF"[..probe] {
                self.state = HeaderState::Pcm;
            } else if probe == 4 {
                self.state = HeaderState::InHeader;
            } else {
                return Ok(Vec::new());
            }
        }

        if self.state == HeaderState::InHeader {
            match self.parse_header() {
                Ok(true) => {
                    self.state = HeaderState::Pcm;
                    self.headers_skipped += 1;
                }
                Ok(false) => return Ok(Vec::new()),
                Err(e) => {
                    self.state = HeaderState::Pcm;
                    self.pending.clear();
                    return Err(e);
                }
            }
        }

        let bytes_per_frame = self.format.bytes_per_frame();
        let whole = self.pending.len() - self.pending.len() % bytes_per_frame;
        let mut frame_bytes = self.pending.split_to(whole);
        let mut samples = Vec::with_capacity(whole / 2);
        while frame_bytes.has_remaining() {
            samples.push(frame_bytes.get_i16_le() as f32 / 32768.0);
        }
        self.frames_decoded += (whole / bytes_per_frame) as u64;
        Ok(samples)
    }

    /// Consume the RIFF header up to the start of the `data` chunk.
    ///
    /// Returns `Ok(false)` when more bytes are needed. Nothing is consumed
    /// until the whole header is available. Headers longer than
    /// [`MAX_HEADER_LEN`] are rejected.
    fn parse_header(&mut self) -> Result<bool, CodecError> {
        let buf = &self.pending[..];
        if buf.len() < 12 {
            return Ok(false);
        }
        if &buf[8..12] != b"WAVE" {
            return Err(CodecError::InvalidHeader("missing WAVE tag".into()));
        }

        let mut pos = 12;
        loop {
            if pos + 8 > MAX_HEADER_LEN {
                return Err(CodecError::InvalidHeader(format!(
                    "no data chunk within {} bytes",
                    MAX_HEADER_LEN
                )));
            }
            if buf.len() < pos + 8 {
                return Ok(false);
            }
            let id = &buf[pos..pos + 4];
            let size = u32::from_le_bytes([buf[pos + 4], buf[pos + 5], buf[pos + 6], buf[pos + 7]]);
            pos += 8;

            if id == b"data" {
                self.pending.advance(pos);
                return Ok(true);
            }

            let body_len = size as usize + (size as usize & 1);
            if pos + body_len > MAX_HEADER_LEN {
                return Err(CodecError::InvalidHeader(format!(
                    "{} chunk of {} bytes exceeds the header limit",
                    String::from_utf8_lossy(id),
                    size
                )));
            }
            if buf.len() < pos + body_len {
                return Ok(false);
            }
            if id == b"fmt " {
                self.check_fmt(&buf[pos..pos + size as usize])?;
            }
            pos += body_len;
        }
    }

    fn check_fmt(&self, fmt: &[u8]) -> Result<(), CodecError> {
        if fmt.len() < 16 {
            return Err(CodecError::InvalidHeader(format!(
                "fmt chunk too short: {} bytes",
                fmt.len()
            )));
        }
        let mut fmt = fmt;
        let tag = fmt.get_u16_le();
        let channels = fmt.get_u16_le();
        let rate = fmt.get_u32_le();
        fmt.advance(6);
        let bits = fmt.get_u16_le();

        if tag != 1 && tag != 0xFFFE {
            return Err(CodecError::UnsupportedFormat(format!("format tag {}", tag)));
        }
        if bits != 16 {
            return Err(CodecError::UnsupportedFormat(format!("{} bits per sample", bits)));
        }
        if channels != self.format.channels || rate != self.format.sample_rate {
            return Err(CodecError::UnsupportedFormat(format!(
                "{} Hz / {} channels, expected {} Hz / {} channels",
                rate, channels, self.format.sample_rate, self.format.channels
            )));
        }
        Ok(())
    }

    /// Get statistics
    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            headers_skipped: self.headers_skipped,
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub headers_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::{encode_samples, PcmEncoder};

    fn format() -> AudioFormat {
        AudioFormat {
            sample_rate: 44100,
            channels: 2,
        }
    }

    #[test]
    fn test_decode_raw_pcm() {
        let mut decoder = PcmDecoder::new(format());
        let samples = decoder.decode(&encode_samples(&[0.0, 0.5, -0.5, 0.0])).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!((samples[2] + 0.5).abs() < 1e-3);
        assert_eq!(decoder.stats().frames_decoded, 2);
        assert_eq!(decoder.stats().headers_skipped, 0);
    }

    #[test]
    fn test_odd_splits_match_whole_read() {
        let input: Vec<f32> = (0..64).map(|i| (i as f32 / 64.0) - 0.5).collect();
        let bytes = encode_samples(&input);

        let mut whole = PcmDecoder::new(format());
        let expected = whole.decode(&bytes).unwrap();

        let mut split = PcmDecoder::new(format());
        let mut got = Vec::new();
        for piece in bytes.chunks(7) {
            got.extend(split.decode(piece).unwrap());
        }
        assert_eq!(got, expected);
        assert_eq!(split.pending_len(), 0);
    }

    #[test]
    fn test_wav_header_skipped() {
        let encoder = PcmEncoder::new(format());
        let mut stream = encoder.wav_header().to_vec();
        stream.extend_from_slice(&encode_samples(&[0.25; 8]));

        let mut decoder = PcmDecoder::new(format());
        let mut got = Vec::new();
        for piece in stream.chunks(3) {
            got.extend(decoder.decode(piece).unwrap());
        }
        assert_eq!(got.len(), 8);
        assert_eq!(decoder.stats().headers_skipped, 1);
    }

    #[test]
    fn test_mismatched_header_reported() {
        let other = PcmEncoder::new(AudioFormat {
            sample_rate: 48000,
            channels: 2,
        });
        let mut decoder = PcmDecoder::new(format());
        let err = decoder.decode(&other.wav_header()).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFormat(_)));

        // Falls back to raw PCM afterwards
        let samples = decoder.decode(&encode_samples(&[0.0, 0.0])).unwrap();
        assert_eq!(samples.len(), 2);
    }

    #[test]
    fn test_reset_expects_new_header() {
        let encoder = PcmEncoder::new(format());
        let mut decoder = PcmDecoder::new(format());
        decoder.decode(&encoder.wav_header()).unwrap();
        decoder.decode(&[1]).unwrap();
        assert_eq!(decoder.pending_len(), 1);

        decoder.reset();
        assert_eq!(decoder.pending_len(), 0);
        assert!(decoder.decode(&encoder.wav_header()).unwrap().is_empty());
        assert_eq!(decoder.stats().headers_skipped, 2);
    }

    #[test]
    fn test_oversized_header_chunk_rejected() {
        let mut header = Vec::new();
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        header.extend_from_slice(b"LIST");
        header.extend_from_slice(&u32::MAX.to_le_bytes());

        let mut decoder = PcmDecoder::new(format());
        let err = decoder.decode(&header).unwrap_err();
        assert!(matches!(err, CodecError::InvalidHeader(_)));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_header_without_data_chunk_bounded() {
        let mut decoder = PcmDecoder::new(format());
        let mut header = Vec::new();
        header.extend_from_slice(b"RIFF");
        header.extend_from_slice(&u32::MAX.to_le_bytes());
        header.extend_from_slice(b"WAVE");
        assert!(decoder.decode(&header).unwrap().is_empty());

        // Small filler chunks, never a data chunk
        let mut result = Ok(Vec::new());
        for _ in 0..MAX_HEADER_LEN / 16 + 1 {
            let mut filler = b"junk".to_vec();
            filler.extend_from_slice(&8u32.to_le_bytes());
            filler.extend_from_slice(&[0; 8]);
            result = decoder.decode(&filler);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(CodecError::InvalidHeader(_))));
        assert!(decoder.pending_len() <= MAX_HEADER_LEN);
    }
}
