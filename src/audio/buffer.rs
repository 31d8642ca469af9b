//! Generator buffer for decoded audio
//!
//! Holds interleaved samples decoded from the process together with the
//! metadata and track-break markers replayed on process exit. The stdout
//! hook is the only writer and the graph pull path the only reader. Its
//! size is bounded by backpressure, not by the buffer itself.

use std::collections::VecDeque;
use std::time::Duration;

use crate::audio::block::{frames_to_duration, AudioBlock, Metadata};

/// Marker embedded in the sample stream
#[derive(Debug, Clone, PartialEq)]
enum Marker {
    Metadata(Metadata),
    Break,
}

/// Audio samples plus markers positioned on absolute frame counts
pub struct Generator {
    samples: VecDeque<f32>,
    channels: u16,
    sample_rate: u32,
    /// Markers in append order, tagged with their absolute frame position
    markers: VecDeque<(u64, Marker)>,
    /// Absolute position of the first buffered frame
    read_pos: u64,
    /// Absolute position right after the last buffered frame
    write_pos: u64,
}

impl Generator {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            samples: VecDeque::new(),
            channels: channels.max(1),
            sample_rate,
            markers: VecDeque::new(),
            read_pos: 0,
            write_pos: 0,
        }
    }

    /// Append interleaved samples; a trailing partial frame is dropped
    pub fn append_audio(&mut self, samples: &[f32]) {
        let channels = self.channels as usize;
        let whole = samples.len() - samples.len() % channels;
        self.samples.extend(&samples[..whole]);
        self.write_pos += (whole / channels) as u64;
    }

    /// Append a metadata marker at the current write position
    pub fn append_metadata(&mut self, metadata: Metadata) {
        self.markers
            .push_back((self.write_pos, Marker::Metadata(metadata)));
    }

    /// Append a track break at the current write position
    pub fn append_break(&mut self) {
        self.markers.push_back((self.write_pos, Marker::Break));
    }

    /// Buffered frames
    pub fn length(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Buffered duration
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.length() as u64, self.sample_rate)
    }

    /// Check if no audio, metadata or track break is pending
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.markers.is_empty()
    }

    /// Number of pending markers (metadata and breaks)
    pub fn pending_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Read up to `max_frames` frames, stopping at the next track break.
    ///
    /// Metadata offsets in the returned block are relative to its start.
    /// Metadata sitting exactly on a break is emitted with the block that
    /// the break closes, and metadata at the end of the buffered audio with
    /// the block that drains it. Returns `None` when there is nothing to read.
    pub fn get(&mut self, max_frames: usize) -> Option<AudioBlock> {
        let available = self.length() as u64;
        let next_break = self
            .markers
            .iter()
            .find(|(_, m)| *m == Marker::Break)
            .map(|(pos, _)| *pos);

        let mut frames = available.min(max_frames as u64);
        let mut ends_track = false;
        if let Some(pos) = next_break {
            let until_break = pos.saturating_sub(self.read_pos);
            if until_break <= frames {
                frames = until_break;
                ends_track = true;
            }
        }

        // Metadata at the end of the readable audio goes with the block that
        // drains it
        let drains = frames == available;
        let end = self.read_pos + frames;
        let mut metadata = Vec::new();
        while let Some((pos, marker)) = self.markers.front() {
            let take = *pos < end || (*pos == end && (ends_track || drains));
            if !take {
                break;
            }
            let offset = pos.saturating_sub(self.read_pos) as usize;
            let is_break = *marker == Marker::Break;
            if let Some((_, Marker::Metadata(m))) = self.markers.pop_front() {
                metadata.push((offset, m));
            }
            if is_break {
                break;
            }
        }

        if frames == 0 && !ends_track && metadata.is_empty() {
            return None;
        }

        let count = frames as usize * self.channels as usize;
        let samples: Vec<f32> = self.samples.drain(..count).collect();
        self.read_pos = end;

        Some(AudioBlock {
            samples,
            channels: self.channels,
            metadata,
            ends_track,
        })
    }

    /// Drop all buffered audio and markers
    pub fn clear(&mut self) {
        self.samples.clear();
        self.markers.clear();
        self.read_pos = self.write_pos;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::block::metadata;

    #[test]
    fn test_generator_basic() {
        let mut gen = Generator::new(2, 44100);
        gen.append_audio(&[0.5; 8]);
        assert_eq!(gen.length(), 4);

        let block = gen.get(3).unwrap();
        assert_eq!(block.frames(), 3);
        assert!(!block.ends_track);
        assert_eq!(gen.length(), 1);

        let block = gen.get(10).unwrap();
        assert_eq!(block.frames(), 1);
        assert!(gen.get(10).is_none());
    }

    #[test]
    fn test_partial_frame_dropped() {
        let mut gen = Generator::new(2, 44100);
        gen.append_audio(&[0.1, 0.2, 0.3]);
        assert_eq!(gen.length(), 1);
    }

    #[test]
    fn test_get_stops_at_break() {
        let mut gen = Generator::new(1, 100);
        gen.append_audio(&[0.0; 5]);
        gen.append_break();
        gen.append_audio(&[0.0; 5]);

        let first = gen.get(100).unwrap();
        assert_eq!(first.frames(), 5);
        assert!(first.ends_track);

        let second = gen.get(100).unwrap();
        assert_eq!(second.frames(), 5);
        assert!(!second.ends_track);
    }

    #[test]
    fn test_metadata_offsets_relative_to_block() {
        let mut gen = Generator::new(1, 100);
        gen.append_audio(&[0.0; 10]);
        gen.append_metadata(metadata([("title", "next")]));
        gen.append_audio(&[0.0; 10]);

        let first = gen.get(6).unwrap();
        assert!(first.metadata.is_empty());

        let second = gen.get(100).unwrap();
        assert_eq!(second.metadata.len(), 1);
        assert_eq!(second.metadata[0].0, 4);
        assert_eq!(second.metadata[0].1["title"], "next");
    }

    #[test]
    fn test_metadata_on_break_closes_with_track() {
        let mut gen = Generator::new(1, 100);
        gen.append_audio(&[0.0; 4]);
        gen.append_metadata(metadata([("title", "end")]));
        gen.append_break();

        let block = gen.get(100).unwrap();
        assert!(block.ends_track);
        assert_eq!(block.metadata.len(), 1);
        assert_eq!(block.metadata[0].0, 4);
        assert_eq!(gen.pending_markers(), 0);
    }

    #[test]
    fn test_trailing_metadata_not_stranded() {
        let mut gen = Generator::new(2, 100);
        gen.append_audio(&[0.0; 8]);
        gen.append_metadata(metadata([("title", "tail")]));
        assert!(!gen.is_empty());

        let first = gen.get(3).unwrap();
        assert!(first.metadata.is_empty());

        let last = gen.get(100).unwrap();
        assert_eq!(last.frames(), 1);
        assert_eq!(last.metadata.len(), 1);
        assert_eq!(last.metadata[0].0, 1);
        assert!(gen.is_empty());
        assert!(gen.get(100).is_none());
    }

    #[test]
    fn test_metadata_alone_yields_empty_block() {
        let mut gen = Generator::new(2, 100);
        gen.append_metadata(metadata([("title", "only")]));
        assert!(!gen.is_empty());

        let block = gen.get(10).unwrap();
        assert_eq!(block.frames(), 0);
        assert!(!block.ends_track);
        assert_eq!(block.metadata[0].0, 0);
        assert!(gen.is_empty());
    }

    #[test]
    fn test_lone_break_yields_empty_block() {
        let mut gen = Generator::new(2, 100);
        gen.append_break();
        assert!(!gen.is_empty());

        let block = gen.get(10).unwrap();
        assert_eq!(block.frames(), 0);
        assert!(block.ends_track);
        assert!(gen.is_empty());
    }

    #[test]
    fn test_duration() {
        let mut gen = Generator::new(2, 44100);
        gen.append_audio(&vec![0.0; 44100 * 2]);
        assert_eq!(gen.duration(), Duration::from_secs(1));
    }
}
