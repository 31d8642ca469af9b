//! Upstream sources feeding the operator
//!
//! The operator pulls its input out-of-band, on the schedule of the
//! external process rather than the graph tick, so sources are plain
//! pull interfaces with a post-output hook.

use std::collections::VecDeque;

use crate::audio::block::{metadata, AudioBlock};

/// A pullable upstream source
pub trait Source: Send {
    /// Whether a block can be pulled right now
    fn is_ready(&self) -> bool;

    /// Pull the next block, `None` if nothing is available
    fn pull_block(&mut self) -> Option<AudioBlock>;

    /// Skip the rest of the current track
    fn abort_track(&mut self) {}

    /// Hook run once the pulling clock has ended a tick
    fn after_output(&mut self) {}
}

impl<S: Source + ?Sized> Source for Box<S> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn pull_block(&mut self) -> Option<AudioBlock> {
        (**self).pull_block()
    }

    fn abort_track(&mut self) {
        (**self).abort_track()
    }

    fn after_output(&mut self) {
        (**self).after_output()
    }
}

/// Source replaying a fixed list of blocks
#[derive(Default)]
pub struct BlockQueue {
    blocks: VecDeque<AudioBlock>,
    aborted_tracks: usize,
    outputs: u64,
}

impl BlockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, block: AudioBlock) {
        self.blocks.push_back(block);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of `abort_track` calls received
    pub fn aborted_tracks(&self) -> usize {
        self.aborted_tracks
    }

    /// Number of `after_output` calls received
    pub fn outputs(&self) -> u64 {
        self.outputs
    }
}

impl FromIterator<AudioBlock> for BlockQueue {
    fn from_iter<I: IntoIterator<Item = AudioBlock>>(iter: I) -> Self {
        Self {
            blocks: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Source for BlockQueue {
    fn is_ready(&self) -> bool {
        !self.blocks.is_empty()
    }

    fn pull_block(&mut self) -> Option<AudioBlock> {
        self.blocks.pop_front()
    }

    /// Drop queued blocks up to and including the next track end
    fn abort_track(&mut self) {
        self.aborted_tracks += 1;
        while let Some(block) = self.blocks.pop_front() {
            if block.ends_track {
                break;
            }
        }
    }

    fn after_output(&mut self) {
        self.outputs += 1;
    }
}

/// Endless sine tone, tagging a new track every `blocks_per_track` blocks
pub struct ToneSource {
    frequency: f32,
    amplitude: f32,
    sample_rate: u32,
    channels: u16,
    frames_per_block: usize,
    blocks_per_track: u32,
    /// Current sequence number
    sequence: u32,
    phase: f32,
}

impl ToneSource {
    pub fn new(
        frequency: f32,
        sample_rate: u32,
        channels: u16,
        frames_per_block: usize,
        blocks_per_track: u32,
    ) -> Self {
        Self {
            frequency,
            amplitude: 0.5,
            sample_rate,
            channels,
            frames_per_block,
            blocks_per_track: blocks_per_track.max(1),
            sequence: 0,
            phase: 0.0,
        }
    }

    /// Get current sequence number
    pub fn current_sequence(&self) -> u32 {
        self.sequence
    }
}

impl Source for ToneSource {
    fn is_ready(&self) -> bool {
        true
    }

    fn pull_block(&mut self) -> Option<AudioBlock> {
        let step = self.frequency * 2.0 * std::f32::consts::PI / self.sample_rate as f32;
        let mut samples = Vec::with_capacity(self.frames_per_block * self.channels as usize);
        for _ in 0..self.frames_per_block {
            let value = self.phase.sin() * self.amplitude;
            for _ in 0..self.channels {
                samples.push(value);
            }
            self.phase = (self.phase + step) % (2.0 * std::f32::consts::PI);
        }

        let mut block = AudioBlock::new(samples, self.channels);
        let seq = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        if seq % self.blocks_per_track == 0 {
            let track = seq / self.blocks_per_track;
            block = block.with_metadata(0, metadata([("title", format!("tone {}", track))]));
        }
        if (seq + 1) % self.blocks_per_track == 0 {
            block = block.ending_track();
        }
        Some(block)
    }

    fn abort_track(&mut self) {
        let into_track = self.sequence % self.blocks_per_track;
        if into_track != 0 {
            self.sequence += self.blocks_per_track - into_track;
        }
    }
}
