//! Audio blocks exchanged with the graph

use std::collections::BTreeMap;
use std::time::Duration;

/// Metadata event payload (e.g. `title`, `artist`)
pub type Metadata = BTreeMap<String, String>;

/// Build metadata from key/value pairs
pub fn metadata<K, V, I>(pairs: I) -> Metadata
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A block of interleaved audio with its embedded events
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
    /// Metadata events tagged with a frame offset inside the block
    pub metadata: Vec<(usize, Metadata)>,
    /// Whether the block closes the current track
    pub ends_track: bool,
}

impl AudioBlock {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        Self {
            samples,
            channels,
            metadata: Vec::new(),
            ends_track: false,
        }
    }

    /// Block of `frames` frames of silence
    pub fn silence(frames: usize, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], channels)
    }

    /// Attach a metadata event at `offset` frames
    pub fn with_metadata(mut self, offset: usize, metadata: Metadata) -> Self {
        self.metadata.push((offset, metadata));
        self.metadata.sort_by_key(|(offset, _)| *offset);
        self
    }

    /// Mark the block as the last one of its track
    pub fn ending_track(mut self) -> Self {
        self.ends_track = true;
        self
    }

    /// Get number of samples per channel
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Get block duration at the given sample rate
    pub fn duration(&self, sample_rate: u32) -> Duration {
        frames_to_duration(self.frames() as u64, sample_rate)
    }
}

/// Convert a frame count to a duration, exact to the nanosecond
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let nanos = frames as u128 * 1_000_000_000 / sample_rate as u128;
    Duration::from_nanos(nanos as u64)
}

/// Convert a duration to a frame count, rounding down
pub fn duration_to_frames(duration: Duration, sample_rate: u32) -> u64 {
    (duration.as_nanos() * sample_rate as u128 / 1_000_000_000) as u64
}
