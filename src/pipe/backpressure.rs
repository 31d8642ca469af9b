//! Backpressure on process output
//!
//! When decoded audio waiting for the graph exceeds the ceiling, stdout
//! reads are paused for as long as the overflow lasts. Nothing is dropped.

use std::time::Duration;

use crate::audio::block::{duration_to_frames, frames_to_duration};
use crate::pipe::Directive;

pub struct Backpressure {
    max_frames: u64,
    sample_rate: u32,
}

impl Backpressure {
    pub fn new(max: Duration, sample_rate: u32) -> Self {
        Self {
            max_frames: duration_to_frames(max, sample_rate),
            sample_rate,
        }
    }

    /// Ceiling in frames
    pub fn max_frames(&self) -> u64 {
        self.max_frames
    }

    /// Overflow duration for `buffered` frames, if above the ceiling
    pub fn excess(&self, buffered: usize) -> Option<Duration> {
        let buffered = buffered as u64;
        (buffered > self.max_frames)
            .then(|| frames_to_duration(buffered - self.max_frames, self.sample_rate))
    }

    pub fn check(&self, buffered: usize) -> Directive {
        match self.excess(buffered) {
            Some(delay) => Directive::Delay(delay),
            None => Directive::Continue,
        }
    }
}
