//! State shared between the graph side and the process I/O task

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::{Generator, Source};
use crate::config::AudioFormat;
use crate::pipe::restart::ProcessState;

pub struct Shared {
    pub generator: Mutex<Generator>,
    pub upstream: Mutex<Box<dyn Source>>,
    state: Mutex<StateCell>,
    counters: Counters,
}

/// Process state tagged with the driver that owns it
#[derive(Debug, Clone, Copy)]
struct StateCell {
    epoch: u64,
    state: ProcessState,
}

#[derive(Default)]
struct Counters {
    bytes_written: AtomicU64,
    bytes_read: AtomicU64,
    generations: AtomicU64,
    restarts: AtomicU64,
    delays: AtomicU64,
}

impl Shared {
    pub fn new(format: AudioFormat, upstream: Box<dyn Source>) -> Self {
        Self {
            generator: Mutex::new(Generator::new(format.channels, format.sample_rate)),
            upstream: Mutex::new(upstream),
            state: Mutex::new(StateCell {
                epoch: 0,
                state: ProcessState::NoProcess,
            }),
            counters: Counters::default(),
        }
    }

    /// Hand the state to a new driver. Updates from earlier drivers are
    /// ignored from now on.
    pub fn begin_epoch(&self) -> u64 {
        let mut cell = self.state.lock();
        cell.epoch += 1;
        cell.state = ProcessState::Starting;
        cell.epoch
    }

    /// Update the state if `epoch` still owns it
    pub fn set_state_for(&self, epoch: u64, state: ProcessState) -> bool {
        let mut cell = self.state.lock();
        if cell.epoch != epoch {
            return false;
        }
        cell.state = state;
        true
    }

    pub fn set_state(&self, state: ProcessState) {
        self.state.lock().state = state;
    }

    pub fn state(&self) -> ProcessState {
        self.state.lock().state
    }

    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    pub(crate) fn add_written(&self, n: usize) {
        self.counters
            .bytes_written
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_read(&self, n: usize) {
        self.counters.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn count_generation(&self) {
        self.counters.generations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_restart(&self) {
        self.counters.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_delay(&self) {
        self.counters.delays.fetch_add(1, Ordering::Relaxed);
    }

    /// Get statistics
    pub fn stats(&self) -> PipeStats {
        PipeStats {
            bytes_written: self.counters.bytes_written.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            generations: self.counters.generations.load(Ordering::Relaxed),
            restarts: self.counters.restarts.load(Ordering::Relaxed),
            delays: self.counters.delays.load(Ordering::Relaxed),
            buffered_frames: self.generator.lock().length(),
        }
    }
}

/// Operator statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PipeStats {
    /// Bytes accepted by the process's stdin, headers included
    pub bytes_written: u64,
    /// Bytes read from the process's stdout
    pub bytes_read: u64,
    /// Process generations started
    pub generations: u64,
    pub restarts: u64,
    /// Stdout pauses requested by backpressure
    pub delays: u64,
    pub buffered_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BlockQueue;
    use crate::config::AudioFormat;

    #[test]
    fn test_stale_epoch_cannot_change_state() {
        let shared = Shared::new(AudioFormat::default(), Box::new(BlockQueue::new()));
        let old = shared.begin_epoch();
        assert!(shared.set_state_for(old, ProcessState::Running));

        let new = shared.begin_epoch();
        assert_ne!(old, new);
        assert_eq!(shared.state(), ProcessState::Starting);

        assert!(!shared.set_state_for(old, ProcessState::NoProcess));
        assert_eq!(shared.state(), ProcessState::Starting);
        assert!(shared.set_state_for(new, ProcessState::Running));
        assert_eq!(shared.state(), ProcessState::Running);
    }
}
