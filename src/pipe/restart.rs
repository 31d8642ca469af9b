//! Restart and fault handling
//!
//! The disposition register is the handoff between the stdin hook, which
//! records what the last fully delivered chunk asked for, and the exit
//! hook, which replays it into the generator and decides whether the
//! process runs again.

use parking_lot::Mutex;

use crate::audio::Metadata;
use crate::codec::Disposition;
use crate::pipe::ProcessExit;

/// Restart settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Restart after a clean exit
    pub restart: bool,
    /// Restart after an exit with error
    pub restart_on_error: bool,
}

/// Single-slot disposition handoff guarded by a mutex.
///
/// `Sleep` is sticky: once requested, stores from the stdin hook do not
/// replace it until the exit hook takes it.
#[derive(Debug, Default)]
pub struct DispositionRegister {
    slot: Mutex<Disposition>,
}

impl DispositionRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the disposition of a fully delivered chunk
    pub fn store(&self, disposition: Disposition) {
        let mut slot = self.slot.lock();
        if *slot != Disposition::Sleep {
            *slot = disposition;
        }
    }

    /// Ask the exit hook not to restart
    pub fn request_sleep(&self) {
        *self.slot.lock() = Disposition::Sleep;
    }

    /// Take the disposition, leaving `Nothing`
    pub fn take(&self) -> Disposition {
        std::mem::take(&mut *self.slot.lock())
    }

    /// Clear a pending data disposition at a generation start, keeping `Sleep`
    pub fn reset_generation(&self) {
        let mut slot = self.slot.lock();
        if *slot != Disposition::Sleep {
            *slot = Disposition::Nothing;
        }
    }

    /// Unconditionally clear, including `Sleep`
    pub fn clear(&self) {
        *self.slot.lock() = Disposition::Nothing;
    }

    pub fn peek(&self) -> Disposition {
        self.slot.lock().clone()
    }
}

/// What the exit hook does for one exit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StopOutcome {
    /// Metadata to append to the generator
    pub metadata: Option<Metadata>,
    /// Whether to append a track break after it
    pub track_break: bool,
    pub restart: bool,
}

/// Decide the outcome of a process exit.
///
/// An explicit sleep wins over everything, including an error exit. An
/// error exit replays nothing. A clean exit replays the pending metadata
/// and break.
pub fn decide(exit: &ProcessExit, disposition: Disposition, policy: RestartPolicy) -> StopOutcome {
    if disposition == Disposition::Sleep {
        return StopOutcome::default();
    }
    if exit.is_error() {
        return StopOutcome {
            restart: policy.restart_on_error,
            ..StopOutcome::default()
        };
    }

    let (metadata, track_break) = match disposition {
        Disposition::Metadata(m) => (Some(m), false),
        Disposition::MetadataAndBreak(m) => (Some(m), true),
        Disposition::Break => (None, true),
        Disposition::Nothing | Disposition::Sleep => (None, false),
    };
    StopOutcome {
        metadata,
        track_break,
        restart: policy.restart,
    }
}

/// Lifecycle of the process behind an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NoProcess,
    Starting,
    Running,
    Exited { clean: bool },
}

impl ProcessState {
    /// State after the exit hook decided on a restart
    pub fn after_exit(restart: bool) -> Self {
        if restart {
            ProcessState::Starting
        } else {
            ProcessState::NoProcess
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Running)
    }
}
