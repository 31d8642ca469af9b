//! Process bridging
//!
//! The I/O substrate (`process`) spawns the external program and invokes
//! the hooks of a [`PipeHandler`] one at a time from a single task. Each
//! hook answers with a [`Directive`] telling the substrate how to go on.
//! The operator's handler (`feeder`) frames audio into stdin, decodes
//! stdout into the generator and decides on restarts when the process
//! exits.

pub mod backpressure;
pub mod feeder;
pub mod process;
pub mod restart;
pub mod shared;

pub use backpressure::Backpressure;
pub use feeder::PipeFeeder;
pub use process::ProcessHandle;
pub use restart::{DispositionRegister, ProcessState, RestartPolicy};
pub use shared::{PipeStats, Shared};

use std::io::{Read, Write};
use std::time::Duration;

/// What the substrate does after a hook returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Keep invoking the hook as the descriptor allows
    Continue,
    /// Wait this long before invoking the hook again
    Delay(Duration),
    /// Stop feeding: flush and close the process's stdin
    Stop,
}

/// How a process generation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    Clean,
    Error(String),
}

impl ProcessExit {
    pub fn is_error(&self) -> bool {
        matches!(self, ProcessExit::Error(_))
    }
}

/// Hooks invoked by the substrate, never concurrently with each other
pub trait PipeHandler: Send {
    /// A new process generation started
    fn on_start(&mut self, stdin: &mut dyn Write) -> Directive;

    /// The process can accept more input
    fn on_stdin(&mut self, stdin: &mut dyn Write) -> Directive;

    /// The process produced output
    fn on_stdout(&mut self, stdout: &mut dyn Read) -> Directive;

    /// The process wrote diagnostics
    fn on_stderr(&mut self, stderr: &mut dyn Read) -> Directive;

    /// The process exited and its outputs are drained. Returns whether to
    /// spawn it again.
    fn on_stop(&mut self, exit: ProcessExit) -> bool;
}
