//! # Pipe Bridge
//!
//! Runs an arbitrary external process as an audio transform inside a
//! streaming graph: the graph's audio is written to the process's stdin as
//! 16-bit PCM, the process's stdout is decoded back and served as a
//! time-continuous source, with metadata and track boundaries preserved
//! across process restarts.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── GRAPH SIDE ─────────────────────────────┐
//! │  upstream Source ──pull (slave clock tick)──┐                       │
//! │                                             │        PipeOperator   │
//! │                                             │   get / is_ready ◄──┐ │
//! └─────────────────────────────────────────────┼─────────────────────┼─┘
//!                                               ▼                     │
//! ┌───────────────────────── PROCESS I/O TASK ──┼─────────────────────┼─┐
//! │  PcmEncoder ──► ChunkQueue ──on_stdin──► [stdin]                  │ │
//! │                     │ disposition                                 │ │
//! │                     ▼                      external process       │ │
//! │             DispositionRegister                                   │ │
//! │                     │                 [stdout] ──on_stdout──┐     │ │
//! │                     │ on_stop                               ▼     │ │
//! │                     └──► metadata / break ──►  Generator ◄── PcmDecoder
//! │                                                 (backpressure)    │ │
//! └───────────────────────────────────────────────────────────────────┴─┘
//! ```

pub mod audio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod operator;
pub mod pipe;

pub use error::{Error, Result};
pub use operator::PipeOperator;

/// Application-wide constants
pub mod constants {
    /// Default sample rate of the graph
    pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Maximum bytes moved per stdin write or stdout read
    pub const CHUNK_SIZE: usize = 1024;
}
