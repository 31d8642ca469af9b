//! Error types for the pipe bridge

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Pipe error: {0}")]
    Pipe(#[from] PipeError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Process lifecycle errors
#[derive(Error, Debug)]
pub enum PipeError {
    #[error("Process is not running")]
    NotRunning,

    #[error("No tokio runtime available to drive the process")]
    NoRuntime,

    #[error("Failed to spawn process `{command}`: {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("Process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// PCM framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Invalid WAV header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid channel count: {0}")]
    InvalidChannels(u16),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
