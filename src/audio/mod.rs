//! Audio data model: blocks, the decoded-audio generator and upstream sources

pub mod block;
pub mod buffer;
pub mod source;

pub use block::{metadata, AudioBlock, Metadata};
pub use buffer::Generator;
pub use source::{BlockQueue, Source, ToneSource};
