//! Framed PCM chunks and the pending chunk queue

use bytes::Bytes;
use std::collections::VecDeque;

use crate::audio::Metadata;

/// Action taken once a chunk has been fully delivered to the process
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Disposition {
    /// Emit metadata at the chunk boundary
    Metadata(Metadata),
    /// Emit metadata, then close the track
    MetadataAndBreak(Metadata),
    /// Close the track
    Break,
    /// Stop feeding; the operator is shutting down
    Sleep,
    /// Keep feeding
    #[default]
    Nothing,
}

impl Disposition {
    /// Whether delivering this disposition ends the current stdin session
    pub fn stops_feeding(&self) -> bool {
        !matches!(self, Disposition::Nothing)
    }
}

/// Byte range of framed PCM with a delivery cursor
#[derive(Debug, Clone)]
pub struct Chunk {
    data: Bytes,
    offset: usize,
    remaining: usize,
    disposition: Disposition,
}

impl Chunk {
    pub fn new(data: Bytes, disposition: Disposition) -> Self {
        let remaining = data.len();
        Self {
            data,
            offset: 0,
            remaining,
            disposition,
        }
    }

    /// Total length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet delivered
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..self.offset + self.remaining]
    }

    pub fn remaining_len(&self) -> usize {
        self.remaining
    }

    /// Whether some, but not all, bytes were delivered
    pub fn in_flight(&self) -> bool {
        self.offset > 0 && self.remaining > 0
    }

    pub fn is_delivered(&self) -> bool {
        self.remaining == 0
    }

    /// Move the cursor past `n` delivered bytes
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.remaining);
        self.offset += n;
        self.remaining -= n;
    }

    /// Forget undelivered bytes, keeping the disposition
    pub fn discard_remaining(&mut self) {
        self.offset += self.remaining;
        self.remaining = 0;
    }

    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }

    pub fn into_disposition(self) -> Disposition {
        self.disposition
    }
}

/// FIFO of chunks awaiting delivery; only the front one may be in flight
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<Chunk>,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunks: impl IntoIterator<Item = Chunk>) {
        self.chunks.extend(chunks);
    }

    pub fn front(&self) -> Option<&Chunk> {
        self.chunks.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut Chunk> {
        self.chunks.front_mut()
    }

    pub fn pop(&mut self) -> Option<Chunk> {
        self.chunks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Bytes still to deliver across all chunks
    pub fn pending_bytes(&self) -> usize {
        self.chunks.iter().map(Chunk::remaining_len).sum()
    }

    /// Drop the undelivered part of a partially written front chunk.
    ///
    /// Returns the number of bytes discarded.
    pub fn discard_in_flight(&mut self) -> usize {
        match self.chunks.front_mut() {
            Some(chunk) if chunk.in_flight() => {
                let dropped = chunk.remaining_len();
                chunk.discard_remaining();
                dropped
            }
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_cursor() {
        let mut chunk = Chunk::new(Bytes::from_static(b"abcdef"), Disposition::Break);
        assert_eq!(chunk.remaining(), b"abcdef");
        assert!(!chunk.in_flight());

        chunk.advance(2);
        assert_eq!(chunk.remaining(), b"cdef");
        assert!(chunk.in_flight());

        chunk.advance(10);
        assert!(chunk.is_delivered());
        assert_eq!(chunk.into_disposition(), Disposition::Break);
    }

    #[test]
    fn test_discard_in_flight_keeps_disposition() {
        let mut queue = ChunkQueue::new();
        queue.extend([
            Chunk::new(Bytes::from_static(b"1234"), Disposition::Break),
            Chunk::new(Bytes::from_static(b"5678"), Disposition::Nothing),
        ]);
        assert_eq!(queue.discard_in_flight(), 0);

        queue.front_mut().unwrap().advance(1);
        assert_eq!(queue.discard_in_flight(), 3);
        assert_eq!(queue.pending_bytes(), 4);

        let front = queue.pop().unwrap();
        assert!(front.is_delivered());
        assert_eq!(front.disposition(), &Disposition::Break);
    }

    #[test]
    fn test_stops_feeding() {
        assert!(!Disposition::Nothing.stops_feeding());
        assert!(Disposition::Break.stops_feeding());
        assert!(Disposition::Sleep.stops_feeding());
        assert!(Disposition::Metadata(Metadata::new()).stops_feeding());
    }
}
