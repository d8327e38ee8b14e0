//! `BufferVector` and `SliceVector`: the ordered-chain types behind the send path.
//!
//! `BufferVector` owns its bytes (queued residue from partial sends); `SliceVector`
//! borrows them (the zero-copy gather list a caller hands to `send_packet`). Both track
//! `total_bytes` incrementally rather than recomputing it, matching
//! `ananas::BufferVector::totalBytes` in `examples/original_source/ananas/net/Connection.cc`.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;

/// An ordered sequence of owned buffers, used as a connection's outbound queue. Chunks
/// are `Bytes` rather than `Vec<u8>` so a retained residue after a partial send is a
/// cheap refcount bump, not a reallocation, matching how the retrieval pack's own
/// transfer paths hold onto queued send data.
#[derive(Debug, Default)]
pub struct BufferVector {
    chunks: VecDeque<Chunk>,
    total_bytes: usize,
}

#[derive(Debug)]
struct Chunk {
    data: Bytes,
    start: usize,
}

impl Chunk {
    fn readable(&self) -> &[u8] {
        &self.data[self.start..]
    }
}

impl BufferVector {
    pub fn new() -> Self {
        BufferVector { chunks: VecDeque::new(), total_bytes: 0 }
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.total_bytes == 0
    }

    /// Appends a copy of `data` to the tail of the chain.
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.total_bytes += data.len();
        self.chunks.push_back(Chunk { data: Bytes::copy_from_slice(data), start: 0 });
    }

    /// Discards the head chunk entirely. Callers must only do this once the chunk is
    /// fully drained (use `consume` otherwise).
    pub fn pop_front(&mut self) {
        if let Some(chunk) = self.chunks.pop_front() {
            self.total_bytes -= chunk.readable().len();
        }
    }

    /// Drops `n` bytes from the front of the chain, popping any chunk that becomes
    /// fully drained.
    pub fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.chunks.front_mut() else { break };
            let avail = front.readable().len();
            if n >= avail {
                n -= avail;
                self.total_bytes -= avail;
                self.chunks.pop_front();
            } else {
                front.start += n;
                self.total_bytes -= n;
                n = 0;
            }
        }
    }

    /// Discards every queued chunk. Used by `Shutdown(Write)`/`Shutdown(Both)`, which
    /// explicitly drop any queued send data rather than flush it.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total_bytes = 0;
    }

    /// Builds an `IoSlice` gather list over every queued chunk. The caller (the
    /// gathered writer) is responsible for grouping these into IOV_MAX-floor batches.
    pub fn io_slices(&self) -> Vec<IoSlice<'_>> {
        self.chunks.iter().map(|c| IoSlice::new(c.readable())).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Moves every remaining chunk onto the tail of `other`, preserving order and
    /// each chunk's already-consumed offset. Used to fold an emptied
    /// `batchSendBuf` back into the real send queue once its bytes could not be
    /// written in one gathered call.
    pub fn drain_into(&mut self, other: &mut BufferVector) {
        while let Some(chunk) = self.chunks.pop_front() {
            let bytes = chunk.readable().len();
            self.total_bytes -= bytes;
            other.total_bytes += bytes;
            other.chunks.push_back(chunk);
        }
    }
}

/// A borrowed gather list: an ordered sequence of `(ptr, len)` slices passed into
/// `send_packet` without being copied unless they must be queued.
#[derive(Debug, Default)]
pub struct SliceVector<'a> {
    slices: Vec<&'a [u8]>,
}

impl<'a> SliceVector<'a> {
    pub fn new() -> Self {
        SliceVector { slices: Vec::new() }
    }

    pub fn push_back(&mut self, data: &'a [u8]) {
        if !data.is_empty() {
            self.slices.push(data);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &&'a [u8]> {
        self.slices.iter()
    }

    pub fn total_bytes(&self) -> usize {
        self.slices.iter().map(|s| s.len()).sum()
    }

    pub fn io_slices(&self) -> Vec<IoSlice<'a>> {
        self.slices.iter().map(|s| IoSlice::new(s)).collect()
    }
}

impl<'a> From<&'a [u8]> for SliceVector<'a> {
    fn from(data: &'a [u8]) -> Self {
        let mut v = SliceVector::new();
        v.push_back(data);
        v
    }
}
