//! Outgoing Write Queue

use std::collections::VecDeque;

use bytes::Bytes;

/// FIFO of outgoing entries for one connection.
///
/// Only the head entry is ever in transmission. `offset` counts how much of
/// the head has already reached the socket; the head is popped only once it
/// has been transmitted completely.
#[derive(Debug, Default)]
pub struct WriteQueue {
    entries: VecDeque<Bytes>,
    offset: usize,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry at the tail. Empty entries are dropped.
    pub fn push(&mut self, entry: Bytes) {
        if !entry.is_empty() {
            self.entries.push_back(entry);
        }
    }

    /// Untransmitted remainder of the head entry
    pub fn pending(&self) -> Option<&[u8]> {
        self.entries.front().map(|head| &head[self.offset..])
    }

    /// Record `n` bytes of the head as transmitted.
    ///
    /// Returns the length of the head entry if this completed it.
    pub fn advance(&mut self, n: usize) -> Option<usize> {
        let head_len = self.entries.front()?.len();
        self.offset += n;
        debug_assert!(self.offset <= head_len);

        if self.offset >= head_len {
            self.entries.pop_front();
            self.offset = 0;
            Some(head_len)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
