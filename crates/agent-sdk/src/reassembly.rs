//! Frame reassembly: accumulates inbound text fragments until they form one
//! complete JSON document.
//!
//! Message boundaries are not framed at the transport level, so the buffer
//! is re-parsed after every append.  Messages are bounded by
//! `max_bytes`, which keeps the repeated parse cheap.

use al_domain::error::Result;
use serde::de::IgnoredAny;

/// Outcome of feeding one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembly {
    /// More fragments are needed.
    Pending,
    /// The buffer held one complete message; the buffer is now empty.
    Complete(String),
    /// The buffer grew past the ceiling without parsing and was discarded.
    Overflow { discarded: usize },
}

/// Per-connection accumulator, owned exclusively by the event router.
#[derive(Debug)]
pub struct Reassembler {
    buf: Vec<u8>,
    max_bytes: usize,
}

impl Reassembler {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_bytes,
        }
    }

    /// Append `fragment` and try to extract a complete message.
    ///
    /// Fails with `OutOfMemory` if the buffer cannot grow; the buffer is
    /// left as it was before the call.
    pub fn push(&mut self, fragment: &[u8]) -> Result<Reassembly> {
        let needed = self.buf.len() + fragment.len();
        if needed > self.buf.capacity() {
            // Double, or grow to the minimum that fits.
            let target = (self.buf.capacity() * 2).max(needed);
            self.buf.try_reserve_exact(target - self.buf.len())?;
        }
        self.buf.extend_from_slice(fragment);

        if let Some(message) = self.complete_message() {
            self.buf.clear();
            return Ok(Reassembly::Complete(message));
        }

        if self.buf.len() > self.max_bytes {
            let discarded = self.buf.len();
            self.buf.clear();
            return Ok(Reassembly::Overflow { discarded });
        }

        Ok(Reassembly::Pending)
    }

    /// Discard everything and release the allocation.
    pub fn reset(&mut self) {
        self.buf = Vec::new();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    fn complete_message(&self) -> Option<String> {
        // A fragment may end inside a multi-byte character.
        let text = std::str::from_utf8(&self.buf).ok()?;
        serde_json::from_str::<IgnoredAny>(text).ok()?;
        Some(text.to_owned())
    }
}
