//! Bounded window over the most recently emitted plain text.

use crate::scan::inside_code_fence;

/// Default capacity of the recent-text window, in bytes.
pub const DEFAULT_TAIL_LIMIT: usize = 256;

/// Fixed-capacity append-and-truncate buffer holding the trailing bytes of
/// text the sieve has already released as content.
///
/// The sieve only needs this to answer one question: does the current position
/// sit inside an open code fence? Whitespace-only text is not recorded.
#[derive(Debug, Clone)]
pub struct TextTail {
    buf: String,
    limit: usize,
}

impl Default for TextTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_LIMIT)
    }
}

impl TextTail {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: String::with_capacity(limit),
            limit,
        }
    }

    /// Record text that was released as content.
    pub fn note(&mut self, text: &str) {
        if text.trim().is_empty() || self.limit == 0 {
            return;
        }
        self.buf.push_str(text);
        if self.buf.len() > self.limit {
            let mut cut = self.buf.len() - self.limit;
            while !self.buf.is_char_boundary(cut) {
                cut += 1;
            }
            self.buf.drain(..cut);
        }
    }

    /// Whether `tail + continuation` ends inside an open fence.
    pub fn fenced_with(&self, continuation: &str) -> bool {
        if self.buf.is_empty() {
            return inside_code_fence(continuation);
        }
        let mut joined = String::with_capacity(self.buf.len() + continuation.len());
        joined.push_str(&self.buf);
        joined.push_str(continuation);
        inside_code_fence(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
