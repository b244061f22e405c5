//! Outbound buffer classification.
//!
//! Decides, per `write`, whether a buffer will provoke Ready-For-Query
//! replies and how many.

// ============================================================================
// Imports
// ============================================================================

use super::cursor::MessageCursor;
use super::{TAG_QUERY, TAG_SYNC};

// ============================================================================
// WriteSummary
// ============================================================================

/// What an outbound buffer contains, as far as pipelining cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    /// Number of Simple-Query messages.
    pub queries: usize,
    /// Number of Sync messages.
    pub syncs: usize,
}

impl WriteSummary {
    /// Returns `true` if the buffer ends an extended-query batch.
    #[inline]
    #[must_use]
    pub const fn has_sync(&self) -> bool {
        self.syncs > 0
    }

    /// Returns `true` if the server will answer with Ready-For-Query.
    #[inline]
    #[must_use]
    pub const fn expects_ready(&self) -> bool {
        self.queries > 0 || self.has_sync()
    }

    fn observe(&mut self, tag: u8) {
        match tag {
            TAG_QUERY => self.queries += 1,
            TAG_SYNC => self.syncs += 1,
            _ => {}
        }
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Classifies the messages in an outbound buffer.
///
/// Tags are counted as soon as the tag byte is visible, so a message whose
/// header or body is cut off at the end of the buffer still counts. Scanning
/// stops at the first truncated header or impossible length.
#[must_use]
pub fn scan_outbound(buf: &[u8]) -> WriteSummary {
    let mut summary = WriteSummary::default();
    let mut cursor = MessageCursor::new(buf);

    while let Some(tag) = cursor.peek_tag() {
        summary.observe(tag);

        match cursor.try_read_header() {
            Ok(Some(header)) => cursor.skip(header.total_len()),
            Ok(None) | Err(_) => break,
        }
    }

    summary
}

// ============================================================================
// Tests
// ============================================================================
