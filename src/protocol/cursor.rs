//! Bounds-checked cursor over a buffer of wire messages.
//!
//! The cursor never slices past the end of its buffer. A header that is
//! split across buffer boundaries reads as `Ok(None)`; a length field that
//! cannot describe a real message reads as an error.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::{HEADER_LEN, TAG_READY_FOR_QUERY};

// ============================================================================
// MessageHeader
// ============================================================================

/// Tag and declared length of one wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message type tag.
    pub tag: u8,
    /// Value of the length field (counts itself, not the tag).
    pub length: usize,
}

impl MessageHeader {
    /// Size of the whole message on the wire.
    #[inline]
    #[must_use]
    pub const fn total_len(&self) -> usize {
        1 + self.length
    }

    /// Size of the body following the header.
    #[inline]
    #[must_use]
    pub const fn body_len(&self) -> usize {
        self.length.saturating_sub(4)
    }
}

// ============================================================================
// TransactionStatus
// ============================================================================

/// Status byte carried by a Ready-For-Query message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// `I`: not in a transaction block.
    Idle,
    /// `T`: inside a transaction block.
    InTransaction,
    /// `E`: inside a failed transaction block.
    Failed,
}

impl TransactionStatus {
    /// Decodes a status byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(Self::Idle),
            b'T' => Some(Self::InTransaction),
            b'E' => Some(Self::Failed),
            _ => None,
        }
    }
}

// ============================================================================
// RawMessage
// ============================================================================

/// A complete message borrowed from the cursor's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage<'a> {
    /// Message type tag.
    pub tag: u8,
    /// Body bytes after the 5-byte header.
    pub body: &'a [u8],
    /// The full message, header included.
    pub bytes: &'a [u8],
}

impl RawMessage<'_> {
    /// Status byte of a Ready-For-Query message.
    ///
    /// `None` for other tags, an empty body, or an unknown status.
    #[must_use]
    pub fn ready_status(&self) -> Option<TransactionStatus> {
        if self.tag != TAG_READY_FOR_QUERY {
            return None;
        }
        self.body.first().copied().and_then(TransactionStatus::from_byte)
    }
}

// ============================================================================
// MessageCursor
// ============================================================================

/// Forward-only cursor over concatenated wire messages.
#[derive(Debug, Clone)]
pub struct MessageCursor<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> MessageCursor<'a> {
    /// Creates a cursor at the start of `buf`.
    #[inline]
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    /// Current byte offset.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left after the current offset.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    /// Unconsumed tail of the buffer.
    #[inline]
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.offset.min(self.buf.len())..]
    }

    /// Tag byte at the current offset, if any.
    #[inline]
    #[must_use]
    pub fn peek_tag(&self) -> Option<u8> {
        self.buf.get(self.offset).copied()
    }

    /// Reads the header at the current offset without advancing.
    ///
    /// Returns `Ok(None)` when fewer than five bytes remain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the length field is below 4.
    pub fn try_read_header(&self) -> Result<Option<MessageHeader>> {
        let Some(header) = self.rest().get(..HEADER_LEN) else {
            return Ok(None);
        };

        let length = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if length < 4 {
            return Err(Error::protocol(format!(
                "invalid message length {length} at offset {}",
                self.offset
            )));
        }

        Ok(Some(MessageHeader {
            tag: header[0],
            length: length as usize,
        }))
    }

    /// Moves past `len` bytes, stopping at the end of the buffer.
    #[inline]
    pub fn skip(&mut self, len: usize) {
        self.offset = self.offset.saturating_add(len).min(self.buf.len());
    }

    /// Reads the next complete message and advances past it.
    ///
    /// Returns `Ok(None)` without advancing if the header or body is
    /// truncated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the length field is below 4.
    pub fn next_message(&mut self) -> Result<Option<RawMessage<'a>>> {
        let Some(header) = self.try_read_header()? else {
            return Ok(None);
        };

        let rest = self.rest();
        let Some(bytes) = rest.get(..header.total_len()) else {
            return Ok(None);
        };

        self.offset += header.total_len();

        Ok(Some(RawMessage {
            tag: header.tag,
            body: &bytes[HEADER_LEN..],
            bytes,
        }))
    }
}

// ============================================================================
// Tests
// ============================================================================
