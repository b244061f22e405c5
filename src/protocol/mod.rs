//! PostgreSQL wire-protocol framing.
//!
//! Only the slice of the protocol the transport has to inspect is modelled
//! here. Everything else passes through as opaque bytes.
//!
//! # Message Layout
//!
//! Every message after startup is a 1-byte tag followed by a big-endian
//! `int32` length that counts itself but not the tag:
//!
//! ```text
//! ┌─────┬──────────────┬──────────────────────┐
//! │ tag │ length (i32) │ body (length - 4)    │
//! └─────┴──────────────┴──────────────────────┘
//! ```
//!
//! # Recognized Tags
//!
//! | Tag | Direction | Meaning |
//! |-----|-----------|---------|
//! | `Q` | Frontend | Simple query |
//! | `S` | Frontend | Sync (end of an extended-query batch) |
//! | `Z` | Backend | Ready-for-query, status byte `I`, `T` or `E` |
//! | `D` | Backend | Data row |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `cursor` | Bounds-checked message cursor |
//! | `scan` | Outbound buffer classification |
//! | `startup` | StartupMessage encoding |
//! | `query` | Simple-query and sync encoders |

// ============================================================================
// Submodules
// ============================================================================

/// Bounds-checked message cursor.
pub mod cursor;

/// Simple-query and sync message encoders.
pub mod query;

/// Outbound buffer classification.
pub mod scan;

/// StartupMessage encoding and decoding.
pub mod startup;

// ============================================================================
// Message Tags
// ============================================================================

/// Simple query (frontend).
pub const TAG_QUERY: u8 = b'Q';

/// Sync (frontend).
pub const TAG_SYNC: u8 = b'S';

/// Ready-for-query (backend).
pub const TAG_READY_FOR_QUERY: u8 = b'Z';

/// Data row (backend).
pub const TAG_DATA_ROW: u8 = b'D';

/// Backend messages a simple query can produce: RowDescription, DataRow,
/// CommandComplete, ErrorResponse, EmptyQueryResponse, ReadyForQuery.
pub const SIMPLE_QUERY_REPLY_TAGS: [u8; 6] = [b'T', b'D', b'C', b'E', b'I', b'Z'];

/// Size of the tag plus length prefix.
pub const HEADER_LEN: usize = 5;

// ============================================================================
// Re-exports
// ============================================================================

pub use cursor::{MessageCursor, MessageHeader, RawMessage, TransactionStatus};
pub use query::{LIVENESS_QUERY, liveness_probe, simple_query, sync};
pub use scan::{WriteSummary, scan_outbound};
pub use startup::{PROTOCOL_VERSION, StartupMessage};

// ============================================================================
// Test Fixtures
// ============================================================================

/// Backend message encoders for tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use bytes::{BufMut, Bytes, BytesMut};

    fn message(tag: u8, body: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(super::HEADER_LEN + body.len());
        buf.put_u8(tag);
        buf.put_i32((4 + body.len()) as i32);
        buf.put_slice(body);
        buf.freeze()
    }

    /// `Z` with the given status byte.
    pub(crate) fn ready_for_query(status: u8) -> Bytes {
        message(b'Z', &[status])
    }

    /// `D` with a single text column.
    pub(crate) fn data_row(value: &str) -> Bytes {
        let mut body = BytesMut::new();
        body.put_i16(1);
        body.put_i32(value.len() as i32);
        body.put_slice(value.as_bytes());
        message(b'D', &body)
    }

    /// `C` with the given command tag.
    pub(crate) fn command_complete(tag: &str) -> Bytes {
        let mut body = tag.as_bytes().to_vec();
        body.push(0);
        message(b'C', &body)
    }

    /// `S` (ParameterStatus) with a name and value.
    pub(crate) fn parameter_status(name: &str, value: &str) -> Bytes {
        let mut body = name.as_bytes().to_vec();
        body.push(0);
        body.extend_from_slice(value.as_bytes());
        body.push(0);
        message(b'S', &body)
    }

    /// `N` (NoticeResponse) carrying only a message field.
    pub(crate) fn notice(text: &str) -> Bytes {
        let mut body = vec![b'M'];
        body.extend_from_slice(text.as_bytes());
        body.extend_from_slice(&[0, 0]);
        message(b'N', &body)
    }

    /// `P` with an empty statement name.
    pub(crate) fn parse(sql: &str) -> Bytes {
        let mut body = vec![0];
        body.extend_from_slice(sql.as_bytes());
        body.extend_from_slice(&[0, 0, 0]);
        message(b'P', &body)
    }

    /// Concatenates messages into one buffer.
    pub(crate) fn concat(parts: &[&[u8]]) -> Bytes {
        let mut buf = BytesMut::new();
        for part in parts {
            buf.put_slice(part);
        }
        buf.freeze()
    }
}
