//! Frontend message encoders the transport synthesizes itself.

// ============================================================================
// Imports
// ============================================================================

use bytes::{BufMut, Bytes, BytesMut};

use super::{HEADER_LEN, TAG_QUERY, TAG_SYNC};

// ============================================================================
// Constants
// ============================================================================

/// SQL text of the liveness probe.
pub const LIVENESS_QUERY: &str = "select 1;";

// ============================================================================
// Encoders
// ============================================================================

/// Encodes a Simple-Query message: `'Q' | int32 len | sql\0`.
#[must_use]
pub fn simple_query(sql: &str) -> Bytes {
    let length = 4 + sql.len() + 1;

    let mut buf = BytesMut::with_capacity(1 + length);
    buf.put_u8(TAG_QUERY);
    buf.put_i32(length as i32);
    buf.put_slice(sql.as_bytes());
    buf.put_u8(0);

    buf.freeze()
}

/// Encodes the liveness probe query.
#[inline]
#[must_use]
pub fn liveness_probe() -> Bytes {
    simple_query(LIVENESS_QUERY)
}

/// Encodes a Sync message.
#[must_use]
pub fn sync() -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN);
    buf.put_u8(TAG_SYNC);
    buf.put_i32(4);
    buf.freeze()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_probe_bit_exact() {
        let probe = liveness_probe();

        let mut expected = vec![b'Q'];
        expected.extend_from_slice(&14_i32.to_be_bytes());
        expected.extend_from_slice(b"select 1;\0");

        assert_eq!(&probe[..], &expected[..]);
    }

    #[test]
    fn test_simple_query_length_uses_bytes() {
        let msg = simple_query("select 'é'");
        let length = i32::from_be_bytes([msg[1], msg[2], msg[3], msg[4]]);
        assert_eq!(length as usize + 1, msg.len());
        assert_eq!(msg.last(), Some(&0));
    }

    #[test]
    fn test_sync() {
        assert_eq!(&sync()[..], &[b'S', 0, 0, 0, 4]);
    }
}
