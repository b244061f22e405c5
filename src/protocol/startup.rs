//! StartupMessage encoding.
//!
//! # Format
//!
//! ```text
//! int32 length | int32 196608 | user\0<user>\0database\0<db>\0[key\0value\0]... \0
//! ```
//!
//! The startup message has no tag byte; the length covers the whole packet.

// ============================================================================
// Imports
// ============================================================================

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Protocol version 3.0 packed as `major << 16 | minor`.
pub const PROTOCOL_VERSION: i32 = 196_608;

/// Length and version prefix.
const PREFIX_LEN: usize = 8;

// ============================================================================
// StartupMessage
// ============================================================================

/// Ordered startup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupMessage {
    params: Vec<(String, String)>,
}

impl StartupMessage {
    /// Creates a startup message with `user` and `database`.
    #[must_use]
    pub fn new(user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            params: vec![
                ("user".to_string(), user.into()),
                ("database".to_string(), database.into()),
            ],
        }
    }

    /// Appends a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Looks up a parameter by key.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All parameters in wire order.
    #[inline]
    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Encodes the message for the wire.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let body_len: usize = self
            .params
            .iter()
            .map(|(k, v)| k.len() + v.len() + 2)
            .sum::<usize>()
            + 1;
        let length = PREFIX_LEN + body_len;

        let mut buf = BytesMut::with_capacity(length);
        buf.put_i32(length as i32);
        buf.put_i32(PROTOCOL_VERSION);
        for (key, value) in &self.params {
            buf.put_slice(key.as_bytes());
            buf.put_u8(0);
            buf.put_slice(value.as_bytes());
            buf.put_u8(0);
        }
        buf.put_u8(0);

        buf.freeze()
    }

    /// Decodes an encoded startup message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the length, version or parameter
    /// section is malformed.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let Some(prefix) = buf.get(..PREFIX_LEN) else {
            return Err(Error::protocol("startup message shorter than 8 bytes"));
        };

        let length = i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if length as usize != buf.len() {
            return Err(Error::protocol(format!(
                "startup length {length} does not match {} bytes",
                buf.len()
            )));
        }

        let version = i32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]);
        if version != PROTOCOL_VERSION {
            return Err(Error::protocol(format!(
                "unsupported protocol version {version}"
            )));
        }

        let Some((&0, section)) = buf[PREFIX_LEN..].split_last() else {
            return Err(Error::protocol("startup parameters are not terminated"));
        };

        let mut fields = Vec::new();
        if !section.is_empty() {
            let Some((&0, section)) = section.split_last() else {
                return Err(Error::protocol("startup value is not terminated"));
            };
            for field in section.split(|&b| b == 0) {
                let text = std::str::from_utf8(field)
                    .map_err(|e| Error::protocol(format!("startup field is not UTF-8: {e}")))?;
                fields.push(text.to_string());
            }
        }

        if fields.len() % 2 != 0 {
            return Err(Error::protocol("startup key without value"));
        }

        let params = fields
            .chunks_exact(2)
            .map(|pair| (pair[0].clone(), pair[1].clone()))
            .collect();

        Ok(Self { params })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    #[test]
    fn test_encode_bit_exact() {
        let encoded = StartupMessage::new("admin", "postgres").encode();

        let params = b"user\0admin\0database\0postgres\0\0";
        let mut expected = Vec::new();
        expected.extend_from_slice(&((8 + params.len()) as i32).to_be_bytes());
        expected.extend_from_slice(&196_608_i32.to_be_bytes());
        expected.extend_from_slice(params);

        assert_eq!(&encoded[..], &expected[..]);
    }

    #[test]
    fn test_round_trip_admin_postgres() {
        let decoded = StartupMessage::decode(&StartupMessage::new("admin", "postgres").encode())
            .expect("decode should succeed");

        assert_eq!(decoded.param("user"), Some("admin"));
        assert_eq!(decoded.param("database"), Some("postgres"));
        assert_eq!(decoded.params().len(), 2);
    }

    #[test]
    fn test_optional_params_follow_database() {
        let msg = StartupMessage::new("admin", "postgres").with_param("client_encoding", "UTF8");
        let decoded = StartupMessage::decode(&msg.encode()).unwrap();

        assert_eq!(decoded.params()[2].0, "client_encoding");
        assert_eq!(decoded.param("client_encoding"), Some("UTF8"));
    }

    #[test]
    fn test_length_counts_bytes_not_chars() {
        let encoded = StartupMessage::new("ユーザー", "postgres").encode();
        let length = i32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(length as usize, encoded.len());
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        let mut encoded = StartupMessage::new("admin", "postgres").encode().to_vec();
        encoded[5] = 2;
        assert!(StartupMessage::decode(&encoded).is_err());
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        let encoded = StartupMessage::new("admin", "postgres").encode();
        assert!(StartupMessage::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(StartupMessage::decode(&[0, 0]).is_err());
    }

    proptest! {
        #[test]
        fn prop_round_trip(user in "[a-zA-Z0-9_]{1,16}", database in "[a-zA-Z0-9_]{1,16}") {
            let msg = StartupMessage::new(user.clone(), database.clone());
            let decoded = StartupMessage::decode(&msg.encode()).unwrap();
            prop_assert_eq!(decoded.param("user"), Some(user.as_str()));
            prop_assert_eq!(decoded.param("database"), Some(database.as_str()));
        }
    }
}
