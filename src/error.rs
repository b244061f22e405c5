//! Error types for the PostgreSQL WebSocket transport.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use dsql_postgres_ws::{PostgresWs, Result, WsConfig};
//!
//! async fn example() -> Result<()> {
//!     let socket = PostgresWs::new(WsConfig::new("abc.dsql.us-east-1.on.aws"));
//!     socket.connect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidHostname`], [`Error::MissingRegion`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Socket`] |
//! | Transport | [`Error::TransportNotInitialized`], [`Error::LivenessTimeout`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::WebSocket`], [`Error::Url`] |
//!
//! A Ready-For-Query reply with error status is not an error here: the
//! pipeline recovers from it internally and never surfaces it.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options are invalid or incomplete.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Hostname is not a recognizable DSQL endpoint.
    #[error("Unable to parse region from hostname: {host}")]
    InvalidHostname {
        /// The offending hostname.
        host: String,
    },

    /// A cluster ID was given but no region could be determined.
    #[error("Region is not specified for cluster: {cluster_id}")]
    MissingRegion {
        /// The cluster identifier that needed a region.
        cluster_id: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the WebSocket handshake cannot be completed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection timeout during the WebSocket handshake.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// WebSocket connection closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Socket-level failure reported by the underlying WebSocket.
    ///
    /// Carries the endpoint for diagnostics. Delivered to callers as an
    /// error event, never returned from a method.
    #[error("{message} {host}:{port}")]
    Socket {
        /// Description of the socket failure.
        message: String,
        /// Endpoint host.
        host: String,
        /// Endpoint port.
        port: u16,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Attempted to send with no live WebSocket.
    ///
    /// Indicates a broken internal invariant, not an I/O failure.
    #[error("Websocket is not initialized")]
    TransportNotInitialized,

    /// Liveness probe reply did not arrive in time.
    ///
    /// Surfaced only as the reason of a forced close.
    #[error("Heartbeat timeout after {timeout_ms}ms")]
    LivenessTimeout {
        /// Milliseconds waited for the probe reply.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed wire-protocol message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Connection string parse error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid hostname error.
    #[inline]
    pub fn invalid_hostname(host: impl Into<String>) -> Self {
        Self::InvalidHostname { host: host.into() }
    }

    /// Creates a missing region error.
    #[inline]
    pub fn missing_region(cluster_id: impl Into<String>) -> Self {
        Self::MissingRegion {
            cluster_id: cluster_id.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a socket error tagged with its endpoint.
    #[inline]
    pub fn socket(message: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::Socket {
            message: message.into(),
            host: host.into(),
            port,
        }
    }

    /// Creates a liveness timeout error.
    #[inline]
    pub fn liveness_timeout(timeout_ms: u64) -> Self {
        Self::LivenessTimeout { timeout_ms }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::LivenessTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Socket { .. }
                | Self::LivenessTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::InvalidHostname { .. }
                | Self::MissingRegion { .. }
                | Self::Url(_)
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
