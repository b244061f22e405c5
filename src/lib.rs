//! PostgreSQL wire protocol over WebSocket.
//!
//! This library lets a PostgreSQL client talk to an Aurora DSQL endpoint
//! through a WebSocket instead of a raw TCP socket.
//!
//! # Architecture
//!
//! The transport sits between a client and the remote endpoint:
//!
//! - **Client side**: writes frontend messages, receives backend bytes as events
//! - **Endpoint side**: a WebSocket speaking the PostgreSQL wire protocol
//!
//! Key design principles:
//!
//! - Each [`PostgresWs`] owns: one WebSocket + one pipeline + one event loop
//! - With connection checking on, each query group is preceded by a
//!   `select 1;` liveness probe and writes are released one group at a time
//! - A failed-transaction Ready-For-Query drops the in-flight group and
//!   reopens the pipeline
//! - Event-driven architecture (no polling)
//!
//! # Quick Start
//!
//! ```no_run
//! use dsql_postgres_ws::{DsqlOptions, PostgresWs, Result, protocol};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = DsqlOptions::new()
//!         .with_host("abc.dsql.us-east-1.on.aws")
//!         .with_connection_check(true)
//!         .resolve()?;
//!
//!     let socket = PostgresWs::new(config);
//!     socket.on_data(|bytes| println!("received {} bytes", bytes.len()));
//!     socket.connect().await?;
//!
//!     socket.write(protocol::simple_query("select now();"));
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`WsConfig`] and DSQL endpoint resolution |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`protocol`] | PostgreSQL message framing and encoders |
//! | [`transport`] | WebSocket socket, pipeline and events |

// ============================================================================
// Modules
// ============================================================================

/// Transport and endpoint configuration.
///
/// Use [`WsConfig::new`] directly, or [`DsqlOptions::resolve`] for DSQL.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// PostgreSQL wire protocol framing.
///
/// Message cursor, outbound scanner and frontend message encoders.
pub mod protocol;

/// WebSocket transport layer.
///
/// Socket shim, query pipeline and event surface.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration types
pub use config::{ConnectionId, DsqlOptions, WsConfig};

// Error types
pub use error::{Error, Result};

// Transport types
pub use transport::{
    EventKind, PostgresWs, PostgresWsFactory, ReadyState, SocketEvent, SocketFactory,
    socket_factory,
};
