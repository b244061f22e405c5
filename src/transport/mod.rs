//! WebSocket transport layer.
//!
//! This module carries PostgreSQL frontend/backend messages over a single
//! WebSocket and presents it to clients as a duplex socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  PG client      │                              │  DSQL endpoint  │
//! │                 │         WebSocket            │                 │
//! │  PostgresWs     │◄────────────────────────────►│  PostgreSQL     │
//! │  → Pipeline     │        wss://HOST:443        │  wire protocol  │
//! │                 │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `PostgresWs::connect` - WebSocket handshake, event loop spawned
//! 2. Startup message sent as the first frame
//! 3. `PostgresWs::write` - Outbound bytes, pipelined when checking is on
//! 4. Inbound frames forwarded as `data` events
//! 5. `PostgresWs::end` / liveness timeout / remote close - Teardown
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `events` | Socket events and listener registry |
//! | `factory` | Socket factory for pools |
//! | `pipeline` | Query pipeline state machine |
//! | `socket` | WebSocket socket and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// Socket events and listener registry.
pub mod events;

/// Socket factory for pools.
pub mod factory;

/// Query pipeline state machine.
pub mod pipeline;

/// WebSocket socket and event loop.
pub mod socket;

// ============================================================================
// Re-exports
// ============================================================================

pub use events::{EventHandler, EventKind, SocketEvent};
pub use factory::{PostgresWsFactory, SocketFactory, socket_factory};
pub use pipeline::{Action, Pipeline, QueuedWrite, ReadyState, SendLock};
pub use socket::PostgresWs;
