//! Transport and endpoint configuration.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `options` | [`WsConfig`] for a single socket |
//! | `dsql` | Endpoint resolution for Aurora DSQL clusters |

// ============================================================================
// Submodules
// ============================================================================

/// Endpoint resolution for Aurora DSQL clusters.
pub mod dsql;

/// Socket configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use dsql::{
    APPLICATION_NAME, DsqlOptions, build_application_name, build_hostname, is_cluster_id,
    parse_region,
};
pub use options::{
    CloseCallback, ConnectionId, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DATABASE,
    DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_PORT, DEFAULT_USER, WsConfig,
};
