//! Transport configuration.
//!
//! Immutable for the lifetime of a [`PostgresWs`](crate::PostgresWs).
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use dsql_postgres_ws::WsConfig;
//!
//! let config = WsConfig::new("abc.dsql.us-east-1.on.aws")
//!     .with_user("admin")
//!     .with_database("postgres")
//!     .with_connection_check(true)
//!     .with_heartbeat_timeout(Duration::from_secs(5));
//!
//! assert_eq!(config.url(), "wss://abc.dsql.us-east-1.on.aws:443");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::protocol::StartupMessage;

// ============================================================================
// Constants
// ============================================================================

/// Default WebSocket port.
pub const DEFAULT_PORT: u16 = 443;

/// Default database name.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Default user.
pub const DEFAULT_USER: &str = "admin";

/// Window for the liveness probe reply.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Bound on the WebSocket handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionId
// ============================================================================

/// Caller-chosen identifier for a logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an existing identifier.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random identifier.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Identifier as a string slice.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Callback invoked once the socket has closed.
pub type CloseCallback = Arc<dyn Fn(Option<&ConnectionId>) + Send + Sync>;

// ============================================================================
// WsConfig
// ============================================================================

/// Connection configuration for the WebSocket transport.
#[derive(Clone)]
pub struct WsConfig {
    /// Endpoint host.
    pub host: String,

    /// Endpoint port.
    pub port: u16,

    /// Database name sent in the startup message.
    pub database: String,

    /// User name sent in the startup message.
    pub user: String,

    /// Enables liveness probing and query pipelining.
    pub connection_check: bool,

    /// Identifier passed to the close callback.
    pub connection_id: Option<ConnectionId>,

    /// Invoked with `connection_id` after the socket closes.
    pub on_reserved_connection_close: Option<CloseCallback>,

    /// Adds `client_encoding` to the startup message.
    pub client_encoding: Option<String>,

    /// Adds `application_name` to the startup message.
    pub application_name: Option<String>,

    /// Use `wss://` (default) rather than `ws://`.
    pub tls: bool,

    /// Window for the liveness probe reply.
    pub heartbeat_timeout: Duration,

    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
}

impl fmt::Debug for WsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("connection_check", &self.connection_check)
            .field("connection_id", &self.connection_id)
            .field(
                "on_reserved_connection_close",
                &self.on_reserved_connection_close.is_some(),
            )
            .field("client_encoding", &self.client_encoding)
            .field("application_name", &self.application_name)
            .field("tls", &self.tls)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl WsConfig {
    /// Creates a configuration for `host` with defaults elsewhere.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            user: DEFAULT_USER.to_string(),
            connection_check: false,
            connection_id: None,
            on_reserved_connection_close: None,
            client_encoding: None,
            application_name: None,
            tls: true,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl WsConfig {
    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the database name.
    #[inline]
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the user name.
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Enables or disables liveness probing.
    #[inline]
    #[must_use]
    pub fn with_connection_check(mut self, enabled: bool) -> Self {
        self.connection_check = enabled;
        self
    }

    /// Sets the connection identifier.
    #[inline]
    #[must_use]
    pub fn with_connection_id(mut self, id: ConnectionId) -> Self {
        self.connection_id = Some(id);
        self
    }

    /// Sets the close callback.
    #[inline]
    #[must_use]
    pub fn with_on_reserved_connection_close<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&ConnectionId>) + Send + Sync + 'static,
    {
        self.on_reserved_connection_close = Some(Arc::new(callback));
        self
    }

    /// Sets the client encoding startup parameter.
    #[inline]
    #[must_use]
    pub fn with_client_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.client_encoding = Some(encoding.into());
        self
    }

    /// Sets the application name startup parameter.
    #[inline]
    #[must_use]
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Selects `wss://` (`true`) or `ws://` (`false`).
    #[inline]
    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the liveness probe window.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Conversion Methods
// ============================================================================

impl WsConfig {
    /// WebSocket URL of the endpoint.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Startup message for this configuration.
    #[must_use]
    pub fn startup_message(&self) -> StartupMessage {
        let mut message = StartupMessage::new(self.user.as_str(), self.database.as_str());
        if let Some(encoding) = &self.client_encoding {
            message = message.with_param("client_encoding", encoding.as_str());
        }
        if let Some(name) = &self.application_name {
            message = message.with_param("application_name", name.as_str());
        }
        message
    }
}

// ============================================================================
// Tests
// ============================================================================
