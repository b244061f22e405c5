//! Socket factory for connection pools.
//!
//! Pool implementations hold a [`SocketFactory`] and call it once per
//! physical connection. Each call yields a fresh, connected [`PostgresWs`].

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::WsConfig;
use crate::error::Result;

use super::socket::PostgresWs;

// ============================================================================
// SocketFactory
// ============================================================================

/// Produces connected transports.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// Creates and connects a new socket.
    ///
    /// # Errors
    ///
    /// Returns the connection error of [`PostgresWs::connect`].
    async fn create(&self) -> Result<PostgresWs>;
}

// ============================================================================
// PostgresWsFactory
// ============================================================================

/// Factory producing one [`PostgresWs`] per call from a shared config.
#[derive(Debug, Clone)]
pub struct PostgresWsFactory {
    config: Arc<WsConfig>,
}

impl PostgresWsFactory {
    /// Creates a factory for `config`.
    #[must_use]
    pub fn new(config: WsConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Configuration each socket is built from.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &WsConfig {
        &self.config
    }
}

#[async_trait]
impl SocketFactory for PostgresWsFactory {
    async fn create(&self) -> Result<PostgresWs> {
        debug!(host = %self.config.host, "Creating socket");
        let socket = PostgresWs::new(WsConfig::clone(&self.config));
        socket.connect().await?;
        Ok(socket)
    }
}

/// Returns a factory that builds sockets from `config`.
#[must_use]
pub fn socket_factory(config: WsConfig) -> Arc<dyn SocketFactory> {
    Arc::new(PostgresWsFactory::new(config))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::StreamExt;
    use tokio::net::TcpListener;

    use crate::protocol::StartupMessage;
    use crate::transport::ReadyState;
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_factory_creates_connected_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            match ws.next().await {
                Some(Ok(Message::Binary(bytes))) => StartupMessage::decode(&bytes).unwrap(),
                other => panic!("expected startup frame, got {other:?}"),
            }
        });

        let factory = socket_factory(
            WsConfig::new("127.0.0.1")
                .with_port(port)
                .with_tls(false)
                .with_user("pool"),
        );
        let socket = factory.create().await.expect("factory should connect");

        assert!(socket.is_connected());
        assert_eq!(socket.ready_state(), ReadyState::Open);

        let startup = server.await.unwrap();
        assert_eq!(startup.param("user"), Some("pool"));
    }

    #[tokio::test]
    async fn test_factory_propagates_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let factory = PostgresWsFactory::new(WsConfig::new("127.0.0.1").with_port(port).with_tls(false));
        assert_eq!(factory.config().port, port);

        let err = factory.create().await.err().expect("connect should fail");
        assert!(err.is_connection_error());
    }
}
