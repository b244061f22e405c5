//! Open a socket to a DSQL endpoint and print backend messages.
//!
//! Demonstrates:
//! - Resolving a configuration from `PGHOST`, `PGUSERNAME` (or `USER`),
//!   `PGDATABASE`, `AWS_REGION`
//! - Listening for data, error and close events
//! - Sending a simple query through the liveness-checked pipeline
//!
//! Usage:
//!   PGHOST=<cluster>.dsql.us-east-1.on.aws cargo run --example query
//!   cargo run --example query -- "select now();"
//!   RUST_LOG=dsql_postgres_ws=debug cargo run --example query

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use dsql_postgres_ws::protocol::{MessageCursor, simple_query};
use dsql_postgres_ws::{ConnectionId, DsqlOptions, PostgresWs};

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_QUERY: &str = "select 1;";
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== PostgreSQL over WebSocket ===\n");

    let sql = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_QUERY.to_string());

    let config = DsqlOptions::new()
        .with_connection_check(true)
        .with_connection_id(ConnectionId::generate())
        .with_orm_prefix("demo")
        .resolve()
        .context("resolving endpoint (set PGHOST)")?;

    println!("Endpoint: {}", config.url());

    let socket = PostgresWs::new(config);
    let (data_tx, mut data_rx) = mpsc::unbounded_channel::<Bytes>();

    socket
        .on_data(move |bytes| {
            let _ = data_tx.send(bytes.clone());
        })
        .on_error(|e| eprintln!("[socket error] {e}"))
        .on_close(|| println!("[closed]"));

    socket.connect().await.context("connecting")?;
    println!("Connected, sending: {sql}");
    socket.write(simple_query(&sql));

    while let Ok(Some(bytes)) = tokio::time::timeout(IDLE_TIMEOUT, data_rx.recv()).await {
        let mut cursor = MessageCursor::new(&bytes);
        while let Ok(Some(message)) = cursor.next_message() {
            println!(
                "  <- '{}' ({} bytes)",
                char::from(message.tag),
                message.body.len()
            );
        }
    }

    socket.end();
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("\n=== Done ===");
    Ok(())
}
