//! Duplex JSON-RPC 2.0 server over WebSocket
//!
//! Every accepted connection gets its own [`Peer`]: the server answers the calls a client
//! makes, and can call methods bound on that client over the same socket. All connections
//! share one method [`Registry`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jduo_server::{from_typed_fn, JduoServer};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct AddParams { a: i32, b: i32 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = JduoServer::builder()
//!         .bind_str("127.0.0.1:8080")?
//!         .handler("add", from_typed_fn(|p: AddParams| async move { Ok(p.a + p.b) }))?
//!         .build()
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Task Model
//!
//! - **Accept loop**: [`JduoServer::run`] accepts TCP connections
//! - **Connection tasks**: one receive loop and one send task per connection
//! - **Message tasks**: each inbound message is processed on its own task

mod builder;
mod connection;
mod metrics;

pub use builder::ServerBuilder;
pub use connection::Connection;
pub use jduo_core::{
    from_fn, from_typed_fn, BatchMode, Caller, Error, Handler, Id, Peer, Progress, Registry,
    Responder, Response, Result,
};
pub use metrics::ServerMetrics;

use connection::ConnectionContext;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Open connections by connection id
pub type ConnectionRegistry = Arc<Mutex<HashMap<u64, Peer>>>;

/// JSON-RPC 2.0 server over WebSocket
///
/// # Lifecycle
///
/// 1. **Build**: [`JduoServer::builder`]
/// 2. **Run**: [`JduoServer::run`] accepts connections until the listener fails
/// 3. **Talk back**: [`JduoServer::emit`] and [`JduoServer::request`] reach connected clients
///
/// `run` borrows the server, so wrap it in an `Arc` to keep calling it from elsewhere.
pub struct JduoServer {
    pub(crate) listener: TcpListener,
    pub(crate) context: ConnectionContext,
}

impl JduoServer {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Accept connections forever
    ///
    /// Returns only when accepting a TCP connection fails.
    #[tracing::instrument(skip(self), name = "server.run")]
    pub async fn run(&self) -> Result<()> {
        tracing::info!("Starting jduo server");
        let conn_counter = AtomicU64::new(0);

        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(|e| Error::Io(e.to_string()))?;
            let conn_id = conn_counter.fetch_add(1, Ordering::SeqCst);
            let context = self.context.clone();

            tracing::info!(conn_id = conn_id, addr = %addr, "New connection accepted");

            tokio::spawn(async move {
                if let Err(e) = connection::handle_connection(stream, conn_id, context).await {
                    tracing::error!(conn_id = conn_id, error = %e, "Connection error");
                }
            });
        }
    }

    /// The shared method registry; methods bound here are visible to every connection
    pub fn registry(&self) -> &Registry {
        self.context.processor.registry()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The peer serving one connection, if it is still open
    pub async fn peer(&self, conn_id: u64) -> Option<Peer> {
        self.context.registry.lock().await.get(&conn_id).cloned()
    }

    /// Ids of the open connections, in ascending order
    pub async fn connection_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.context.registry.lock().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn connection_count(&self) -> usize {
        self.context.registry.lock().await.len()
    }

    /// Send a notification to every open connection
    ///
    /// Returns how many connections it was queued for.
    #[tracing::instrument(skip(self, params))]
    pub async fn emit<P: Serialize>(&self, method: &str, params: P) -> Result<usize> {
        let params = serde_json::to_value(params)?;
        let registry = self.context.registry.lock().await;

        let mut sent = 0;
        for (conn_id, peer) in registry.iter() {
            match peer.emit(method, &params) {
                Ok(()) => sent += 1,
                Err(e) => tracing::debug!(conn_id, error = %e, "Skipping closed connection"),
            }
        }
        tracing::debug!(method, sent, "Notification broadcast");
        Ok(sent)
    }

    /// Send a notification to one connection
    pub async fn notify<P: Serialize>(&self, conn_id: u64, method: &str, params: P) -> Result<()> {
        let peer = self.peer(conn_id).await.ok_or(Error::ConnectionClosed)?;
        peer.emit(method, params)
    }

    /// Call a method bound on one client and wait for its reply
    ///
    /// Fails with `ConnectionClosed` when no such connection is open, or when it closes
    /// before the reply arrives.
    pub async fn request(
        &self,
        conn_id: u64,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response> {
        let peer = self.peer(conn_id).await.ok_or(Error::ConnectionClosed)?;
        peer.request(method, params).await
    }
}
