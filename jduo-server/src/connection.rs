//! Per-connection WebSocket plumbing
//!
//! # Connection Lifecycle
//!
//! 1. **Upgrade**: the accepted TCP stream is upgraded to WebSocket
//! 2. **Register**: a [`Peer`] for the connection joins the connection registry
//! 3. **Serve**: every inbound text frame is handed to [`Peer::handle_text`] on its own task,
//!    so a slow handler never holds up the frames behind it
//! 4. **Cleanup**: the connection leaves the registry and its pending requests fail with
//!    `ConnectionClosed`
//!
//! Outbound frames (replies, notifications, requests) all go through one unbounded channel
//! drained by a dedicated send task.

use crate::metrics::ServerMetrics;
use crate::ConnectionRegistry;
use futures::{SinkExt, StreamExt};
use jduo_core::{Emitter, Error, Peer, Processor, Requester, Result, RpcMetrics, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Outbound half of one WebSocket connection
#[derive(Clone, Debug)]
pub struct Connection {
    pub id: u64,
    tx: mpsc::UnboundedSender<Message>,
}

impl Connection {
    pub fn new(id: u64, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { id, tx }
    }
}

impl Transport for Connection {
    fn send_text(&self, message: String) -> Result<()> {
        self.tx
            .send(Message::Text(message))
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Everything a connection task shares with the server
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub processor: Processor,
    pub registry: ConnectionRegistry,
    pub request_timeout: Option<Duration>,
    pub rpc_metrics: Option<Arc<RpcMetrics>>,
    pub metrics: Option<Arc<ServerMetrics>>,
}

impl ConnectionContext {
    fn peer(&self, connection: Connection) -> Peer {
        let connection_id = connection.id;
        let mut requester = Requester::new(Emitter::new(connection));
        if let Some(timeout) = self.request_timeout {
            requester = requester.with_timeout(timeout);
        }
        if let Some(metrics) = &self.rpc_metrics {
            requester = requester.with_metrics(Arc::clone(metrics));
        }
        Peer::from_parts(self.processor.clone(), requester).with_connection_id(connection_id)
    }
}

/// Serve one WebSocket connection until either side closes it
#[tracing::instrument(skip(stream, ctx), fields(conn_id = conn_id))]
pub(crate) async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    ctx: ConnectionContext,
) -> Result<()> {
    tracing::debug!("Upgrading connection to WebSocket");
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| Error::WebSocket(e.to_string()))?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let peer = ctx.peer(Connection::new(conn_id, tx));

    let active = {
        let mut registry = ctx.registry.lock().await;
        registry.insert(conn_id, peer.clone());
        registry.len() as i64
    };
    if let Some(m) = &ctx.metrics {
        m.record_connection(active);
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                tracing::error!(error = %e, "Error sending message");
                break;
            }
        }
    });

    let recv_peer = peer.clone();
    let metrics = ctx.metrics.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(message) = ws_receiver.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Some(m) = &metrics {
                        m.record_message();
                    }
                    let peer = recv_peer.clone();
                    tokio::spawn(async move {
                        if let Err(e) = peer.handle_text(&text).await {
                            tracing::debug!(error = %e, "Could not deliver reply");
                        }
                    });
                }
                Ok(Message::Close(_)) => {
                    tracing::info!("Connection closed by peer");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "WebSocket error");
                    if let Some(m) = &metrics {
                        m.record_error("websocket");
                    }
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    let active = {
        let mut registry = ctx.registry.lock().await;
        registry.remove(&conn_id);
        registry.len() as i64
    };
    peer.close();
    if let Some(m) = &ctx.metrics {
        m.record_disconnection(active);
    }

    tracing::info!("Connection cleaned up");
    Ok(())
}
