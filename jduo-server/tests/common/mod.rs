//! Shared helpers for jduo-server integration tests

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use jduo_server::{JduoServer, ServerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct RunningServer {
    pub server: Arc<JduoServer>,
    pub url: String,
    handle: JoinHandle<()>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Build on an ephemeral port and start accepting
pub async fn start(builder: ServerBuilder) -> RunningServer {
    let server = Arc::new(builder.bind_str("127.0.0.1:0").unwrap().build().await.unwrap());
    let url = format!("ws://{}", server.local_addr().unwrap());
    let runner = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        let _ = runner.run().await;
    });
    RunningServer {
        server,
        url,
        handle,
    }
}

/// Poll until the server has `count` open connections
pub async fn wait_for_connections(server: &JduoServer, count: usize) {
    for _ in 0..100 {
        if server.connection_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {} connections, found {}",
        count,
        server.connection_count().await
    );
}

/// Bare WebSocket client for exercising the wire format directly
pub struct RawClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl RawClient {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.unwrap();
        Self { ws }
    }

    pub async fn send(&mut self, text: &str) {
        self.ws.send(Message::Text(text.to_string())).await.unwrap();
    }

    /// Next text frame, or `None` if nothing arrives within `wait`
    pub async fn recv_within(&mut self, wait: Duration) -> Option<serde_json::Value> {
        loop {
            let next = tokio::time::timeout(wait, self.ws.next()).await.ok()??;
            if let Ok(Message::Text(text)) = next {
                return serde_json::from_str(&text).ok();
            }
        }
    }

    pub async fn recv(&mut self) -> serde_json::Value {
        self.recv_within(Duration::from_secs(5))
            .await
            .expect("no reply from server")
    }

    /// Send and wait for the reply
    pub async fn call(&mut self, text: &str) -> serde_json::Value {
        self.send(text).await;
        self.recv().await
    }
}
