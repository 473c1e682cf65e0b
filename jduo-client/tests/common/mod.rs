//! Common test utilities for jduo-client integration tests
//!
//! A scripted WebSocket server: every text frame it receives is recorded and passed to a
//! handler that may answer it, and tests can push frames of their own to the client.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

type Handler = Arc<dyn Fn(String) -> Option<String> + Send + Sync>;

/// Mock WebSocket server for client testing
pub struct MockWsServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    message_rx: mpsc::UnboundedReceiver<String>,
    push_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>>,
}

impl MockWsServer {
    /// A server that records frames and never answers
    pub async fn silent() -> Self {
        Self::with_handler(|_| None).await
    }

    /// A server that answers every frame with whatever `handler` returns
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(String) -> Option<String> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (msg_tx, message_rx) = mpsc::unbounded_channel::<String>();
        let push_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Message>>>> =
            Arc::new(Mutex::new(None));
        let latest = Arc::clone(&push_tx);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let msg_tx = msg_tx.clone();
                        let handler = Arc::clone(&handler);
                        let (conn_tx, mut conn_rx) = mpsc::unbounded_channel::<Message>();
                        *latest.lock().unwrap() = Some(conn_tx);

                        tokio::spawn(async move {
                            let Ok(ws_stream) = accept_async(stream).await else { return };
                            let (mut write, mut read) = ws_stream.split();
                            loop {
                                tokio::select! {
                                    pushed = conn_rx.recv() => {
                                        let Some(msg) = pushed else { break };
                                        let closing = matches!(msg, Message::Close(_));
                                        let _ = write.send(msg).await;
                                        if closing {
                                            break;
                                        }
                                    }
                                    incoming = read.next() => {
                                        match incoming {
                                            Some(Ok(Message::Text(text))) => {
                                                let _ = msg_tx.send(text.clone());
                                                if let Some(reply) = handler(text) {
                                                    let _ = write.send(Message::Text(reply)).await;
                                                }
                                            }
                                            Some(Ok(_)) => {}
                                            _ => break,
                                        }
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            message_rx,
            push_tx,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Next frame the server received, parsed as JSON
    pub async fn next_message(&mut self) -> Option<Value> {
        let text = tokio::time::timeout(Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()?;
        serde_json::from_str(&text).ok()
    }

    /// Send a text frame to the most recent connection
    pub fn push(&self, text: impl Into<String>) {
        if let Some(tx) = self.push_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Message::Text(text.into()));
        }
    }

    /// Close the most recent connection from the server side
    pub fn close_connection(&self) {
        if let Some(tx) = self.push_tx.lock().unwrap().take() {
            let _ = tx.send(Message::Close(None));
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Id of a request frame
pub fn request_id(msg: &str) -> Value {
    serde_json::from_str::<Value>(msg)
        .ok()
        .and_then(|v| v.get("id").cloned())
        .unwrap_or(Value::Null)
}

pub fn method_of(msg: &str) -> Option<String> {
    serde_json::from_str::<Value>(msg)
        .ok()?
        .get("method")?
        .as_str()
        .map(str::to_string)
}

pub fn mock_response(id: Value, result: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id
    })
    .to_string()
}

pub fn mock_error_response(id: Value, code: i32, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": id
    })
    .to_string()
}

pub fn mock_request(id: i64, method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id
    })
    .to_string()
}

pub fn mock_notification(method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
    .to_string()
}
