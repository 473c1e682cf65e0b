//! WebSocket client
//!
//! A [`JduoClient`] is one [`Peer`] over a WebSocket connection: it calls methods on the
//! server and answers the calls the server makes on methods bound here.
//!
//! # Client Lifecycle
//!
//! 1. **Connect**: open the WebSocket and start the send and receive tasks
//! 2. **Use**: request, notify, batch; bind methods the server may call
//! 3. **Close**: [`JduoClient::disconnect`], or the server hangs up; either way every
//!    pending request fails with `ConnectionClosed`
//!
//! `JduoClient` is cheap to clone and all clones share one connection.

use crate::batch::{BatchRequest, BatchResponse};
use crate::url::normalize_url;
use futures::{SinkExt, StreamExt};
use jduo_core::{
    Emitter, Error, Handler, Id, Peer, Processor, Progress, Registry, Requester, Responder,
    Response, Result, RpcMetrics, Transport,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Outbound half of the client connection
#[derive(Clone)]
struct Outbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Transport for Outbound {
    fn send_text(&self, message: String) -> Result<()> {
        self.tx
            .send(Message::Text(message))
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Duplex JSON-RPC client over WebSocket
#[derive(Clone)]
pub struct JduoClient {
    peer: Peer,
    url: String,
    outbound: Outbound,
    connected: Arc<AtomicBool>,
}

impl JduoClient {
    /// Connect with default options
    ///
    /// See [`crate::ClientBuilder`] for timeouts, batch policy and methods bound up front.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::establish(url, Processor::new(Registry::new()), None, None).await
    }

    #[tracing::instrument(skip_all)]
    pub(crate) async fn establish(
        url: &str,
        processor: Processor,
        request_timeout: Option<Duration>,
        metrics: Option<Arc<RpcMetrics>>,
    ) -> Result<Self> {
        let url = normalize_url(url);
        tracing::info!(url = %url, "Connecting to server");
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let outbound = Outbound { tx };

        let mut requester = Requester::new(Emitter::new(outbound.clone()));
        if let Some(timeout) = request_timeout {
            requester = requester.with_timeout(timeout);
        }
        if let Some(m) = metrics {
            requester = requester.with_metrics(m);
        }
        let peer = Peer::from_parts(processor, requester);
        let connected = Arc::new(AtomicBool::new(true));

        let send_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_sender.send(msg).await {
                    tracing::debug!(error = %e, "Error sending message");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let recv_peer = peer.clone();
        let recv_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(message) = ws_receiver.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let peer = recv_peer.clone();
                        tokio::spawn(async move {
                            if let Err(e) = peer.handle_text(&text).await {
                                tracing::debug!(error = %e, "Could not deliver reply");
                            }
                        });
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("Connection closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "WebSocket error");
                        break;
                    }
                }
            }
            recv_connected.store(false, Ordering::SeqCst);
            recv_peer.close();
            send_task.abort();
        });

        tracing::info!("Connected");
        Ok(Self {
            peer,
            url,
            outbound,
            connected,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    /// The underlying peer
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn registry(&self) -> &Registry {
        self.peer.registry()
    }

    /// Call a method on the server
    ///
    /// Wire errors come back as an `Ok` [`Response`] with a non-zero `error`.
    #[tracing::instrument(skip(self, params))]
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Response> {
        self.ensure_connected()?;
        self.peer.request(method, params).await
    }

    /// Call a method, passing the server's progress reports to `on_progress`
    pub async fn request_with_progress<F>(
        &self,
        method: &str,
        params: Option<Value>,
        on_progress: F,
    ) -> Result<Response>
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.ensure_connected()?;
        self.peer
            .request_with_progress(method, params, on_progress)
            .await
    }

    /// Call a method with serde-typed params and result
    ///
    /// Wire errors surface as `Error::Rpc`.
    pub async fn request_typed<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        self.request(method, Some(params)).await?.parse()
    }

    /// Call a method without waiting; `continuation` runs once with the outcome
    pub fn request_with<F>(&self, method: &str, params: Option<Value>, continuation: F) -> Result<Id>
    where
        F: FnOnce(Result<Response>) + Send + 'static,
    {
        self.ensure_connected()?;
        self.peer.request_with(method, params, continuation)
    }

    /// Stop waiting for a request started with [`JduoClient::request_with`]
    pub fn cancel(&self, id: &Id) -> bool {
        self.peer.requester().cancel(id)
    }

    /// Send a notification to the server
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.ensure_connected()?;
        self.peer.emit(method, params)
    }

    /// Send several calls in one message
    #[tracing::instrument(skip(self, batch), fields(batch_size = batch.len()))]
    pub async fn batch(&self, batch: BatchRequest) -> Result<BatchResponse> {
        self.ensure_connected()?;
        let outcomes = self.peer.batch(batch.into_calls()).await?;
        Ok(BatchResponse::new(outcomes))
    }

    pub fn handler(&self, method: impl Into<String>, handler: Box<dyn Handler>) -> Result<()> {
        self.registry().register(method, handler)
    }

    /// Bind a synchronous method the server may call
    pub fn bind<F>(&self, method: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&str) -> Response + Send + Sync + 'static,
    {
        self.registry().bind(method, func)
    }

    pub fn bind_async<F>(&self, method: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(String, Responder) + Send + Sync + 'static,
    {
        self.registry().bind_async(method, func)
    }

    /// Run `func` with the params of every `method` notification from the server
    pub fn on_notification<F>(&self, method: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.registry().notify(method, func)
    }

    pub fn pending_count(&self) -> usize {
        self.peer.requester().pending_count()
    }

    /// Close the connection and fail every pending request
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::info!(url = %self.url, "Disconnecting");
        let _ = self.outbound.tx.send(Message::Close(None));
        self.peer.close();
    }
}

impl std::fmt::Debug for JduoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JduoClient")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
