//! jduo - symmetric JSON-RPC 2.0 over WebSocket
//!
//! Convenience crate that re-exports the jduo sub-crates. Both ends of a jduo connection
//! are peers: each can call methods the other has bound, on the same socket.
//!
//! - **jduo-core**: wire types, processor, registry, request correlation, observability
//! - **jduo-server**: WebSocket server, one peer per connection
//! - **jduo-client**: WebSocket client
//!
//! # Quick Start - Server
//!
//! ```rust,no_run
//! use jduo::server::from_typed_fn;
//! use jduo::JduoServer;
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
//! # Quick Start - Client
//!
//! ```rust,no_run
//! use jduo::JduoClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JduoClient::connect("ws://localhost:8080").await?;
//!
//!     let sum: i32 = client.request_typed("add", serde_json::json!({"a": 5, "b": 3})).await?;
//!     println!("Result: {}", sum);
//!
//!     Ok(())
//! }
//! ```

pub use jduo_client as client;
pub use jduo_core as core;
pub use jduo_server as server;

pub use jduo_client::JduoClient;
pub use jduo_core::{Error, Peer, Processor, Registry, Response, Result};
pub use jduo_server::JduoServer;
