//! Duplex JSON-RPC 2.0 client over WebSocket
//!
//! The client is a full peer: besides calling the server it can bind methods that the
//! server calls back over the same connection.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jduo_client::JduoClient;
//! use jduo_core::Response;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JduoClient::connect("ws://localhost:8080").await?;
//!
//!     // answer calls from the server
//!     client.bind("whoami", |_| Response::ok("\"cli\""))?;
//!
//!     let sum: i64 = client.request_typed("sum", json!([1, 2])).await?;
//!     println!("sum = {}", sum);
//!
//!     client.notify("log", json!({"event": "done"}))?;
//!     client.disconnect();
//!     Ok(())
//! }
//! ```

mod batch;
mod client;
mod client_builder;
mod url;

pub use batch::{BatchRequest, BatchResponse};
pub use client::JduoClient;
pub use client_builder::ClientBuilder;
pub use url::normalize_url;
