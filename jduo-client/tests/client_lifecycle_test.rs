//! Client connection lifecycle and server-initiated calls

mod common;

use common::{mock_notification, mock_request, MockWsServer};
use jduo_client::{ClientBuilder, JduoClient};
use jduo_core::{Error, Response};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_client_connect_success() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    assert!(client.is_connected());
    assert_eq!(client.url(), server.url());
    assert_eq!(client.pending_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn test_client_connect_bare_address() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.addr().to_string()).await.unwrap();

    assert_eq!(client.url(), server.url());
    server.shutdown().await;
}

#[tokio::test]
async fn test_client_connect_http_scheme() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&format!("http://{}", server.addr()))
        .await
        .unwrap();

    assert_eq!(client.url(), server.url());
    server.shutdown().await;
}

#[tokio::test]
async fn test_client_connect_refused() {
    let result = JduoClient::connect("ws://127.0.0.1:1").await;
    assert!(matches!(result, Err(Error::WebSocket(_))));
}

#[tokio::test]
async fn test_client_disconnect_graceful() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    client.disconnect();

    assert!(!client.is_connected());
    assert!(client.request("after", None).await.is_err());
    server.shutdown().await;
}

#[tokio::test]
async fn test_client_disconnect_fails_pending_requests() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    let caller = client.clone();
    let pending = tokio::spawn(async move { caller.request("never", None).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.disconnect();

    assert!(matches!(pending.await.unwrap(), Err(Error::ConnectionClosed)));
    server.shutdown().await;
}

#[tokio::test]
async fn test_server_closing_marks_client_disconnected() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    server.close_connection();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_server_calls_client_method() {
    let mut server = MockWsServer::silent().await;
    let client = ClientBuilder::new(server.url())
        .bind_method("whoami", |_| Response::ok("\"laptop\""))
        .unwrap()
        .connect()
        .await
        .unwrap();

    server.push(mock_request(7, "whoami", json!([])));

    let reply = server.next_message().await.unwrap();
    assert_eq!(reply, json!({"jsonrpc": "2.0", "result": "laptop", "id": 7}));
    drop(client);
    server.shutdown().await;
}

#[tokio::test]
async fn test_method_bound_after_connect() {
    let mut server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    client
        .bind_async("sum", |params, responder| {
            let v: Vec<i64> = serde_json::from_str(&params).unwrap_or_default();
            responder.respond(Response::ok(v.iter().sum::<i64>().to_string()));
        })
        .unwrap();
    server.push(mock_request(1, "sum", json!([1, 2, 3])));

    let reply = server.next_message().await.unwrap();
    assert_eq!(reply["result"], 6);
    assert_eq!(reply["id"], 1);
}

#[tokio::test]
async fn test_server_calls_unknown_client_method() {
    let mut server = MockWsServer::silent().await;
    let _client = JduoClient::connect(&server.url()).await.unwrap();

    server.push(mock_request(3, "missing", json!({})));

    let reply = server.next_message().await.unwrap();
    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["id"], 3);
}

#[tokio::test]
async fn test_notification_handler() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client
        .on_notification("tick", move |params| {
            let v: serde_json::Value = serde_json::from_str(params).unwrap();
            counter.fetch_add(v["n"].as_u64().unwrap() as usize, Ordering::SeqCst);
        })
        .unwrap();

    server.push(mock_notification("tick", json!({"n": 2})));
    server.push(mock_notification("tick", json!({"n": 3})));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(seen.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_reserved_method_rejected_at_runtime() {
    let server = MockWsServer::silent().await;
    let client = JduoClient::connect(&server.url()).await.unwrap();

    let result = client.bind("rpc.discover", |_| Response::ok("{}"));
    assert!(matches!(result, Err(Error::ReservedMethod(_))));
}
