//! Wire-level behaviour of the server, driven by a bare WebSocket client

mod common;

use common::{start, RawClient};
use jduo_server::{BatchMode, JduoServer, Response};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(200);

fn calculator() -> jduo_server::ServerBuilder {
    JduoServer::builder()
        .bind_method("add", |params| {
            let v: Vec<i64> = serde_json::from_str(params).unwrap_or_default();
            Response::ok(v.iter().sum::<i64>().to_string())
        })
        .unwrap()
        .bind_method("fail", |_| Response::error(-32000, "Handler failed"))
        .unwrap()
        .notify("log", |_| {})
        .unwrap()
}

#[tokio::test]
async fn test_single_call() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(r#"{"jsonrpc":"2.0","method":"add","params":[1,2],"id":1}"#)
        .await;

    assert_eq!(reply, json!({"jsonrpc": "2.0", "result": 3, "id": 1}));
}

#[tokio::test]
async fn test_string_id_is_echoed() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(r#"{"jsonrpc":"2.0","method":"add","params":[4],"id":"abc"}"#)
        .await;

    assert_eq!(reply["id"], "abc");
    assert_eq!(reply["result"], 4);
}

#[tokio::test]
async fn test_handler_error_passes_through() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(r#"{"jsonrpc":"2.0","method":"fail","id":2}"#)
        .await;

    assert_eq!(
        reply,
        json!({"jsonrpc": "2.0", "error": {"code": -32000, "message": "Handler failed"}, "id": 2})
    );
}

#[tokio::test]
async fn test_notify_acknowledgement() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(r#"{"jsonrpc":"2.0","method":"log","params":["x"],"id":3}"#)
        .await;

    assert_eq!(reply["result"], "OK");
}

#[tokio::test]
async fn test_parse_error() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client.call(r#"{"jsonrpc":"2.0","method":"add""#).await;

    assert_eq!(reply["error"]["code"], -32700);
    assert_eq!(reply["error"]["message"], "Parse error");
    assert!(reply["id"].is_null());
}

#[tokio::test]
async fn test_method_not_found() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(r#"{"jsonrpc":"2.0","method":"rpc.add","id":5}"#)
        .await;

    assert_eq!(reply["error"]["code"], -32601);
    assert_eq!(reply["error"]["message"], "Method not found");
    assert_eq!(reply["id"], 5);
}

#[tokio::test]
async fn test_invalid_request() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client.call(r#"{"jsonrpc":"1.0","method":"add","id":6}"#).await;
    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(reply["id"], 6);

    let reply = client.call(r#"{"bad":1}"#).await;
    assert_eq!(reply["error"]["code"], -32600);
    assert!(reply["id"].is_null());
}

#[tokio::test]
async fn test_notification_gets_no_reply() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    client
        .send(r#"{"jsonrpc":"2.0","method":"add","params":[1]}"#)
        .await;
    client.send(r#"{"jsonrpc":"2.0","method":"missing"}"#).await;

    assert!(client.recv_within(QUIET).await.is_none());
}

#[tokio::test]
async fn test_empty_batch() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client.call("[]").await;

    assert!(reply.is_object());
    assert_eq!(reply["error"]["code"], -32600);
    assert!(reply["id"].is_null());
}

#[tokio::test]
async fn test_mixed_batch_keeps_order() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(
            r#"[
                {"jsonrpc":"2.0","method":"add","params":[1,2],"id":"1"},
                {"jsonrpc":"2.0","method":"log","params":["n"]},
                {"jsonrpc":"2.0","method":"missing","id":"2"},
                1,
                {"jsonrpc":"2.0","method":"add","params":[5],"id":"3"}
            ]"#,
        )
        .await;

    let replies = reply.as_array().unwrap();
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0], json!({"jsonrpc": "2.0", "result": 3, "id": "1"}));
    assert_eq!(replies[1]["error"]["code"], -32601);
    assert_eq!(replies[1]["id"], "2");
    assert_eq!(replies[2]["error"]["code"], -32600);
    assert!(replies[2]["id"].is_null());
    assert_eq!(replies[3]["result"], 5);
}

#[tokio::test]
async fn test_all_notification_batch_gets_no_reply() {
    let running = start(calculator()).await;
    let mut client = RawClient::connect(&running.url).await;

    client
        .send(r#"[{"jsonrpc":"2.0","method":"log"},{"jsonrpc":"2.0","method":"add","params":[1]}]"#)
        .await;

    assert!(client.recv_within(QUIET).await.is_none());
}

#[tokio::test]
async fn test_batch_size_limit() {
    let running = start(calculator().max_batch_size(2)).await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(
            r#"[{"jsonrpc":"2.0","method":"add","id":1},
                {"jsonrpc":"2.0","method":"add","id":2},
                {"jsonrpc":"2.0","method":"add","id":3}]"#,
        )
        .await;

    assert_eq!(reply["error"]["code"], -32600);
    assert_eq!(
        reply["error"]["message"],
        "Batch size limit exceeded: limit=2, actual=3"
    );
}

#[tokio::test]
async fn test_sequential_batch_runs_in_order() {
    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    let running = start(
        JduoServer::builder()
            .batch_mode(BatchMode::Sequential)
            .bind_method("mark", move |params| {
                seen.lock().unwrap().push(params.to_string());
                Response::ok("null")
            })
            .unwrap(),
    )
    .await;
    let mut client = RawClient::connect(&running.url).await;

    let reply = client
        .call(
            r#"[{"jsonrpc":"2.0","method":"mark","params":[1],"id":1},
                {"jsonrpc":"2.0","method":"mark","params":[2],"id":2},
                {"jsonrpc":"2.0","method":"mark","params":[3],"id":3}]"#,
        )
        .await;

    assert_eq!(reply.as_array().unwrap().len(), 3);
    assert_eq!(*order.lock().unwrap(), vec!["[1]", "[2]", "[3]"]);
}

#[tokio::test]
async fn test_slow_call_does_not_block_the_connection() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let running = start(
        JduoServer::builder()
            .bind_async("slow", move |_, responder| {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    responder.respond(Response::ok("\"slow\""));
                });
            })
            .unwrap()
            .bind_method("fast", |_| Response::ok("\"fast\""))
            .unwrap(),
    )
    .await;
    let mut client = RawClient::connect(&running.url).await;

    client.send(r#"{"jsonrpc":"2.0","method":"slow","id":1}"#).await;
    client.send(r#"{"jsonrpc":"2.0","method":"fast","id":2}"#).await;

    let first = client.recv().await;
    let second = client.recv().await;
    assert_eq!(first["result"], "fast");
    assert_eq!(second["result"], "slow");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
