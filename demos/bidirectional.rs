//! Both sides calling each other over one connection

use jduo_client::ClientBuilder;
use jduo_server::{from_typed_fn, JduoServer, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Deserialize, Serialize)]
struct LogParams {
    level: String,
    message: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = Arc::new(
        JduoServer::builder()
            .bind_str("127.0.0.1:8081")?
            .request_timeout(Duration::from_secs(5))
            .handler(
                "log",
                from_typed_fn(|p: LogParams| async move {
                    println!("[SERVER] [{}] {}", p.level, p.message);
                    Ok(serde_json::json!({"received": true}))
                }),
            )?
            .build()
            .await?,
    );
    println!("[SERVER] Started on ws://127.0.0.1:8081");

    let runner = Arc::clone(&server);
    tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            eprintln!("[SERVER] stopped: {}", e);
        }
    });

    let client = ClientBuilder::new("ws://127.0.0.1:8081")
        .bind_method("client.info", |_| Response::ok(r#"{"name":"demo-client"}"#))?
        .notify("status_update", |params| {
            println!("[CLIENT] Status update: {}", params);
        })?
        .connect()
        .await?;
    println!("[CLIENT] Connected");

    for i in 1..=3 {
        let result: serde_json::Value = client
            .request_typed(
                "log",
                LogParams {
                    level: "info".to_string(),
                    message: format!("Test message {}", i),
                },
            )
            .await?;
        println!("[CLIENT] Log response: {}", result);
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    for conn_id in server.connection_ids().await {
        let info = server.request(conn_id, "client.info", None).await?;
        println!("[SERVER] Connection {} says {}", conn_id, info.result);
    }

    let sent = server
        .emit("status_update", serde_json::json!({"status": "ready"}))
        .await?;
    println!("[SERVER] Status update sent to {} connection(s)", sent);

    tokio::time::sleep(Duration::from_millis(100)).await;
    client.disconnect();
    Ok(())
}
