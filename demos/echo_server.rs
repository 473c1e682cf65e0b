//! JSON-RPC server with a few methods and batch limits

use jduo_server::{from_typed_fn, BatchMode, JduoServer, Response};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct AddParams {
    a: i64,
    b: i64,
}

#[derive(Serialize)]
struct AddResult {
    sum: i64,
}

#[derive(Deserialize)]
struct GreetParams {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("Starting JSON-RPC server on ws://127.0.0.1:8080");

    let server = JduoServer::builder()
        .bind_str("127.0.0.1:8080")?
        .batch_mode(BatchMode::Parallel)
        .max_batch_size(50)
        .handler(
            "add",
            from_typed_fn(|p: AddParams| async move { Ok(AddResult { sum: p.a + p.b }) }),
        )?
        .handler(
            "greet",
            from_typed_fn(|p: GreetParams| async move { Ok(format!("Hello, {}!", p.name)) }),
        )?
        .bind_method("echo", |params| {
            if params.is_empty() {
                Response::ok("null")
            } else {
                Response::ok(params)
            }
        })?
        .notify("log", |params| println!("[log] {}", params))?
        .build()
        .await?;

    println!("Server is running. Available methods:");
    println!("  - add(a, b): Add two numbers");
    println!("  - greet(name): Greet someone");
    println!("  - echo(value): Echo back the params");
    println!("  - log(...): Print the params");
    println!("\nPress Ctrl+C to stop");

    server.run().await?;

    Ok(())
}
