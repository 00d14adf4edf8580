mod common;

use common::SseReader;
use devpod_mcp_protocol::JsonRpcResponse;
use devpod_mcp_transport::{SseTransport, Transport};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;

async fn start_server() -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let mut transport = SseTransport::new(common::echo_dispatcher(), addr_any(), None);
    let addr = transport.bind().await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        transport.start(shutdown_rx).await.unwrap();
    });
    (addr, shutdown_tx, handle)
}

fn addr_any() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

async fn stop_server(shutdown_tx: watch::Sender<bool>, handle: tokio::task::JoinHandle<()>) {
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop in time")
        .unwrap();
}

#[tokio::test]
async fn health_endpoint_reports_client_count() {
    let (addr, shutdown_tx, handle) = start_server().await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["clients"], 0);

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn endpoint_event_then_message_events() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let stream = client
        .get(format!("http://{addr}/sse"))
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    let mut reader = SseReader::new(stream);

    let (event, endpoint) = reader.next_event().await.unwrap();
    assert_eq!(event, "endpoint");
    assert!(endpoint.starts_with("/message?sessionId="));

    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "echo", "params": {"x": true}});
    let status = client
        .post(format!("http://{addr}{endpoint}"))
        .body(request.to_string())
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::ACCEPTED);

    let (event, data) = reader.next_event().await.unwrap();
    assert_eq!(event, "message");
    let response = JsonRpcResponse::decode(&data).unwrap();
    assert_eq!(response.id, json!(1));
    assert_eq!(response.result.unwrap()["echo"]["x"], true);

    drop(reader);
    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn posts_without_a_live_client_are_rejected() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let status = client
        .post(format!("http://{addr}/message?sessionId=nope"))
        .body("{}")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::NOT_FOUND);

    let status = client
        .post(format!("http://{addr}/message"))
        .body("{}")
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, StatusCode::BAD_REQUEST);

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn stream_registration_ignores_caller_supplied_ids() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    // Two connections both trying to claim the same id: each must get a
    // server-minted endpoint instead.
    let mut reader_a = SseReader::new(
        client
            .get(format!("http://{addr}/sse?sessionId=chosen"))
            .send()
            .await
            .unwrap(),
    );
    let mut reader_b = SseReader::new(
        client
            .get(format!("http://{addr}/sse?sessionId=chosen"))
            .send()
            .await
            .unwrap(),
    );
    let (_, endpoint_a) = reader_a.next_event().await.unwrap();
    let (_, endpoint_b) = reader_b.next_event().await.unwrap();
    assert_ne!(endpoint_a, "/message?sessionId=chosen");
    assert_ne!(endpoint_b, "/message?sessionId=chosen");
    assert_ne!(endpoint_a, endpoint_b);

    // The first client's endpoint still delivers to the first client.
    let request = json!({"jsonrpc": "2.0", "id": 3, "method": "echo", "params": {}});
    client
        .post(format!("http://{addr}{endpoint_a}"))
        .body(request.to_string())
        .send()
        .await
        .unwrap();
    let (_, data) = reader_a.next_event().await.unwrap();
    assert_eq!(JsonRpcResponse::decode(&data).unwrap().id, json!(3));

    drop(reader_a);
    drop(reader_b);
    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn clients_receive_only_their_own_responses() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let mut reader_a = SseReader::new(
        client
            .get(format!("http://{addr}/sse"))
            .send()
            .await
            .unwrap(),
    );
    let mut reader_b = SseReader::new(
        client
            .get(format!("http://{addr}/sse"))
            .send()
            .await
            .unwrap(),
    );
    let (_, endpoint_a) = reader_a.next_event().await.unwrap();
    let (_, endpoint_b) = reader_b.next_event().await.unwrap();
    assert_ne!(endpoint_a, endpoint_b);

    let request = json!({"jsonrpc": "2.0", "id": 42, "method": "echo", "params": {"to": "b"}});
    client
        .post(format!("http://{addr}{endpoint_b}"))
        .body(request.to_string())
        .send()
        .await
        .unwrap();

    let (_, data) = reader_b.next_event().await.unwrap();
    let response = JsonRpcResponse::decode(&data).unwrap();
    assert_eq!(response.result.unwrap()["echo"]["to"], "b");

    // Client A must still be pending, not holding B's response.
    let unexpected =
        tokio::time::timeout(Duration::from_millis(200), reader_a.next_event()).await;
    assert!(unexpected.is_err());

    drop(reader_a);
    drop(reader_b);
    stop_server(shutdown_tx, handle).await;
}
