mod common;

use common::SseReader;
use devpod_mcp_protocol::JsonRpcResponse;
use devpod_mcp_transport::{HttpStreamsTransport, Transport};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;

const SESSION_HEADER: &str = "mcp-session-id";

async fn start_server() -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let mut transport = HttpStreamsTransport::new(
        common::echo_dispatcher(),
        "127.0.0.1:0".parse().unwrap(),
        None,
        Duration::from_secs(300),
    );
    let addr = transport.bind().await.unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        transport.start(shutdown_rx).await.unwrap();
    });
    (addr, shutdown_tx, handle)
}

async fn stop_server(shutdown_tx: watch::Sender<bool>, handle: tokio::task::JoinHandle<()>) {
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop in time")
        .unwrap();
}

fn session_token(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(SESSION_HEADER)
        .expect("session header must be present")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn initialize_is_answered_inline_with_a_session_token() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let request = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
    let response = client
        .post(format!("http://{addr}/mcp"))
        .body(request.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = session_token(&response);
    assert!(!token.is_empty());

    let body = JsonRpcResponse::decode(&response.text().await.unwrap()).unwrap();
    let result = body.result.unwrap();
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "devpod-mcp");

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn responses_flow_through_the_session_stream() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
    let response = client
        .post(format!("http://{addr}/mcp"))
        .body(init.to_string())
        .send()
        .await
        .unwrap();
    let token = session_token(&response);

    // Queued before the stream attaches; delivered once it does.
    let request = json!({"jsonrpc": "2.0", "id": 2, "method": "echo", "params": {"n": 5}});
    let accepted = client
        .post(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, &token)
        .body(request.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
    assert_eq!(session_token(&accepted), token);

    let stream = client
        .get(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(stream.status(), StatusCode::OK);
    let mut reader = SseReader::new(stream);

    let (_, data) = reader.next_event().await.unwrap();
    let body = JsonRpcResponse::decode(&data).unwrap();
    assert_eq!(body.id, json!(2));
    assert_eq!(body.result.unwrap()["echo"]["n"], 5);

    // The stream is single-attach.
    let conflict = client
        .get(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, &token)
        .send()
        .await
        .unwrap();
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    drop(reader);
    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn sessions_are_never_cross_visible() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();
    let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});

    let token_a = session_token(
        &client
            .post(format!("http://{addr}/mcp"))
            .body(init.to_string())
            .send()
            .await
            .unwrap(),
    );
    let token_b = session_token(
        &client
            .post(format!("http://{addr}/mcp"))
            .body(init.to_string())
            .send()
            .await
            .unwrap(),
    );
    assert_ne!(token_a, token_b);

    let mut stream_a = SseReader::new(
        client
            .get(format!("http://{addr}/mcp"))
            .header(SESSION_HEADER, &token_a)
            .send()
            .await
            .unwrap(),
    );
    let mut stream_b = SseReader::new(
        client
            .get(format!("http://{addr}/mcp"))
            .header(SESSION_HEADER, &token_b)
            .send()
            .await
            .unwrap(),
    );

    let request = json!({"jsonrpc": "2.0", "id": 9, "method": "echo", "params": {"who": "a"}});
    let accepted = client
        .post(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, &token_a)
        .body(request.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);

    // B's stream must stay silent while A's request is answered.
    let leaked = tokio::time::timeout(Duration::from_millis(300), stream_b.next_event()).await;
    assert!(leaked.is_err());

    let (_, data) = stream_a.next_event().await.unwrap();
    let body = JsonRpcResponse::decode(&data).unwrap();
    assert_eq!(body.id, json!(9));
    assert_eq!(body.result.unwrap()["echo"]["who"], "a");

    drop(stream_a);
    drop(stream_b);
    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn unknown_token_starts_a_fresh_session() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let init = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
    let response = client
        .post(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, "made-up-token")
        .body(init.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let token = session_token(&response);
    assert_ne!(token, "made-up-token");

    let health: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sessions"], 1);

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn notifications_are_accepted_without_a_body() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let notification = json!({"jsonrpc": "2.0", "method": "echo", "params": {}});
    let response = client
        .post(format!("http://{addr}/mcp"))
        .body(notification.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(response.text().await.unwrap().is_empty());

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn stream_requires_a_known_session() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/mcp"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .get(format!("http://{addr}/mcp"))
        .header(SESSION_HEADER, "missing")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    stop_server(shutdown_tx, handle).await;
}

#[tokio::test]
async fn malformed_body_gets_an_inline_error_envelope() {
    let (addr, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/mcp"))
        .body("not json at all")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = JsonRpcResponse::decode(&response.text().await.unwrap()).unwrap();
    assert_eq!(body.id, Value::Null);
    assert_eq!(
        body.error.unwrap().code,
        devpod_mcp_protocol::error_codes::PARSE_ERROR
    );

    stop_server(shutdown_tx, handle).await;
}
