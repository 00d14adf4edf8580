//! Server-push SSE transport
//!
//! Inbound messages arrive over `POST /message?sessionId=...`; outbound
//! messages are delivered on a long-lived, one-directional event stream
//! per connected client (`GET /sse`). The first event on a stream is an
//! `endpoint` event carrying the POST URL for that client; responses
//! follow as `message` events.
//!
//! Each client gets its own worker task that dispatches its queue
//! sequentially, so responses reach a client's stream in the order its
//! requests were dispatched while unrelated clients proceed
//! concurrently.

use crate::Transport;
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use devpod_mcp_core::{Error, Result};
use devpod_mcp_protocol::{Dispatcher, RequestContext};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct SseTransport {
    state: Arc<SseState>,
    addr: SocketAddr,
    listener: Option<TcpListener>,
    stop: (watch::Sender<bool>, watch::Receiver<bool>),
}

struct SseState {
    dispatcher: Arc<Dispatcher>,
    clients: DashMap<String, ClientEntry>,
    request_timeout: Option<Duration>,
    shutdown: Mutex<Option<watch::Receiver<bool>>>,
}

struct ClientEntry {
    inbox: mpsc::Sender<String>,
}

impl SseState {
    fn request_context(&self) -> RequestContext {
        let shutdown = self.shutdown.lock().expect("shutdown lock poisoned").clone();
        match shutdown {
            Some(rx) => RequestContext::new(rx, self.request_timeout),
            None => RequestContext::detached().with_timeout(self.request_timeout),
        }
    }
}

impl SseTransport {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        addr: SocketAddr,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            state: Arc::new(SseState {
                dispatcher,
                clients: DashMap::new(),
                request_timeout,
                shutdown: Mutex::new(None),
            }),
            addr,
            listener: None,
            stop: watch::channel(false),
        }
    }

    /// Bind the listen socket without starting to serve
    ///
    /// Split out so callers (and tests) can learn the bound address when
    /// listening on an ephemeral port.
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| Error::network(self.addr.to_string(), format!("failed to bind: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| Error::io("resolve local addr", e))?;
        self.listener = Some(listener);
        Ok(local)
    }

    /// Number of currently connected clients
    pub fn connected_clients(&self) -> usize {
        self.state.clients.len()
    }

    fn router(state: Arc<SseState>) -> Router {
        Router::new()
            .route("/sse", get(sse_handler))
            .route("/message", post(message_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        *self.state.shutdown.lock().expect("shutdown lock poisoned") = Some(shutdown.clone());

        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => {
                self.bind().await?;
                self.listener.take().expect("listener just bound")
            }
        };
        let local = listener
            .local_addr()
            .map_err(|e| Error::io("resolve local addr", e))?;
        info!(addr = %local, "SSE transport listening");

        let app = Self::router(Arc::clone(&self.state));
        let drain = crate::shutdown_or_stop(shutdown, self.stop.1.clone());
        axum::serve(listener, app)
            .with_graceful_shutdown(drain)
            .await
            .map_err(|e| Error::network(local.to_string(), format!("server error: {e}")))?;

        info!("SSE transport stopped");
        self.state.clients.clear();
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let _ = self.stop.0.send(true);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stop().await?;
        self.listener = None;
        self.state.clients.clear();
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ClientQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Removes the client table entry when its event stream drops
struct ClientGuard {
    state: Arc<SseState>,
    id: String,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.state.clients.remove(&self.id);
        debug!(client = %self.id, "SSE client disconnected");
    }
}

struct GuardedStream<S> {
    inner: S,
    _guard: ClientGuard,
}

impl<S: Stream + Unpin> Stream for GuardedStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

async fn sse_handler(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    // Always server-minted. Honoring a caller-chosen id here would let a
    // second connection capture an existing client's POST endpoint.
    let client_id = Uuid::new_v4().to_string();

    let (events_tx, events_rx) = mpsc::channel::<String>(64);
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<String>(64);
    state
        .clients
        .insert(client_id.clone(), ClientEntry { inbox: inbox_tx });
    info!(client = %client_id, clients = state.clients.len(), "SSE client connected");

    // Per-client worker: sequential dispatch preserves this client's
    // response order; other clients have their own workers.
    let worker_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(raw) = inbox_rx.recv().await {
            let ctx = worker_state.request_context();
            if let Some(response) = worker_state.dispatcher.dispatch(&raw, ctx).await {
                if events_tx.send(response).await.is_err() {
                    // Stream gone; remaining queue is undeliverable.
                    break;
                }
            }
        }
    });

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/message?sessionId={client_id}"));
    let messages = ReceiverStream::new(events_rx)
        .map(|payload| Ok(Event::default().event("message").data(payload)));
    let stream = GuardedStream {
        inner: futures::stream::iter([Ok(endpoint)]).chain(messages),
        _guard: ClientGuard {
            state,
            id: client_id,
        },
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn message_handler(
    State(state): State<Arc<SseState>>,
    Query(query): Query<ClientQuery>,
    body: String,
) -> impl IntoResponse {
    let Some(client_id) = query.session_id else {
        return (StatusCode::BAD_REQUEST, "missing sessionId").into_response();
    };
    // Clone the sender out so no map guard is held across the await.
    let Some(inbox) = state.clients.get(&client_id).map(|c| c.inbox.clone()) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };

    if inbox.send(body).await.is_err() {
        warn!(client = %client_id, "client worker gone, dropping message");
        return (StatusCode::GONE, "client disconnected").into_response();
    }
    StatusCode::ACCEPTED.into_response()
}

async fn health_handler(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "clients": state.clients.len(),
    }))
}
