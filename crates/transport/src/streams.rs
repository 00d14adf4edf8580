//! Session-based bidirectional HTTP streaming transport
//!
//! A single `/mcp` route carries both directions. `POST /mcp` without an
//! `Mcp-Session-Id` header mints a session and returns its token in the
//! response headers before any application-level payload; subsequent
//! requests present the token. `GET /mcp` with the token attaches the
//! session's one-directional SSE event stream, which carries responses
//! to every request except `initialize` (answered inline so a client can
//! bootstrap before its stream exists).
//!
//! Sessions are fully independent: one worker, one outbound channel per
//! token. Idle sessions are evicted by a background sweep.

use crate::Transport;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use devpod_mcp_core::{Error, Result};
use devpod_mcp_protocol::{Dispatcher, JsonRpcRequest, RequestContext};
use futures::StreamExt;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session-affinity header, set on every response belonging to a session
pub const SESSION_HEADER: HeaderName = HeaderName::from_static("mcp-session-id");

/// How often the eviction sweep runs
const EVICTION_INTERVAL: Duration = Duration::from_secs(30);

pub struct HttpStreamsTransport {
    state: Arc<StreamsState>,
    addr: SocketAddr,
    listener: Option<TcpListener>,
    stop: (watch::Sender<bool>, watch::Receiver<bool>),
}

struct StreamsState {
    dispatcher: Arc<Dispatcher>,
    sessions: DashMap<String, Arc<Session>>,
    request_timeout: Option<Duration>,
    idle_timeout: Duration,
    shutdown: Mutex<Option<watch::Receiver<bool>>>,
}

/// One logical conversation bound to a token
struct Session {
    token: String,
    created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
    inbox: mpsc::Sender<String>,
    events_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl Session {
    fn touch(&self) {
        *self.last_activity.lock().expect("activity lock poisoned") = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .expect("activity lock poisoned")
            .elapsed()
    }
}

impl StreamsState {
    fn request_context(&self) -> RequestContext {
        let shutdown = self.shutdown.lock().expect("shutdown lock poisoned").clone();
        match shutdown {
            Some(rx) => RequestContext::new(rx, self.request_timeout),
            None => RequestContext::detached().with_timeout(self.request_timeout),
        }
    }

    /// Mint a fresh session with its own worker and outbound channel
    fn mint_session(self: &Arc<Self>) -> Arc<Session> {
        let token = Uuid::new_v4().to_string();
        let (events_tx, events_rx) = mpsc::channel::<String>(256);
        let (inbox_tx, mut inbox_rx) = mpsc::channel::<String>(64);

        let session = Arc::new(Session {
            token: token.clone(),
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
            inbox: inbox_tx,
            events_rx: Mutex::new(Some(events_rx)),
        });
        self.sessions.insert(token.clone(), Arc::clone(&session));
        info!(session = %token, sessions = self.sessions.len(), "session created");

        // Per-session worker: sequential dispatch keeps this session's
        // outbound stream free of interleaved or reordered frames.
        let state = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(raw) = inbox_rx.recv().await {
                let ctx = state.request_context();
                if let Some(response) = state.dispatcher.dispatch(&raw, ctx).await {
                    if events_tx.send(response).await.is_err() {
                        break;
                    }
                }
            }
            debug!(session = %token, "session worker exited");
        });

        session
    }

    fn evict_idle(&self) {
        let expired: Vec<(String, DateTime<Utc>)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > self.idle_timeout)
            .map(|entry| (entry.key().clone(), entry.value().created_at))
            .collect();
        for (token, created_at) in expired {
            if self.sessions.remove(&token).is_some() {
                info!(session = %token, %created_at, "evicted idle session");
            }
        }
    }
}

impl HttpStreamsTransport {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        addr: SocketAddr,
        request_timeout: Option<Duration>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            state: Arc::new(StreamsState {
                dispatcher,
                sessions: DashMap::new(),
                request_timeout,
                idle_timeout,
                shutdown: Mutex::new(None),
            }),
            addr,
            listener: None,
            stop: watch::channel(false),
        }
    }

    /// Bind the listen socket without starting to serve
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

    /// Number of currently active sessions
    pub fn active_sessions(&self) -> usize {
        self.state.sessions.len()
    }

    fn router(state: Arc<StreamsState>) -> Router {
        Router::new()
            .route("/mcp", get(stream_handler).post(message_handler))
            .route("/health", get(health_handler))
            .with_state(state)
    }
}

#[async_trait]
impl Transport for HttpStreamsTransport {
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
        info!(addr = %local, "HTTP streams transport listening on /mcp (POST/GET), /health (GET)");

        // Idle-session sweep, stopped with the server.
        let sweep_state = Arc::clone(&self.state);
        let sweep_drain = crate::shutdown_or_stop(shutdown.clone(), self.stop.1.clone());
        let sweeper = tokio::spawn(async move {
            tokio::pin!(sweep_drain);
            let mut tick = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                tokio::select! {
                    _ = tick.tick() => sweep_state.evict_idle(),
                    () = &mut sweep_drain => break,
                }
            }
        });

        let app = Self::router(Arc::clone(&self.state));
        let drain = crate::shutdown_or_stop(shutdown, self.stop.1.clone());
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(drain)
            .await
            .map_err(|e| Error::network(local.to_string(), format!("server error: {e}")));

        let _ = sweeper.await;
        self.state.sessions.clear();
        info!("HTTP streams transport stopped");
        served
    }

    async fn stop(&mut self) -> Result<()> {
        let _ = self.stop.0.send(true);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.stop().await?;
        self.listener = None;
        self.state.sessions.clear();
        Ok(())
    }
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn message_handler(
    State(state): State<Arc<StreamsState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    // An unknown token is accepted but starts a fresh conversation: the
    // caller gets a new token back and can never observe another
    // session's channel.
    let session = session_token(&headers)
        .and_then(|token| state.sessions.get(&token).map(|s| Arc::clone(s.value())))
        .unwrap_or_else(|| state.mint_session());
    session.touch();
    let token = session.token.clone();

    match JsonRpcRequest::decode(&body) {
        // One bad message never takes the transport down; the error
        // envelope goes straight back in the POST body.
        Err(_) => {
            let response = state
                .dispatcher
                .dispatch(&body, state.request_context())
                .await
                .unwrap_or_default();
            (
                StatusCode::OK,
                [(SESSION_HEADER, token)],
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                response,
            )
                .into_response()
        }
        Ok(request) if request.is_notification() => {
            let none = state
                .dispatcher
                .dispatch(&body, state.request_context())
                .await;
            debug_assert!(none.is_none());
            (StatusCode::ACCEPTED, [(SESSION_HEADER, token)]).into_response()
        }
        // Answered inline so a client can learn its token and establish
        // the event stream afterwards.
        Ok(request) if request.method == "initialize" => {
            let response = state
                .dispatcher
                .dispatch(&body, state.request_context())
                .await
                .unwrap_or_default();
            (
                StatusCode::OK,
                [(SESSION_HEADER, token)],
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                response,
            )
                .into_response()
        }
        Ok(_) => {
            if session.inbox.send(body).await.is_err() {
                warn!(session = %token, "session worker gone, dropping request");
                return (StatusCode::GONE, "session closed").into_response();
            }
            (StatusCode::ACCEPTED, [(SESSION_HEADER, token)]).into_response()
        }
    }
}

async fn stream_handler(
    State(state): State<Arc<StreamsState>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = session_token(&headers) else {
        return (StatusCode::BAD_REQUEST, "missing Mcp-Session-Id").into_response();
    };
    let Some(session) = state.sessions.get(&token).map(|s| Arc::clone(s.value())) else {
        return (StatusCode::NOT_FOUND, "unknown session").into_response();
    };
    session.touch();

    let receiver = session
        .events_rx
        .lock()
        .expect("events lock poisoned")
        .take();
    let Some(receiver) = receiver else {
        return (StatusCode::CONFLICT, "event stream already attached").into_response();
    };
    debug!(session = %token, "event stream attached");

    let stream = ReceiverStream::new(receiver)
        .map(|payload| Ok::<_, std::convert::Infallible>(Event::default().data(payload)));
    (
        [(SESSION_HEADER, token)],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

async fn health_handler(State(state): State<Arc<StreamsState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "sessions": state.sessions.len(),
    }))
}
