//! Transport bindings for the DevPod MCP server
//!
//! Three transports share one contract: raw message bytes in, encoded
//! response bytes out (or nothing for notifications), always through the
//! single shared [`Dispatcher`](devpod_mcp_protocol::Dispatcher).
//!
//! - [`StdioTransport`]: newline-delimited JSON over stdin/stdout,
//!   dispatched inline per line.
//! - [`SseTransport`]: inbound `POST /message`, outbound per-client SSE
//!   event stream on `GET /sse`.
//! - [`HttpStreamsTransport`]: bidirectional streaming on a single
//!   `/mcp` route with `Mcp-Session-Id` session affinity.
//!
//! The HTTP transports additionally expose `GET /health` for liveness
//! probing.

use async_trait::async_trait;
use devpod_mcp_core::Result;
use tokio::sync::watch;

mod stdio;
pub use stdio::{run_message_loop, StdioTransport};

mod sse;
pub use sse::SseTransport;

mod streams;
pub use streams::HttpStreamsTransport;

/// Common lifecycle contract for all transport bindings
///
/// `start` serves until the shutdown signal fires or input ends; `stop`
/// ceases accepting new work; `close` releases held resources. Both
/// `stop` and `close` are idempotent.
#[async_trait]
pub trait Transport: Send {
    async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<()>;
    async fn stop(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// Resolves once either the external shutdown signal or the transport's
/// local stop signal fires
pub(crate) async fn shutdown_or_stop(
    mut shutdown: watch::Receiver<bool>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() || *stop.borrow() {
            return;
        }
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = stop.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
