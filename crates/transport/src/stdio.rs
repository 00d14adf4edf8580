//! Line-oriented stdio transport
//!
//! Reads one JSON-RPC message per line from stdin, dispatches it inline,
//! and writes the encoded response (if any) to stdout. The peer closing
//! stdin is normal termination, not an error.

use crate::Transport;
use async_trait::async_trait;
use devpod_mcp_core::{Error, Result};
use devpod_mcp_protocol::{Dispatcher, RequestContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

pub struct StdioTransport {
    dispatcher: Arc<Dispatcher>,
    request_timeout: Option<Duration>,
    stop: (watch::Sender<bool>, watch::Receiver<bool>),
}

impl StdioTransport {
    pub fn new(dispatcher: Arc<Dispatcher>, request_timeout: Option<Duration>) -> Self {
        Self {
            dispatcher,
            request_timeout,
            stop: watch::channel(false),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("stdio transport started");
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        run_message_loop(
            reader,
            writer,
            Arc::clone(&self.dispatcher),
            shutdown,
            self.stop.1.clone(),
            self.request_timeout,
        )
        .await
    }

    async fn stop(&mut self) -> Result<()> {
        let _ = self.stop.0.send(true);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // stdin/stdout are process-owned; nothing else is held.
        self.stop().await
    }
}

/// Drive the line-oriented message loop over any byte streams
///
/// Extracted from the transport so tests can run it over in-memory
/// duplex pipes. Each line is dispatched inline; a decode failure only
/// fails that one message. EOF exits the loop cleanly.
pub async fn run_message_loop<R, W>(
    mut reader: R,
    mut writer: W,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Receiver<bool>,
    stop: watch::Receiver<bool>,
    request_timeout: Option<Duration>,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = tokio::select! {
            read = reader.read_line(&mut line) => {
                read.map_err(|e| Error::io("read message line", e))?
            }
            () = crate::shutdown_or_stop(shutdown.clone(), stop.clone()) => {
                info!("stdio transport shutting down");
                return Ok(());
            }
        };
        if read == 0 {
            // Peer closed its side; normal termination.
            debug!("stdin closed, exiting message loop");
            return Ok(());
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let ctx = RequestContext::new(shutdown.clone(), request_timeout);
        if let Some(response) = dispatcher.dispatch(trimmed, ctx).await {
            writer
                .write_all(response.as_bytes())
                .await
                .map_err(|e| Error::io("write response", e))?;
            writer
                .write_all(b"\n")
                .await
                .map_err(|e| Error::io("write response delimiter", e))?;
            writer
                .flush()
                .await
                .map_err(|e| Error::io("flush response", e))?;
        }
    }
}
