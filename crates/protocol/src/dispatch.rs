//! Transport-agnostic request dispatcher
//!
//! Exactly one dispatcher instance is shared by every transport binding.
//! A transport hands it the raw bytes of one message and gets back the
//! encoded response envelope, or nothing for notifications.

use crate::envelope::{DecodeError, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use crate::registry::OperationRegistry;
use devpod_mcp_core::{MCP_PROTOCOL_VERSION, SERVER_NAME};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Per-request invocation context
///
/// Carries the process-wide shutdown signal and the optional per-request
/// timeout. Handlers pass it down to anything that blocks, most notably
/// external-tool child processes.
#[derive(Clone)]
pub struct RequestContext {
    shutdown: Option<watch::Receiver<bool>>,
    timeout: Option<Duration>,
}

impl RequestContext {
    pub fn new(shutdown: watch::Receiver<bool>, timeout: Option<Duration>) -> Self {
        Self {
            shutdown: Some(shutdown),
            timeout,
        }
    }

    /// Context with no cancellation signal and no timeout, for tests and
    /// one-shot invocations
    pub fn detached() -> Self {
        Self {
            shutdown: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Resolves when the process-wide shutdown signal fires; pends
    /// forever for detached contexts
    pub async fn cancelled(&self) {
        match &self.shutdown {
            Some(rx) => {
                let mut rx = rx.clone();
                if *rx.borrow() {
                    return;
                }
                loop {
                    // A dropped sender means the process is tearing down.
                    if rx.changed().await.is_err() {
                        return;
                    }
                    if *rx.borrow() {
                        return;
                    }
                }
            }
            None => std::future::pending().await,
        }
    }

    /// Whether shutdown has already been signalled
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// The request dispatcher shared by all transports
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<OperationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Decode one raw message, invoke the matching operation, and encode
    /// the response
    ///
    /// Returns `None` for notifications: a message without an id must
    /// never receive bytes on the wire, regardless of handler outcome.
    pub async fn dispatch(&self, raw: &str, ctx: RequestContext) -> Option<String> {
        let request = match JsonRpcRequest::decode(raw) {
            Ok(request) => request,
            Err(DecodeError::Parse(message)) => {
                debug!(error = %message, "failed to parse message");
                return Some(
                    JsonRpcResponse::error(Value::Null, JsonRpcError::parse_error(message))
                        .encode(),
                );
            }
            Err(DecodeError::InvalidRequest(message)) => {
                debug!(error = %message, "invalid request envelope");
                return Some(
                    JsonRpcResponse::error(Value::Null, JsonRpcError::invalid_request(message))
                        .encode(),
                );
            }
        };

        if request.is_notification() {
            self.handle_notification(request).await;
            return None;
        }

        let id = request.id.clone().unwrap_or(Value::Null);
        let method = request.method.clone();
        debug!(method = %method, "dispatching request");

        let outcome = self.handle_request(&request, &ctx).await;
        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::error(id, error),
        };
        Some(response.encode())
    }

    async fn handle_notification(&self, request: JsonRpcRequest) {
        let params = request.params.unwrap_or(Value::Null);
        match self.registry.resolve_notification(&request.method) {
            Some(handler) => {
                if let Err(e) = handler.notify(params).await {
                    warn!(method = %request.method, error = %e, "notification handler failed");
                }
            }
            // Notifications are advisory; an unknown one is not an error.
            None => debug!(method = %request.method, "no handler for notification"),
        }
    }

    async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        ctx: &RequestContext,
    ) -> Result<Value, JsonRpcError> {
        let params = request.params.clone().unwrap_or(Value::Null);

        // Reserved methods the server always answers itself. These are
        // never delegated, so the introspection list can only ever be
        // assembled from the registry's actual contents.
        match request.method.as_str() {
            "initialize" => return Ok(self.initialize_result()),
            "tools/list" => {
                return Ok(json!({ "tools": self.registry.descriptors() }));
            }
            "tools/call" => return self.handle_tool_call(params, ctx).await,
            "prompts/list" => return Ok(json!({ "prompts": [] })),
            "resources/list" => return Ok(json!({ "resources": [] })),
            _ => {}
        }

        match self.registry.resolve(&request.method) {
            Some(handler) => {
                self.invoke(&request.method, handler.as_ref(), params, ctx)
                    .await
            }
            None => Err(JsonRpcError::method_not_found(&request.method)),
        }
    }

    /// Route a `tools/call` request to the named operation and wrap its
    /// result in an MCP text content block
    async fn handle_tool_call(
        &self,
        params: Value,
        ctx: &RequestContext,
    ) -> Result<Value, JsonRpcError> {
        let tool_name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool name"))?
            .to_string();
        let arguments = params
            .get("arguments")
            .cloned()
            .unwrap_or_else(|| json!({}));

        let handler = self
            .registry
            .resolve(&tool_name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("Unknown tool: {tool_name}")))?;

        let result = self
            .invoke(&tool_name, handler.as_ref(), arguments, ctx)
            .await?;

        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| JsonRpcError::internal(format!("failed to render tool result: {e}")))?;
        Ok(json!({
            "content": [{ "type": "text", "text": text }]
        }))
    }

    /// Invoke a handler under the context's timeout and the process-wide
    /// shutdown signal
    async fn invoke(
        &self,
        method: &str,
        handler: &dyn crate::registry::OperationHandler,
        params: Value,
        ctx: &RequestContext,
    ) -> Result<Value, JsonRpcError> {
        let call = handler.call(ctx, params);
        match ctx.timeout() {
            Some(duration) => tokio::select! {
                outcome = tokio::time::timeout(duration, call) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(devpod_mcp_core::Error::timeout(method, duration).into()),
                },
                () = ctx.cancelled() => Err(JsonRpcError::internal(format!(
                    "request '{method}' cancelled by server shutdown"
                ))),
            },
            None => tokio::select! {
                result = call => result,
                () = ctx.cancelled() => Err(JsonRpcError::internal(format!(
                    "request '{method}' cancelled by server shutdown"
                ))),
            },
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {},
                "prompts": {},
                "resources": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }
}
