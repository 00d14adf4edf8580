use devpod_mcp_protocol::{Dispatcher, FnHandler, OperationRegistry};
use serde_json::{json, Value};
use std::sync::Arc;

/// Dispatcher with a single `echo` operation that reflects its params
pub fn echo_dispatcher() -> Arc<Dispatcher> {
    let mut registry = OperationRegistry::new();
    registry.register(
        "echo",
        "Reflect request params back in the result",
        json!({"type": "object", "properties": {}}),
        Arc::new(FnHandler(|params: Value| async move {
            Ok(json!({ "echo": params }))
        })),
    );
    Arc::new(Dispatcher::new(Arc::new(registry)))
}

/// Minimal SSE frame reader over a streaming HTTP response
///
/// Accumulates chunks until a blank line terminates a frame, then yields
/// the frame's event name and data. Keep-alive comment frames are
/// skipped.
#[allow(dead_code)]
pub struct SseReader {
    response: reqwest::Response,
    buffer: String,
}

#[allow(dead_code)]
impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    pub async fn next_event(&mut self) -> Option<(String, String)> {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                let frame = self.buffer[..pos].to_string();
                self.buffer.drain(..pos + 2);

                let mut event = String::from("message");
                let mut data: Vec<String> = Vec::new();
                for line in frame.lines() {
                    if line.starts_with(':') {
                        continue;
                    }
                    if let Some(rest) = line.strip_prefix("event:") {
                        event = rest.trim().to_string();
                    } else if let Some(rest) = line.strip_prefix("data:") {
                        data.push(rest.trim_start().to_string());
                    }
                }
                if data.is_empty() {
                    // Keep-alive or empty frame.
                    continue;
                }
                return Some((event, data.join("\n")));
            }

            let chunk = self.response.chunk().await.ok()??;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}
