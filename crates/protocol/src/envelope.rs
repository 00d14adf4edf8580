//! JSON-RPC 2.0 envelope types
//!
//! See: https://www.jsonrpc.org/specification

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version tag carried by every envelope
pub const JSONRPC_VERSION: &str = "2.0";

/// Fixed error-code namespace
///
/// The `-32000..-32099` range is reserved for implementation-defined
/// server errors; `REQUEST_TIMEOUT` lives there.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const REQUEST_TIMEOUT: i32 = -32001;
}

/// JSON-RPC 2.0 request
///
/// The presence of `id` distinguishes a request (expects a response)
/// from a notification (fire-and-forget). An explicit `"id": null` is
/// normalized to absent during decode, matching how most peers treat it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response
///
/// Exactly one of `result` / `error` is populated; the constructors are
/// the only way to build one, and [`JsonRpcResponse::decode`] rejects
/// envelopes that violate the invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Decode failure classification for incoming request envelopes
#[derive(Debug)]
pub enum DecodeError {
    /// The bytes were not well-formed JSON
    Parse(String),
    /// Well-formed JSON, but not a valid request envelope (e.g. missing
    /// or empty `method`)
    InvalidRequest(String),
}

impl JsonRpcRequest {
    /// Create a new request
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Create a new notification
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Decode a raw message, classifying failures as parse errors or
    /// invalid-request errors
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::Parse(e.to_string()))?;

        let obj = value
            .as_object()
            .ok_or_else(|| DecodeError::InvalidRequest("request must be an object".to_string()))?;

        let method = match obj.get("method").and_then(Value::as_str) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => {
                return Err(DecodeError::InvalidRequest(
                    "missing or empty 'method'".to_string(),
                ))
            }
        };

        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(other) => Some(other.clone()),
        };

        Ok(Self {
            jsonrpc: obj
                .get("jsonrpc")
                .and_then(Value::as_str)
                .unwrap_or(JSONRPC_VERSION)
                .to_string(),
            id,
            method,
            params: obj.get("params").cloned(),
        })
    }

    /// Whether this envelope is a notification (no id, no response on the wire)
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Decode a response envelope, enforcing the result-xor-error invariant
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let response: Self =
            serde_json::from_str(raw).map_err(|e| DecodeError::Parse(e.to_string()))?;
        match (&response.result, &response.error) {
            (Some(_), Some(_)) => Err(DecodeError::InvalidRequest(
                "response carries both result and error".to_string(),
            )),
            (None, None) => Err(DecodeError::InvalidRequest(
                "response carries neither result nor error".to_string(),
            )),
            _ => Ok(response),
        }
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> String {
        // A response built through the constructors always serializes.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"failed to encode response: {e}"}}}}"#,
                error_codes::INTERNAL_ERROR
            )
        })
    }
}

impl JsonRpcError {
    /// Create a new error object
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Parse error (`-32700`)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(error_codes::PARSE_ERROR, message)
    }

    /// Invalid request (`-32600`)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_REQUEST, message)
    }

    /// Method not found (`-32601`)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// Invalid params (`-32602`)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_codes::INVALID_PARAMS, message)
    }

    /// Internal error (`-32603`)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(error_codes::INTERNAL_ERROR, message)
    }

    /// Request timeout (`-32001`, implementation-reserved range)
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(error_codes::REQUEST_TIMEOUT, message)
    }
}

impl From<devpod_mcp_core::Error> for JsonRpcError {
    fn from(error: devpod_mcp_core::Error) -> Self {
        use devpod_mcp_core::Error as CoreError;
        match &error {
            CoreError::Timeout { .. } => JsonRpcError::timeout(error.to_string()),
            _ => JsonRpcError::internal(error.to_string()),
        }
    }
}
