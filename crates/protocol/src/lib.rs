//! JSON-RPC protocol layer for the DevPod MCP server
//!
//! This crate contains the transport-agnostic half of the server:
//!
//! - The JSON-RPC 2.0 envelope model (requests, responses, notifications,
//!   and the fixed error-code namespace).
//! - The operation registry mapping method names to handlers, including
//!   the introspection list assembled from the registry itself.
//! - The dispatcher that decodes an envelope, classifies request vs.
//!   notification, resolves and invokes the handler, and encodes the
//!   result or error.
//!
//! Every transport binding delivers raw message bytes to the same
//! [`Dispatcher`]; none of them reimplements any of this logic.

mod envelope;
pub use envelope::{
    error_codes, DecodeError, JsonRpcError, JsonRpcRequest, JsonRpcResponse, JSONRPC_VERSION,
};

mod registry;
pub use registry::{
    FnHandler, NotificationHandler, OperationDescriptor, OperationHandler, OperationRegistry,
};

mod dispatch;
pub use dispatch::{Dispatcher, RequestContext};
