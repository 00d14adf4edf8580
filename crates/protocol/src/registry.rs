//! Operation registry
//!
//! Maps method names to handlers. The registry is populated once at
//! startup, before any transport accepts input, then shared read-only
//! behind an `Arc` for the rest of the process lifetime, so steady-state
//! dispatch needs no locking.

use crate::dispatch::RequestContext;
use crate::envelope::JsonRpcError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A named unit of server-side logic invoked by method name
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError>;
}

/// Handler for notifications; errors are logged, never sent anywhere
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn notify(&self, params: Value) -> devpod_mcp_core::Result<()>;
}

/// Introspection entry describing one registered operation
///
/// Serialized as an MCP tool descriptor: name, human description, and
/// JSON-schema input shape.
#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

struct Operation {
    descriptor: Option<OperationDescriptor>,
    handler: Arc<dyn OperationHandler>,
}

/// Registry of operations and notification handlers
///
/// Registering the same name twice is last-write-wins; it is logged and,
/// in debug builds, asserted against, since duplicate registration is a
/// startup-time configuration error.
#[derive(Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Operation>,
    notifications: HashMap<String, Arc<dyn NotificationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation that appears in introspection output
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn OperationHandler>,
    ) {
        let name = name.into();
        let descriptor = OperationDescriptor {
            name: name.clone(),
            description: description.into(),
            input_schema,
        };
        self.insert(
            name,
            Operation {
                descriptor: Some(descriptor),
                handler,
            },
        );
    }

    /// Register a protocol-level method hidden from introspection
    pub fn register_method(&mut self, name: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.insert(
            name.into(),
            Operation {
                descriptor: None,
                handler,
            },
        );
    }

    fn insert(&mut self, name: String, operation: Operation) {
        let replaced = self.operations.insert(name.clone(), operation);
        if replaced.is_some() {
            tracing::warn!(method = %name, "operation registered twice, last write wins");
            debug_assert!(false, "duplicate operation registration: {name}");
        }
    }

    /// Register a notification handler
    pub fn register_notification(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        self.notifications.insert(name.into(), handler);
    }

    /// Resolve an operation handler by method name
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.operations.get(name).map(|op| Arc::clone(&op.handler))
    }

    /// Resolve a notification handler by method name
    pub fn resolve_notification(&self, name: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications.get(name).map(Arc::clone)
    }

    /// Assemble the introspection list from current contents
    ///
    /// Only operations registered with a descriptor appear; protocol
    /// methods (including the introspection method itself) are hidden.
    /// Sorted by name so repeated calls yield identical lists.
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        let mut tools: Vec<OperationDescriptor> = self
            .operations
            .values()
            .filter_map(|op| op.descriptor.clone())
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Number of registered operations (introspectable and hidden)
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Adapter turning an async closure into an [`OperationHandler`]
///
/// Keeps small protocol methods (empty capability lists, echo-style
/// helpers) from each needing a named struct.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Value, JsonRpcError>> + Send,
{
    async fn call(&self, _ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        (self.0)(params).await
    }
}
