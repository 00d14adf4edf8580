//! Operation handlers and registration
//!
//! One handler per logical operation. Each decodes its typed parameter
//! struct, validates required fields before any process is spawned, and
//! maps tool output into the operation's result payload.

use crate::{args, output, DevPodAdapter};
use async_trait::async_trait;
use devpod_mcp_protocol::{
    JsonRpcError, OperationHandler, OperationRegistry, RequestContext,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

fn decode_params<T: DeserializeOwned>(params: Value, operation: &str) -> Result<T, JsonRpcError> {
    serde_json::from_value(params)
        .map_err(|_| JsonRpcError::invalid_params(format!("Invalid {operation} parameters")))
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceParams {
    name: String,
    source: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    ide: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartWorkspaceParams {
    name: String,
    #[serde(default)]
    ide: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedWorkspaceParams {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeleteWorkspaceParams {
    name: String,
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct SshParams {
    name: String,
    #[serde(default)]
    command: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddProviderParams {
    name: String,
    #[serde(default)]
    options: BTreeMap<String, String>,
}

struct ListWorkspaces(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for ListWorkspaces {
    async fn call(&self, ctx: &RequestContext, _params: Value) -> Result<Value, JsonRpcError> {
        let stdout = self.0.run_checked(args::list_workspaces(), ctx).await?;
        let workspaces = output::parse_workspace_list(&stdout, self.0.layout());
        Ok(json!({ "workspaces": workspaces }))
    }
}

struct CreateWorkspace(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for CreateWorkspace {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: CreateWorkspaceParams = decode_params(params, "create workspace")?;
        if params.name.is_empty() || params.source.is_empty() {
            return Err(JsonRpcError::invalid_params("Name and source are required"));
        }

        let stdout = self
            .0
            .run_checked(
                args::create_workspace(
                    &params.name,
                    &params.source,
                    params.provider.as_deref(),
                    params.ide.as_deref(),
                ),
                ctx,
            )
            .await?;
        Ok(json!({
            "name": params.name,
            "message": "Workspace created successfully",
            "output": stdout,
        }))
    }
}

struct StartWorkspace(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for StartWorkspace {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: StartWorkspaceParams = decode_params(params, "start workspace")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Workspace name is required"));
        }

        let stdout = self
            .0
            .run_checked(
                args::start_workspace(&params.name, params.ide.as_deref()),
                ctx,
            )
            .await?;
        Ok(json!({
            "name": params.name,
            "message": "Workspace started successfully",
            "output": stdout,
        }))
    }
}

struct StopWorkspace(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for StopWorkspace {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: NamedWorkspaceParams = decode_params(params, "stop workspace")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Workspace name is required"));
        }

        let stdout = self
            .0
            .run_checked(args::stop_workspace(&params.name), ctx)
            .await?;
        Ok(json!({
            "name": params.name,
            "message": "Workspace stopped successfully",
            "output": stdout,
        }))
    }
}

struct DeleteWorkspace(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for DeleteWorkspace {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: DeleteWorkspaceParams = decode_params(params, "delete workspace")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Workspace name is required"));
        }

        let stdout = self
            .0
            .run_checked(args::delete_workspace(&params.name, params.force), ctx)
            .await?;
        Ok(json!({
            "name": params.name,
            "message": "Workspace deleted successfully",
            "output": stdout,
        }))
    }
}

struct WorkspaceStatus(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for WorkspaceStatus {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: NamedWorkspaceParams = decode_params(params, "status")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Workspace name is required"));
        }

        let stdout = self
            .0
            .run_checked(args::workspace_status(&params.name), ctx)
            .await?;
        Ok(output::parse_status(&params.name, &stdout))
    }
}

struct SshWorkspace(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for SshWorkspace {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: SshParams = decode_params(params, "SSH")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Workspace name is required"));
        }

        let stdout = self
            .0
            .run_checked(args::ssh(&params.name, params.command.as_deref()), ctx)
            .await?;
        Ok(json!({
            "name": params.name,
            "output": stdout,
            "message": "SSH command executed successfully",
        }))
    }
}

struct ListProviders(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for ListProviders {
    async fn call(&self, ctx: &RequestContext, _params: Value) -> Result<Value, JsonRpcError> {
        let stdout = self.0.run_checked(args::list_providers(), ctx).await?;
        let providers = output::parse_provider_list(&stdout, self.0.layout());
        Ok(json!({ "providers": providers }))
    }
}

struct AddProvider(Arc<DevPodAdapter>);

#[async_trait]
impl OperationHandler for AddProvider {
    async fn call(&self, ctx: &RequestContext, params: Value) -> Result<Value, JsonRpcError> {
        let params: AddProviderParams = decode_params(params, "add provider")?;
        if params.name.is_empty() {
            return Err(JsonRpcError::invalid_params("Provider name is required"));
        }

        let stdout = self
            .0
            .run_checked(args::add_provider(&params.name, &params.options), ctx)
            .await?;
        Ok(json!({
            "name": params.name,
            "message": "Provider added successfully",
            "output": stdout,
        }))
    }
}

fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn named_workspace_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "The name of the workspace" }
        },
        "required": ["name"]
    })
}

/// Register every DevPod operation into the registry
///
/// Called exactly once at startup, before any transport starts.
pub fn register_operations(registry: &mut OperationRegistry, adapter: Arc<DevPodAdapter>) {
    registry.register(
        "devpod_listWorkspaces",
        "List all DevPod workspaces",
        empty_object_schema(),
        Arc::new(ListWorkspaces(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_status",
        "Get the status of a specific DevPod workspace",
        named_workspace_schema(),
        Arc::new(WorkspaceStatus(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_createWorkspace",
        "Create a new DevPod workspace",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the workspace" },
                "source": { "type": "string", "description": "The source repository or path" },
                "provider": { "type": "string", "description": "The provider to use (optional)" },
                "ide": { "type": "string", "description": "The IDE to use (optional)" }
            },
            "required": ["name", "source"]
        }),
        Arc::new(CreateWorkspace(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_startWorkspace",
        "Start a DevPod workspace",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the workspace" },
                "ide": { "type": "string", "description": "The IDE to use (optional)" }
            },
            "required": ["name"]
        }),
        Arc::new(StartWorkspace(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_stopWorkspace",
        "Stop a DevPod workspace",
        named_workspace_schema(),
        Arc::new(StopWorkspace(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_deleteWorkspace",
        "Delete a DevPod workspace",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the workspace" },
                "force": { "type": "boolean", "description": "Force deletion without confirmation" }
            },
            "required": ["name"]
        }),
        Arc::new(DeleteWorkspace(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_ssh",
        "SSH into a DevPod workspace",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the workspace" },
                "command": { "type": "string", "description": "Command to execute (optional)" }
            },
            "required": ["name"]
        }),
        Arc::new(SshWorkspace(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_listProviders",
        "List all DevPod providers",
        empty_object_schema(),
        Arc::new(ListProviders(Arc::clone(&adapter))),
    );
    registry.register(
        "devpod_addProvider",
        "Add a new DevPod provider",
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the provider" },
                "options": { "type": "object", "description": "Provider-specific options" }
            },
            "required": ["name"]
        }),
        Arc::new(AddProvider(adapter)),
    );
}
