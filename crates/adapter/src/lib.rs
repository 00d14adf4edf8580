//! DevPod provisioning adapter
//!
//! Translates each logical workspace/provider operation into an
//! invocation of the external `devpod` command-line tool and maps its
//! output back into JSON-RPC result payloads.
//!
//! The adapter validates parameters before any process is spawned,
//! builds argument lists deterministically, and normalizes tool output
//! through a two-stage strategy: strict JSON decode first, then a
//! tolerant tabular-text fallback.

mod executor;
pub use executor::{CommandExecutor, CommandOutput, DevPodExecutor, RecordingExecutor};

mod args;
mod output;
pub use output::{DevPodProvider, DevPodWorkspace, TableLayout};

mod handlers;
pub use handlers::register_operations;

use devpod_mcp_core::{Error, Result};
use devpod_mcp_protocol::RequestContext;
use std::sync::Arc;

/// Adapter configuration, read once at startup
#[derive(Debug, Clone, Default)]
pub struct AdapterConfig {
    /// Path to the external tool binary; defaults to `devpod` on PATH
    pub program: Option<String>,
    /// Value for `DEVPOD_HOME` in the child environment
    pub home: Option<String>,
    /// Value for `DEVPOD_PROVIDER` in the child environment
    pub default_provider: Option<String>,
    /// Tabular-output column order; version-dependent in the tool
    pub layout: TableLayout,
}

/// The provisioning adapter shared by all registered operations
pub struct DevPodAdapter {
    executor: Arc<dyn CommandExecutor>,
    layout: TableLayout,
}

impl DevPodAdapter {
    pub fn new(config: AdapterConfig) -> Self {
        let layout = config.layout.clone();
        Self {
            executor: Arc::new(DevPodExecutor::new(config)),
            layout,
        }
    }

    /// Build an adapter over a custom executor (tests)
    pub fn with_executor(executor: Arc<dyn CommandExecutor>, layout: TableLayout) -> Self {
        Self { executor, layout }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Run the tool and return stdout, mapping a non-zero exit into an
    /// error that embeds both captured streams
    pub(crate) async fn run_checked(
        &self,
        args: Vec<String>,
        ctx: &RequestContext,
    ) -> Result<String> {
        let output = self.executor.run(&args, ctx).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(Error::command_execution(
                devpod_mcp_core::DEVPOD_COMMAND,
                args,
                format!("stdout: {}, stderr: {}", output.stdout, output.stderr),
                output.exit_code,
            ))
        }
    }

    /// Probe whether the external tool is present and runnable
    ///
    /// Used at startup for a warning only; operations still register so
    /// callers get proper execution errors instead of missing methods.
    pub async fn check_available(&self) -> Result<()> {
        let output = self
            .executor
            .run(&["version".to_string()], &RequestContext::detached())
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "devpod binary not available: {}",
                output.stderr.trim()
            )))
        }
    }
}
