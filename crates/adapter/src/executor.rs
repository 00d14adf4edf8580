//! External command execution
//!
//! The [`CommandExecutor`] trait abstracts the child-process boundary so
//! tests exercise the adapter without spawning anything, and the
//! production implementation stays the one place that knows about
//! processes, environments, and cancellation.

use crate::AdapterConfig;
use async_trait::async_trait;
use devpod_mcp_core::{Error, Result, DEVPOD_COMMAND, DEVPOD_HOME_VAR, DEVPOD_PROVIDER_VAR};
use devpod_mcp_protocol::RequestContext;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;

/// Captured output of one external-tool invocation
///
/// Stdout and stderr are captured separately; a missing exit code means
/// the process was terminated by a signal.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convenience constructor for test fixtures
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for failing test fixtures
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Trait for executing the external provisioning tool
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the tool with the given arguments, honoring the request
    /// context's cancellation signal
    async fn run(&self, args: &[String], ctx: &RequestContext) -> Result<CommandOutput>;
}

/// Production executor spawning the `devpod` binary
pub struct DevPodExecutor {
    program: String,
    home: Option<String>,
    default_provider: Option<String>,
}

impl DevPodExecutor {
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            program: config
                .program
                .unwrap_or_else(|| DEVPOD_COMMAND.to_string()),
            home: config.home,
            default_provider: config.default_provider,
        }
    }
}

#[async_trait]
impl CommandExecutor for DevPodExecutor {
    async fn run(&self, args: &[String], ctx: &RequestContext) -> Result<CommandOutput> {
        debug!(program = %self.program, args = ?args, "executing devpod command");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Cancellation works by dropping the wait future below.
            .kill_on_drop(true);
        if let Some(home) = &self.home {
            cmd.env(DEVPOD_HOME_VAR, home);
        }
        if let Some(provider) = &self.default_provider {
            cmd.env(DEVPOD_PROVIDER_VAR, provider);
        }

        let child = cmd.spawn().map_err(|e| {
            Error::command_execution(
                self.program.clone(),
                args.to_vec(),
                format!("failed to spawn: {e}"),
                None,
            )
        })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output.map_err(|e| {
                Error::command_execution(
                    self.program.clone(),
                    args.to_vec(),
                    format!("failed to collect output: {e}"),
                    None,
                )
            })?,
            () = ctx.cancelled() => {
                return Err(Error::cancelled(format!("{} {}", self.program, args.join(" "))));
            }
        };

        let result = CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            exit_code = ?result.exit_code,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "devpod command completed"
        );
        Ok(result)
    }
}

/// Test double recording every invocation and replaying queued outputs
///
/// An empty queue replays a successful empty output, so validation tests
/// can assert on the invocation count alone.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Vec<String>>>,
    queue: Mutex<Vec<CommandOutput>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an output to replay; outputs replay in FIFO order
    pub fn push_output(&self, output: CommandOutput) {
        self.queue.lock().expect("queue lock poisoned").push(output);
    }

    /// Argument lists of every invocation so far
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.calls.lock().expect("calls lock poisoned").len()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn run(&self, args: &[String], _ctx: &RequestContext) -> Result<CommandOutput> {
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(args.to_vec());
        let mut queue = self.queue.lock().expect("queue lock poisoned");
        if queue.is_empty() {
            Ok(CommandOutput::ok(""))
        } else {
            Ok(queue.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::watch;

    fn shell_executor() -> DevPodExecutor {
        DevPodExecutor::new(AdapterConfig {
            program: Some("sh".to_string()),
            ..Default::default()
        })
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_both_streams_and_the_exit_code() {
        let executor = shell_executor();
        let args = vec![
            "-c".to_string(),
            "echo out; echo err >&2; exit 3".to_string(),
        ];
        let output = executor
            .run(&args, &RequestContext::detached())
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_interrupts_a_running_command() {
        let executor = shell_executor();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();
        let ctx = RequestContext::new(shutdown_rx, None);

        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let error = executor.run(&args, &ctx).await.unwrap_err();
        assert!(matches!(error, Error::Cancelled { .. }));
    }

    #[tokio::test]
    async fn recording_executor_replays_outputs_in_order() {
        let executor = RecordingExecutor::new();
        executor.push_output(CommandOutput::ok("first"));
        executor.push_output(CommandOutput::failed(1, "second"));

        let ctx = RequestContext::detached();
        let args = vec!["list".to_string()];
        assert_eq!(executor.run(&args, &ctx).await.unwrap().stdout, "first");
        assert_eq!(executor.run(&args, &ctx).await.unwrap().stderr, "second");
        // Queue exhausted; further calls succeed with empty output.
        assert!(executor.run(&args, &ctx).await.unwrap().success());
        assert_eq!(executor.invocation_count(), 3);
    }
}
