/// Constants shared across the DevPod MCP server crates
// External tool invocation
pub const DEVPOD_COMMAND: &str = "devpod";
pub const DEVPOD_BIN_VAR: &str = "DEVPOD_BIN";

// Environment variables passed through to the child process
pub const DEVPOD_HOME_VAR: &str = "DEVPOD_HOME";
pub const DEVPOD_PROVIDER_VAR: &str = "DEVPOD_PROVIDER";

// Server configuration environment variables, read once at startup
pub const MCP_TRANSPORT_VAR: &str = "DEVPOD_MCP_TRANSPORT";
pub const MCP_ADDR_VAR: &str = "DEVPOD_MCP_ADDR";
pub const MCP_TIMEOUT_VAR: &str = "DEVPOD_MCP_TIMEOUT_SECS";
pub const MCP_LOG_VAR: &str = "DEVPOD_MCP_LOG";

// Defaults
pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 300;

// MCP protocol identification
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "devpod-mcp";
