use clap::ValueEnum;
use devpod_mcp_adapter::AdapterConfig;
use devpod_mcp_core::{
    Error, Result, DEFAULT_LISTEN_PORT, DEFAULT_SESSION_IDLE_SECS, DEVPOD_BIN_VAR,
    DEVPOD_HOME_VAR, DEVPOD_PROVIDER_VAR, MCP_ADDR_VAR, MCP_TIMEOUT_VAR, MCP_TRANSPORT_VAR,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Stdio,
    Sse,
    #[value(name = "http-streams")]
    HttpStreams,
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            "http-streams" => Ok(Self::HttpStreams),
            other => Err(Error::configuration(format!(
                "Unsupported transport: {other}. Use 'stdio', 'sse', or 'http-streams'"
            ))),
        }
    }
}

/// Fully resolved runtime configuration
///
/// Flags take precedence over environment variables, which take
/// precedence over built-in defaults.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub transport: TransportKind,
    pub addr: SocketAddr,
    pub request_timeout: Option<Duration>,
    pub session_idle: Duration,
    pub adapter: AdapterConfig,
}

impl ServerConfig {
    pub fn resolve(
        transport: Option<TransportKind>,
        addr: Option<SocketAddr>,
        request_timeout: Option<u64>,
        devpod_bin: Option<String>,
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let transport = match transport {
            Some(kind) => kind,
            None => match env.get(MCP_TRANSPORT_VAR) {
                Some(value) => value.parse()?,
                None => TransportKind::Stdio,
            },
        };

        let addr = match addr {
            Some(addr) => addr,
            None => match env.get(MCP_ADDR_VAR) {
                Some(value) => value.parse().map_err(|_| {
                    Error::configuration(format!("invalid listen address: {value}"))
                })?,
                None => SocketAddr::from(([127, 0, 0, 1], DEFAULT_LISTEN_PORT)),
            },
        };

        let request_timeout = match request_timeout {
            Some(secs) => Some(secs),
            None => match env.get(MCP_TIMEOUT_VAR) {
                Some(value) => Some(value.parse().map_err(|_| {
                    Error::configuration(format!("invalid timeout seconds: {value}"))
                })?),
                None => None,
            },
        }
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

        let adapter = AdapterConfig {
            program: devpod_bin.or_else(|| env.get(DEVPOD_BIN_VAR).cloned()),
            home: env.get(DEVPOD_HOME_VAR).cloned(),
            default_provider: env.get(DEVPOD_PROVIDER_VAR).cloned(),
            layout: Default::default(),
        };

        Ok(Self {
            transport,
            addr,
            request_timeout,
            session_idle: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
            adapter,
        })
    }
}
