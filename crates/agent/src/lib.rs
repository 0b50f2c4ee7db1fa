//! Local bridge agent: accepts upload events over loopback HTTP and
//! forwards them verbatim to an upstream WebSocket UI.
//!
//! The agent is optional: uploads keep running whether or not one is
//! listening. It exposes three endpoints: `GET /healthz` for
//! liveness probes, `POST /event` to forward a JSON event, and
//! `POST /shutdown` to terminate.

mod agent;
mod http;
mod pumps;

use std::path::PathBuf;

use tokio::net::TcpStream;

use favus_protocol::{DEFAULT_AGENT_ADDR, PROBE_DIAL_TIMEOUT, PROBE_HTTP_TIMEOUT};

pub use agent::Agent;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Loopback HTTP bind address.
    pub addr: String,
    /// Upstream WebSocket endpoint, e.g. `ws://127.0.0.1:8765/ws`.
    pub ws_endpoint: String,
    /// Optional API key, sent as `X-API-Key` on the WebSocket handshake.
    pub api_key: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_AGENT_ADDR.to_string(),
            ws_endpoint: String::new(),
            api_key: String::new(),
        }
    }
}

/// Errors from starting or running the agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("upstream WebSocket endpoint is empty")]
    MissingEndpoint,

    #[error("failed to connect to upstream WebSocket: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("invalid WebSocket request: {0}")]
    Request(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("API key is not a valid header value")]
    InvalidApiKey,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Liveness probe: TCP dial plus `GET /healthz`, both on short timeouts.
pub async fn is_running_at(addr: &str) -> bool {
    let dialed = tokio::time::timeout(PROBE_DIAL_TIMEOUT, TcpStream::connect(addr)).await;
    let Ok(Ok(stream)) = dialed else {
        return false;
    };
    drop(stream);

    let client = reqwest::Client::new();
    match client
        .get(format!("http://{addr}/healthz"))
        .timeout(PROBE_HTTP_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Path of the agent PID file: `~/.favus/agent.pid`.
pub fn pid_file_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".favus").join("agent.pid")
}
