use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::http::{router, AppState};
use crate::pumps::{ping_pump, read_pump, write_pump, WsStream};
use crate::{pid_file_path, AgentConfig, AgentError};

/// Dial attempts against the upstream WebSocket before giving up.
const CONNECT_ATTEMPTS: u32 = 5;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A running bridge agent.
///
/// Lives until [`stop`](Self::stop) is called, `POST /shutdown` arrives,
/// or the upstream WebSocket dies.
#[derive(Debug)]
pub struct Agent {
    cancel: CancellationToken,
    local_addr: SocketAddr,
    ws_tx: mpsc::Sender<Message>,
}

impl Agent {
    /// Connects upstream, binds the loopback HTTP endpoint and spawns the
    /// pumps. Returns once everything is running.
    pub async fn start(config: AgentConfig) -> Result<Self, AgentError> {
        if config.ws_endpoint.trim().is_empty() {
            return Err(AgentError::MissingEndpoint);
        }

        let ws = dial_upstream(&config).await?;
        info!(endpoint = %config.ws_endpoint, "connected to upstream WebSocket");
        let (sink, source) = ws.split();

        let cancel = CancellationToken::new();
        let (ws_tx, ws_rx) = mpsc::channel::<Message>(256);

        tokio::spawn(write_pump(sink, ws_rx, cancel.clone()));
        tokio::spawn(ping_pump(ws_tx.clone(), cancel.clone()));
        tokio::spawn(read_pump(source, cancel.clone()));

        let listener = tokio::net::TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "agent listening");

        if let Err(e) = write_pid_file() {
            warn!(error = %e, "failed to write agent pid file");
        }

        let state = AppState {
            ws_tx: ws_tx.clone(),
            cancel: cancel.clone(),
        };
        let shutdown = cancel.clone().cancelled_owned();
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router(state))
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "agent http server error");
            }
        });

        Ok(Self {
            cancel,
            local_addr,
            ws_tx,
        })
    }

    /// The bound loopback address (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Blocks until the agent terminates, for whatever reason.
    pub async fn wait(&self) {
        self.cancel.cancelled().await;
        // Give the pumps a moment to flush the close frame.
        tokio::time::sleep(Duration::from_millis(50)).await;
        remove_pid_file();
    }

    /// Gracefully stops the agent.
    pub async fn stop(&self) {
        let _ = self.ws_tx.send(Message::Close(None)).await;
        self.cancel.cancel();
        remove_pid_file();
    }
}

async fn dial_upstream(config: &AgentConfig) -> Result<WsStream, AgentError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match connect_async(build_request(config)?).await {
            Ok((ws, _)) => return Ok(ws),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, error = %e, "upstream connect failed, retrying");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => return Err(AgentError::Connect(e)),
        }
    }
}

/// The handshake request is not reusable, so it is rebuilt per attempt.
fn build_request(
    config: &AgentConfig,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, AgentError> {
    let mut request = config
        .ws_endpoint
        .as_str()
        .into_client_request()
        .map_err(AgentError::Request)?;
    if !config.api_key.is_empty() {
        let value =
            HeaderValue::from_str(&config.api_key).map_err(|_| AgentError::InvalidApiKey)?;
        request.headers_mut().insert("X-API-Key", value);
    }
    Ok(request)
}

fn write_pid_file() -> std::io::Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, std::process::id().to_string())
}

fn remove_pid_file() {
    let _ = std::fs::remove_file(pid_file_path());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::is_running_at;
    use std::sync::{Arc, Mutex};

    type Frames = Arc<Mutex<Vec<Message>>>;

    /// Minimal upstream WebSocket server recording every frame.
    async fn start_upstream() -> (String, Frames) {
        let frames: Frames = Arc::new(Mutex::new(Vec::new()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let recorded = Arc::clone(&frames);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                    while let Some(Ok(msg)) = ws.next().await {
                        recorded.lock().unwrap().push(msg);
                    }
                });
            }
        });
        (format!("ws://{addr}"), frames)
    }

    fn test_config(ws_endpoint: String) -> AgentConfig {
        AgentConfig {
            addr: "127.0.0.1:0".into(),
            ws_endpoint,
            api_key: String::new(),
        }
    }

    #[tokio::test]
    async fn start_requires_endpoint() {
        let err = Agent::start(AgentConfig::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingEndpoint));
    }

    #[tokio::test]
    async fn healthz_answers_after_start() {
        let (endpoint, _frames) = start_upstream().await;
        let agent = Agent::start(test_config(endpoint)).await.unwrap();

        let addr = agent.local_addr().to_string();
        assert!(is_running_at(&addr).await);

        agent.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!is_running_at(&addr).await);
    }

    #[tokio::test]
    async fn event_forwarded_verbatim() {
        let (endpoint, frames) = start_upstream().await;
        let agent = Agent::start(test_config(endpoint)).await.unwrap();
        let addr = agent.local_addr();

        let body = serde_json::json!({
            "type": "part_done",
            "runId": "r1",
            "ts": "2025-01-01T00:00:00Z",
            "payload": {"part": 1, "size": 10, "etag": "\"e\""}
        })
        .to_string();

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/event"))
            .header("content-type", "application/json")
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 204);

        tokio::time::sleep(Duration::from_millis(100)).await;
        let texts: Vec<String> = frames
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec![body]);

        agent.stop().await;
    }

    #[tokio::test]
    async fn oversized_event_rejected() {
        let (endpoint, frames) = start_upstream().await;
        let agent = Agent::start(test_config(endpoint)).await.unwrap();
        let addr = agent.local_addr();

        let body = vec![b'x'; favus_protocol::MAX_EVENT_BODY + 1];
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/event"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 413);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(frames.lock().unwrap().is_empty());

        agent.stop().await;
    }

    #[tokio::test]
    async fn shutdown_endpoint_stops_agent() {
        let (endpoint, _frames) = start_upstream().await;
        let agent = Agent::start(test_config(endpoint)).await.unwrap();
        let addr = agent.local_addr();

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/shutdown"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 202);

        tokio::time::timeout(Duration::from_secs(2), agent.wait())
            .await
            .expect("agent should stop after /shutdown");
    }

    #[tokio::test]
    async fn agent_dies_with_upstream() {
        // An upstream that accepts one connection, then drops it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream = format!("ws://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(ws);
        });

        let agent = Agent::start(test_config(upstream)).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), agent.wait())
            .await
            .expect("agent should stop when the upstream goes away");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_after_retries() {
        // Bind-then-drop to find a dead port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = Agent::start(test_config(endpoint)).await.unwrap_err();
        assert!(matches!(err, AgentError::Connect(_)));
    }
}
