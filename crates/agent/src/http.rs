//! Loopback HTTP surface of the agent.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use favus_protocol::MAX_EVENT_BODY;

#[derive(Clone)]
pub(crate) struct AppState {
    pub ws_tx: mpsc::Sender<Message>,
    pub cancel: CancellationToken,
}

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/event", post(event))
        .route("/shutdown", post(shutdown))
        .layer(DefaultBodyLimit::max(MAX_EVENT_BODY))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "OK"
}

/// Forwards the posted JSON verbatim as one upstream text frame.
async fn event(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let text = match String::from_utf8(body.to_vec()) {
        Ok(t) => t,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    if state.ws_tx.send(Message::Text(text.into())).await.is_err() {
        // The write pump is gone, so the upstream is too.
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::NO_CONTENT
}

/// Acknowledges, then stops the agent shortly after the response is out.
async fn shutdown(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });
    (StatusCode::ACCEPTED, "stopping")
}
