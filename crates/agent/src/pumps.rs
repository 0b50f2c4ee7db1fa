//! WebSocket pumps for the upstream connection.

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use favus_protocol::{WS_PING_PERIOD, WS_PONG_WAIT};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Serializes all outgoing frames. Sends a close frame on cancellation;
/// a write failure kills the whole agent.
pub(crate) async fn write_pump(
    mut sink: WsSink,
    mut rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        if let Err(e) = sink.send(msg).await {
                            tracing::warn!(error = %e, "upstream write failed");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Periodic keepalive pings.
pub(crate) async fn ping_pump(tx: mpsc::Sender<Message>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(WS_PING_PERIOD);
    interval.tick().await; // Skip the immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let ping = Message::Ping(Bytes::from_static(b"ping"));
                if tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Drains incoming frames under a read deadline. Anything arriving (pong
/// or server message) resets the deadline; silence, an error or a close
/// means the upstream is gone and the agent shuts down.
pub(crate) async fn read_pump(mut source: WsSource, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(WS_PONG_WAIT, source.next()) => next,
        };
        match next {
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "upstream read failed");
                cancel.cancel();
                break;
            }
            Ok(None) => {
                tracing::info!("upstream closed the connection");
                cancel.cancel();
                break;
            }
            Err(_) => {
                tracing::warn!(deadline = ?WS_PONG_WAIT, "upstream read deadline exceeded");
                cancel.cancel();
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ping_pump_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            ping_pump(tx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }

    #[tokio::test]
    async fn ping_pump_stops_when_writer_gone() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let cancel = CancellationToken::new();

        // With the receiver gone the first tick's send fails and the pump
        // exits on its own; give it a shortened wait via cancel fallback.
        let handle = tokio::spawn(ping_pump(tx, cancel.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
