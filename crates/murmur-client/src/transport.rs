//! WebSocket transport for channel connections.
//!
//! Each open transport is a tokio task bridging one WebSocket to mpsc
//! channels of text frames. This is a thin layer: heartbeats, reconnects and
//! routing stay in the Sans-IO [`crate::SyncEngine`].
//!
//! Every event a task reports carries the sequence number it was opened with,
//! so the runtime can ignore events from a transport it already replaced.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use murmur_proto::ChannelAddress;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// How long a WebSocket handshake may take before it counts as a failure.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outgoing frames buffered per transport.
const OUTGOING_CAPACITY: usize = 64;

/// What happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// Handshake completed
    Opened,
    /// Text frame received
    Frame(String),
    /// Connection failed, errored or was closed by the server
    Closed,
}

/// Event reported by a transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    /// Channel the transport serves
    pub address: ChannelAddress,
    /// Sequence number the transport was opened with
    pub seq: u64,
    /// What happened
    pub kind: TransportEventKind,
}

/// Handle to a running transport task.
#[derive(Debug)]
pub struct TransportHandle {
    seq: u64,
    outgoing: mpsc::Sender<String>,
}

impl TransportHandle {
    /// Sequence number this transport was opened with.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Queue a text frame.
    ///
    /// Frames queued before the handshake completes are sent right after it.
    /// A full or closed queue drops the frame; the task reports `Closed` on
    /// its own.
    pub fn send(&self, text: String) {
        if let Err(err) = self.outgoing.try_send(text) {
            tracing::debug!(seq = self.seq, %err, "dropping outgoing frame");
        }
    }

    /// Close gracefully: the task sends a close frame, exits, and reports
    /// `Closed` under this handle's sequence number.
    pub fn close(self) {
        tracing::trace!(seq = self.seq, "closing transport");
    }
}

/// Open a WebSocket to `url` for `address`.
///
/// Spawns the connection task and returns immediately. Events are reported on
/// `events`, ending with exactly one `Closed`.
pub fn open(
    address: ChannelAddress,
    url: String,
    seq: u64,
    events: mpsc::Sender<TransportEvent>,
) -> TransportHandle {
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(OUTGOING_CAPACITY);

    tokio::spawn(async move {
        run_connection(address, &url, seq, outgoing_rx, &events).await;
        let _ = events.send(TransportEvent { address, seq, kind: TransportEventKind::Closed }).await;
    });

    TransportHandle { seq, outgoing: outgoing_tx }
}

/// Run the connection, bridging between channels and the WebSocket.
async fn run_connection(
    address: ChannelAddress,
    url: &str,
    seq: u64,
    mut outgoing: mpsc::Receiver<String>,
    events: &mpsc::Sender<TransportEvent>,
) {
    let ws = match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url)).await {
        Ok(Ok((ws, _response))) => ws,
        Ok(Err(err)) => {
            tracing::warn!(%address, %err, "websocket connect failed");
            return;
        },
        Err(_elapsed) => {
            tracing::warn!(%address, timeout = ?CONNECT_TIMEOUT, "websocket connect timed out");
            return;
        },
    };

    if events.send(TransportEvent { address, seq, kind: TransportEventKind::Opened }).await.is_err() {
        return;
    }

    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                let Some(text) = frame else {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                };
                if let Err(err) = sink.send(WsMessage::Text(text.into())).await {
                    tracing::debug!(%address, %err, "websocket write failed");
                    break;
                }
            },
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        let kind = TransportEventKind::Frame(text.as_str().to_owned());
                        if events.send(TransportEvent { address, seq, kind }).await.is_err() {
                            break;
                        }
                    },
                    Some(Ok(WsMessage::Close(_))) | None => {
                        tracing::debug!(%address, "websocket closed by server");
                        break;
                    },
                    Some(Ok(_)) => {},
                    Some(Err(err)) => {
                        tracing::debug!(%address, %err, "websocket read failed");
                        break;
                    },
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_reports_closed() {
        let (events_tx, mut events_rx) = mpsc::channel(8);

        // Port 9 (discard) on localhost is closed on test machines
        let handle = open(ChannelAddress::Global, "ws://127.0.0.1:9/ws/global".to_string(), 3, events_tx);
        assert_eq!(handle.seq(), 3);

        let event = events_rx.recv().await.unwrap();
        assert_eq!(event, TransportEvent {
            address: ChannelAddress::Global,
            seq: 3,
            kind: TransportEventKind::Closed,
        });
    }
}
