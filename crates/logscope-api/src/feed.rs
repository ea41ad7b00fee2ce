//! Push-subscription feed over a websocket.

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::client::ApiError;

/// Receiving side of an open push subscription.
///
/// The server streams text frames of newline-delimited encoded records; each
/// non-empty line arrives here individually.
pub struct FeedConnection {
    lines: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl FeedConnection {
    /// In-process pair: a connection plus the handle that feeds it.
    ///
    /// The websocket transport uses this internally; tests drive it directly.
    pub fn channel() -> (FeedHandle, FeedConnection) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        (
            FeedHandle {
                lines: tx,
                cancel: cancel.clone(),
            },
            FeedConnection { lines: rx, cancel },
        )
    }

    /// Next decoded-side line, or `None` once the channel is closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Token shared with the transport task; cancelling it tears the
    /// connection down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

/// Sending side of an in-process feed.
pub struct FeedHandle {
    pub lines: mpsc::UnboundedSender<String>,
    pub cancel: CancellationToken,
}

/// Open a websocket subscription and pump its frames into a line channel.
pub(crate) async fn connect(url: Url) -> Result<FeedConnection, ApiError> {
    let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let (handle, connection) = FeedConnection::channel();
    let cancel = handle.cancel.clone();

    tokio::spawn(async move {
        let (mut sink, mut source) = stream.split();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }

                message = source.next() => {
                    match message {
                        Some(Ok(Message::Text(payload))) => {
                            for line in payload.lines().filter(|l| !l.is_empty()) {
                                if handle.lines.send(line.to_string()).is_err() {
                                    // Receiver dropped, stop pumping
                                    return;
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        // Transport close events carry no guaranteed reason
                        // code; the channel just ends.
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            tracing::debug!(%err, "push feed read failed");
                            break;
                        }
                    }
                }
            }
        }
    });

    Ok(connection)
}
