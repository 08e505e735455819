//! Push channel: a long-lived websocket carrying agent status updates.

use futures_util::{SinkExt, StreamExt};
use gra_core::push::{parse_push_message, PushUpdate, DEFAULT_MAX_FRAME_BYTES};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    Connected,
    Disconnected,
    Update(PushUpdate),
}

/// Connects, forwards parsed updates, and reconnects with backoff until the
/// receiving side goes away.
pub async fn push_loop(url: Url, tx: mpsc::Sender<PushEvent>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        let (mut ws, _) = match connect_async(url.clone()).await {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "push_connect_error", url = %url, error = %err, retry_in = ?backoff);
                if tx.is_closed() {
                    return;
                }
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff);
                continue;
            }
        };
        backoff = INITIAL_BACKOFF;
        info!(event = "push_connected", url = %url);
        if tx.send(PushEvent::Connected).await.is_err() {
            let _ = ws.close(None).await;
            return;
        }

        while let Some(msg) = ws.next().await {
            match msg {
                Ok(Message::Text(text)) => match parse_push_message(&text, DEFAULT_MAX_FRAME_BYTES) {
                    Ok(update) => {
                        if tx.send(PushEvent::Update(update)).await.is_err() {
                            let _ = ws.close(None).await;
                            return;
                        }
                    }
                    Err(err) => warn!(event = "push_decode_error", error = %err),
                },
                Ok(Message::Ping(payload)) => {
                    if ws.send(Message::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(frame)) => {
                    debug!(event = "push_closed_by_peer", frame = ?frame);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(event = "push_read_error", error = %err);
                    break;
                }
            }
        }

        if tx.send(PushEvent::Disconnected).await.is_err() {
            return;
        }
        tokio::time::sleep(backoff).await;
        backoff = next_backoff(backoff);
    }
}

pub fn next_backoff(current: Duration) -> Duration {
    let next = current + current;
    if next > MAX_BACKOFF {
        MAX_BACKOFF
    } else {
        next
    }
}
