//! Socket loop for one connected client, from upgrade to disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::broadcast::{BroadcastHub, Subscription};
use crate::client::ClientConnection;
use crate::handler::ConnectionHandler;
use crate::response::OutgoingResponse;

/// Interval between server-initiated Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the client dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Drive one WebSocket connection.
///
/// 1. Sends `{"type":"created"}`
/// 2. Answers every inbound text frame with exactly one response
/// 3. Forwards broadcasts for the conversation the session is pinned to
/// 4. Pings periodically and drops clients that stop answering
#[instrument(skip_all, fields(client_id = %client.id))]
pub async fn run_connection(
    socket: WebSocket,
    client: Arc<ClientConnection>,
    mut outbound_rx: mpsc::Receiver<String>,
    mut handler: ConnectionHandler,
    hub: Arc<BroadcastHub>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_client = Arc::clone(&client);
    let mut writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                frame = outbound_rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !writer_client.check_alive()
                        && writer_client.last_pong_elapsed() > PONG_TIMEOUT
                    {
                        warn!("client unresponsive for {:?}, disconnecting", PONG_TIMEOUT);
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    reply(&client, &handler.on_connect()).await;
    info!(chat_id = ?handler.conversation_id().map(|c| c.as_str()), "client connected");

    let mut subscription = Subscription::new(hub);
    subscription.follow(handler.conversation_id());

    loop {
        tokio::select! {
            inbound = ws_rx.next() => {
                let Some(Ok(msg)) = inbound else { break };
                client.mark_alive();

                let text = match msg {
                    Message::Text(t) => t.to_string(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            debug!(len = data.len(), "non-UTF8 binary frame ignored");
                            continue;
                        }
                    },
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                    Message::Ping(_) | Message::Pong(_) => continue,
                };

                if let Some(response) = handler.on_frame(&text).await {
                    reply(&client, &response).await;
                }
                subscription.follow(handler.conversation_id());
            }
            event = subscription.recv() => {
                if let Some(response) = handler.on_broadcast(event) {
                    push(&client, &response);
                }
            }
            _ = &mut writer => {
                debug!("writer finished");
                break;
            }
        }
    }

    handler.on_disconnect();
    writer.abort();
    info!(
        chat_id = ?handler.conversation_id().map(|c| c.as_str()),
        "client disconnected"
    );
}

/// Queue the answer to a frame. Waits for queue room so an
/// acknowledgement is never dropped.
async fn reply(client: &ClientConnection, response: &OutgoingResponse) {
    match response.to_json() {
        Ok(json) => {
            if !client.reply(json).await {
                debug!("writer closed before reply could be queued");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode response"),
    }
}

/// Queue a broadcast. Dropped when the client's queue is full.
fn push(client: &ClientConnection, response: &OutgoingResponse) {
    match response.to_json() {
        Ok(json) => {
            if !client.send(json) {
                warn!(dropped = client.drop_count(), "outbound queue full, broadcast dropped");
            }
        }
        Err(e) => warn!(error = %e, "failed to encode broadcast"),
    }
}
