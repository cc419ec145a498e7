//! WebSocket handling for one player.
//!
//! Every connection gets a session id and is split into two tasks:
//! - **Receive task**: parses JSON text frames and forwards them to the engine
//! - **Send task**: serializes whatever the engine queued for this session
//!
//! When either task completes (connection lost, client too slow, engine gone), the
//! other is aborted and the engine is told that the session is gone.

use crate::engine::{EngineHandle, Event};
use crate::outbox::SessionId;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{CHANNEL_BUFFER_SIZE, ClientMessage, ServerMessage};
use tokio::sync::mpsc;

/// Does the whole handling from start to finish: registration -> message exchange -> cleanup.
pub async fn websocket(stream: WebSocket, engine: EngineHandle) {
    // By splitting, we can send and receive at the same time.
    let (sender, receiver) = stream.split();
    let session = engine.new_session();
    let (outbound, outbound_receiver) = mpsc::channel(CHANNEL_BUFFER_SIZE);

    if engine
        .send(Event::Connected { session, outbound })
        .await
        .is_err()
    {
        tracing::error!(session, "Engine is gone, refusing connection.");
        return;
    }
    tracing::info!(session, "Session connected.");

    let mut send_task = tokio::spawn(async move { send_logic(sender, outbound_receiver).await });
    let events = engine.clone();
    let mut receive_task =
        tokio::spawn(async move { receive_logic(receiver, events, session).await });

    // If any one of the tasks run to completion, we abort the other.
    let result = tokio::select! {
        res_a = &mut send_task => {receive_task.abort(); res_a},
        res_b = &mut receive_task => {send_task.abort(); res_b},
    };
    let reason = result.unwrap_or_else(|err| {
        tracing::error!(?err, "Internal panic in session logic.");
        "Internal panic in session logic."
    });
    tracing::info!(session, reason, "Session closed.");

    if engine.send(Event::Disconnected { session }).await.is_err() {
        tracing::error!(session, "Engine is gone, cleanup skipped.");
    }
}

/// Receives frames from the client and hands the parsed messages to the engine.
///
/// Only text frames carry messages. Frames that are no valid message are dropped,
/// binary frames and ping / pong are ignored.
async fn receive_logic(
    mut receiver: SplitStream<WebSocket>,
    engine: EngineHandle,
    session: SessionId,
) -> &'static str {
    while let Some(state) = receiver.next().await {
        match state {
            Ok(Message::Text(text)) => {
                let message = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => message,
                    Err(error) => {
                        tracing::debug!(session, %error, "Ignoring malformed frame.");
                        continue;
                    }
                };
                if engine
                    .send(Event::Inbound { session, message })
                    .await
                    .is_err()
                {
                    tracing::error!(session, "Engine is gone.");
                    return "Engine stopped.";
                }
            }
            Ok(Message::Close(_)) => {
                return "Client disconnected intentionally";
            }
            Ok(_) => {} // Ignore other messages (ping/pong handled by axum)
            Err(_) => {
                return "Connection lost.";
            }
        }
    }
    "Connection lost."
}

/// Sends everything the engine queued for this session as JSON text frames.
async fn send_logic(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) -> &'static str {
    while let Some(message) = outbound.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(?error, "Failed to encode message.");
                return "Failed to encode message.";
            }
        };
        if let Err(error) = sender.send(Message::Text(text.into())).await {
            tracing::error!(?error, "Error in communication with client endpoint.");
            return "Error in communication with client endpoint.";
        }
    }
    // The engine dropped our channel, the client could not keep up.
    let _ = sender.send(Message::Close(None)).await;
    "Client too slow, outbound channel closed."
}
