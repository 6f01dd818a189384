use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use gant_meet_protocol::SignalMessage;
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::relay::Relay;

/// Serve a single peer for as long as its socket stays open.
pub async fn user_connected(ws: WebSocket, relay: Relay) {
    let (mut user_ws_tx, mut user_ws_rx) = ws.split();

    let (tx, rx) = mpsc::unbounded_channel::<SignalMessage>();
    let mut rx = UnboundedReceiverStream::new(rx);

    let peer_id = relay.connect(tx).await;
    info!("new peer connected: {peer_id}");

    tokio::task::spawn(async move {
        while let Some(message) = rx.next().await {
            let frame = match message.encode() {
                Ok(frame) => frame,
                Err(err) => {
                    error!("failed to encode {} for {peer_id}: {err}", message.kind());
                    continue;
                }
            };
            if let Err(err) = user_ws_tx.send(Message::Text(frame)).await {
                error!("websocket send error (id={peer_id}): {err}");
                break;
            }
        }
    });

    while let Some(result) = user_ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(err) => {
                error!("websocket error (id={peer_id}): {err}");
                break;
            }
        };

        match msg {
            Message::Text(frame) => match SignalMessage::decode(&frame) {
                Ok(message) => {
                    if let Err(err) = relay.handle(peer_id, message).await {
                        warn!("error while handling message from {peer_id}: {err}");
                    }
                }
                Err(err) => warn!("malformed message from {peer_id}: {err}"),
            },
            Message::Binary(_) => warn!("binary frame from {peer_id} ignored"),
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    info!("peer disconnected: {peer_id}");
    relay.disconnect(peer_id).await;
}
