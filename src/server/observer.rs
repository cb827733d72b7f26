// src/server/observer.rs

//! One WebSocket connection per observer.
//!
//! A writer task merges the connection's own progress queue with the shared
//! heartbeat into the socket. The reading side handles observer messages;
//! a token submission runs the whole pipeline inline, so this observer's
//! further messages wait until the run is over.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::engine::InstallRequest;
use crate::progress::{ObserverSink, ProgressEvent, ProgressSink};
use crate::server::AppState;
use crate::server::protocol::{ClientMessage, ServerMessage};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("observer connected");
    let (sender, mut receiver) = socket.split();

    let (tx, rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let beats = state.heartbeat.subscribe();
    if state.heartbeat.ensure_started() {
        debug!("first observer started the heartbeat");
    }
    let writer = tokio::spawn(write_events(sender, rx, beats));

    let sink: Arc<dyn ProgressSink> = Arc::new(ObserverSink::new(tx));
    sink.publish(ProgressEvent::Connected);

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "observer socket error");
                break;
            }
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::SubmitToken(submit)) => {
                let request = InstallRequest::from(submit);
                info!(session = %request.session_id, project = ?request.project, "token submitted");
                state
                    .engine
                    .handle_submission(request, sink.clone())
                    .await;
            }
            Ok(ClientMessage::Ack) => info!("connect message received"),
            Err(e) => warn!(error = %e, "ignoring unparseable observer message"),
        }
    }

    drop(sink);
    writer.abort();
    info!("observer disconnected");
}

async fn write_events(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    mut beats: broadcast::Receiver<ProgressEvent>,
) {
    loop {
        let event = tokio::select! {
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
            beat = beats.recv() => match beat {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "observer missed heartbeats");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        let frame = match serde_json::to_string(&ServerMessage::from(event)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "could not encode progress event");
                continue;
            }
        };
        if sender.send(Message::Text(frame)).await.is_err() {
            debug!("observer went away while writing");
            break;
        }
    }
}
