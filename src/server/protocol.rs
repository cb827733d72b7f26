// src/server/protocol.rs

//! Observer wire protocol.
//!
//! Every WebSocket text frame is a JSON object `{"event": <name>, "data": {...}}`.
//!
//! Server to observer: `installEvent`, `keepAlive`, `launch`, `done`.
//! Observer to server: `submitToken`, `ack`.

use serde::{Deserialize, Serialize};

use crate::engine::InstallRequest;
use crate::progress::ProgressEvent;
use crate::types::SessionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    InstallEvent {
        message: String,
        /// Set on the connection handshake, which the observer acknowledges.
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        ack: bool,
    },
    KeepAlive {
        message: String,
        chr: char,
    },
    Launch {
        url: String,
    },
    Done {},
}

impl From<ProgressEvent> for ServerMessage {
    fn from(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::Connected => ServerMessage::InstallEvent {
                message: "connected".to_string(),
                ack: true,
            },
            ProgressEvent::Message(message) => ServerMessage::InstallEvent {
                message,
                ack: false,
            },
            ProgressEvent::Launch { url } => ServerMessage::Launch { url },
            ProgressEvent::KeepAlive { chr } => ServerMessage::KeepAlive {
                message: "Server generated event".to_string(),
                chr,
            },
            ProgressEvent::Done => ServerMessage::Done {},
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    SubmitToken(SubmitToken),
    /// Acknowledges the connection handshake.
    Ack,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitToken {
    pub auth_id: String,
    pub token: String,
    #[serde(default)]
    pub project: Option<String>,
}

impl From<SubmitToken> for InstallRequest {
    fn from(msg: SubmitToken) -> Self {
        InstallRequest::new(SessionId::from(msg.auth_id.as_str()), msg.token, msg.project)
    }
}
