//! The JSON frame types exchanged over the WebSocket.

use serde::{Deserialize, Serialize};

use crate::notification::Notification;

/// A message sent by the client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// An application-level keepalive; answered with [ServerMessage::Pong].
    Ping,
    /// The client saw a notification. Acknowledged by log only.
    NotificationRead {
        /// The ID of the notification that was read.
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
    /// Any message type this server does not know. Tolerated, not fatal.
    #[serde(other)]
    Unknown,
}

/// A message sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, immediately after a successful handshake.
    ConnectionEstablished {
        /// A human-readable greeting.
        message: String,
        /// When the connection was established, as an RFC 3339 string.
        timestamp: String,
        /// The connected user's ID in string form.
        #[serde(rename = "connectionId")]
        connection_id: String,
    },
    /// The answer to a [ClientMessage::Ping].
    Pong {
        /// When the pong was sent, as an RFC 3339 string.
        timestamp: String,
    },
    /// A notification delivery.
    Notification {
        /// The notification being delivered.
        data: Notification,
    },
}
