//! The WebSocket upgrade endpoint and per-connection socket loop.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        FromRef, Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::Response,
};
use rusqlite::Connection;
use serde::Deserialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    AppState, Error,
    user::{User, UserID, get_user_by_id},
    ws::{
        protocol::{ClientMessage, ServerMessage},
        registry::{ConnectionEntry, ConnectionRegistry, OutboundFrame},
    },
};

/// The state needed to accept a WebSocket connection.
#[derive(Debug, Clone)]
pub struct WsState {
    /// The database connection used to validate the identity token.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The registry the connection is stored in.
    pub registry: Arc<ConnectionRegistry>,
}

impl FromRef<AppState> for WsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            registry: state.registry.clone(),
        }
    }
}

/// The query parameters of the upgrade request.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// The identity token: the connecting user's ID.
    pub uid: Option<String>,
}

/// Validate the identity token carried on the upgrade request.
///
/// Any numeric ID of an existing user authenticates the socket. This is a
/// weaker trust model than the cookie-based HTTP sessions and is a known
/// asymmetry, kept so existing clients can connect without a cookie-capable
/// WebSocket stack.
///
/// # Errors
///
/// Returns [Error::InvalidUserId] if `token` is missing or not an integer,
/// and [Error::NotFound] if no user has that ID.
fn authenticate(token: Option<&str>, connection: &Connection) -> Result<User, Error> {
    let raw_id: i64 = token
        .ok_or(Error::InvalidUserId)?
        .parse()
        .map_err(|_| Error::InvalidUserId)?;

    get_user_by_id(UserID::new(raw_id), connection)
}

/// The WebSocket upgrade handler.
///
/// The identity token is validated before the upgrade is accepted, but a
/// failed validation still completes the upgrade so the policy-violation
/// close frame (1008) actually reaches the client; refusing the upgrade
/// outright would surface as an opaque HTTP error instead.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn ws_handler(
    State(state): State<WsState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let validated = {
        let connection = state.db_connection.lock().unwrap();
        authenticate(query.uid.as_deref(), &connection)
    };

    let registry = state.registry.clone();

    ws.on_upgrade(move |socket| async move {
        match validated {
            Ok(user) => run_socket(socket, user, registry).await,
            Err(error) => reject(socket, error).await,
        }
    })
}

/// Close a socket whose handshake failed validation.
async fn reject(mut socket: WebSocket, error: Error) {
    tracing::info!("rejecting socket connection: {error}");

    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: error.to_string().into(),
        })))
        .await;
}

/// Drive one validated connection until it closes.
async fn run_socket(mut socket: WebSocket, user: User, registry: Arc<ConnectionRegistry>) {
    let (entry, mut rx) = registry.register(&user);

    tracing::info!(user_id = %user.id, name = %user.name, "socket connected");

    let established = ServerMessage::ConnectionEstablished {
        message: format!("Connected as {}", user.name),
        timestamp: now_rfc3339(),
        connection_id: user.id.to_string(),
    };

    if send_json(&mut socket, &established).await.is_err() {
        registry.remove(user.id, entry.conn_id());
        return;
    }

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(OutboundFrame::Text(payload)) => {
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Ping) => {
                    if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                Some(OutboundFrame::Terminate) => {
                    let _ = socket
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "connection terminated by server".into(),
                        })))
                        .await;
                    break;
                }
                // The entry was dropped from the registry.
                None => break,
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(text.as_str(), &entry, &mut socket).await;
                }
                Some(Ok(Message::Pong(_))) => {
                    // The sole mechanism that keeps a connection alive past
                    // the liveness timeout.
                    entry.touch();
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::debug!(user_id = %user.id, "socket error: {error}");
                    break;
                }
            },
        }
    }

    registry.remove(user.id, entry.conn_id());
    tracing::info!(user_id = %user.id, "socket disconnected");
}

/// React to one inbound JSON text frame. Malformed frames are logged and
/// ignored; the connection stays open.
async fn handle_client_message(text: &str, entry: &ConnectionEntry, socket: &mut WebSocket) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(error) => {
            tracing::debug!(
                user_id = %entry.user_id,
                "ignoring malformed client message: {error}"
            );
            return;
        }
    };

    match message {
        ClientMessage::Ping => {
            entry.touch();

            let pong = ServerMessage::Pong {
                timestamp: now_rfc3339(),
            };
            let _ = send_json(socket, &pong).await;
        }
        ClientMessage::NotificationRead { notification_id } => {
            tracing::info!(
                user_id = %entry.user_id,
                %notification_id,
                "notification read"
            );
        }
        ClientMessage::Unknown => {
            tracing::debug!(user_id = %entry.user_id, "ignoring unknown client message type");
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let payload = serde_json::to_string(message)
        .map_err(|error| axum::Error::new(Error::JsonSerializationError(error.to_string())))?;

    socket.send(Message::Text(payload.into())).await
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
