//! Routes notifications to the matching open connections.

use std::sync::Arc;

use crate::{
    notification::Notification,
    user::{UserID, UserRole},
    ws::{
        protocol::ServerMessage,
        registry::{ConnectionEntry, ConnectionRegistry, OutboundFrame},
    },
};

/// Pushes notification frames to connections held in the registry.
///
/// Dispatch is best-effort: a recipient whose channel is closed or full is
/// logged and skipped, and callers treat the returned flag as informational
/// only. A failed delivery never propagates into the request that produced
/// the notification.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `notification` to the given users, or to every open
    /// connection when `target_user_ids` is empty.
    ///
    /// Users without an open connection are silently skipped. Returns whether
    /// at least one connection received the frame.
    pub fn broadcast(&self, notification: &Notification, target_user_ids: &[UserID]) -> bool {
        let Some(payload) = serialize(notification) else {
            return false;
        };

        let mut delivered = false;

        if target_user_ids.is_empty() {
            for entry in self.registry.snapshot() {
                delivered |= push(&entry, payload.clone());
            }
        } else {
            for &user_id in target_user_ids {
                if let Some(entry) = self.registry.get(user_id) {
                    delivered |= push(&entry, payload.clone());
                }
            }
        }

        delivered
    }

    /// Deliver `notification` to every connected user whose role matches
    /// `role` exactly.
    ///
    /// Returns whether at least one connection received the frame.
    pub fn broadcast_to_role(&self, notification: &Notification, role: UserRole) -> bool {
        let Some(payload) = serialize(notification) else {
            return false;
        };

        let mut delivered = false;

        for entry in self.registry.snapshot() {
            if entry.role == role {
                delivered |= push(&entry, payload.clone());
            }
        }

        delivered
    }
}

fn serialize(notification: &Notification) -> Option<String> {
    match serde_json::to_string(&ServerMessage::Notification {
        data: notification.clone(),
    }) {
        Ok(payload) => Some(payload),
        Err(error) => {
            tracing::error!(
                notification_id = %notification.id,
                "could not serialize notification: {error}"
            );
            None
        }
    }
}

fn push(entry: &ConnectionEntry, payload: String) -> bool {
    if entry.is_closed() {
        return false;
    }

    match entry.try_send(OutboundFrame::Text(payload)) {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(
                recipient = %entry.display_name,
                "could not deliver notification: {error}"
            );
            false
        }
    }
}
