//! Defines the notification payload and the builders for each event.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{
    currency::format_brl,
    transaction::Transaction,
    user::{User, UserID, UserRole},
};

/// How a notification should be presented by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    /// Neutral information, e.g. a transaction was updated.
    Info,
    /// Something the user should look at, e.g. a transaction was deleted.
    Warning,
    /// Something went wrong.
    Error,
    /// A successful operation, e.g. a transaction was created.
    Success,
}

/// The user who triggered the event, as shown in the notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationActor {
    /// The acting user's ID.
    pub id: UserID,
    /// The acting user's display name.
    pub name: String,
    /// The acting user's role.
    pub role: UserRole,
}

impl From<&User> for NotificationActor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            role: user.role,
        }
    }
}

/// The event-specific payload attached to transaction notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEventData {
    /// The event name, e.g. `transaction.created`.
    pub event: String,
    /// The transaction the event is about.
    pub transaction: Transaction,
    /// The ID of the user who owns the transaction.
    pub user_id: UserID,
    /// Whether the triggering request ran under an active impersonation
    /// session. Recorded for observability; delivery routing ignores it.
    pub is_impersonated: bool,
}

/// A transient message pushed to connected clients.
///
/// Duplicate ids are tolerated; the client deduplicates on its side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// An identifier unique per logical event, e.g. `transaction_created_42`.
    pub id: String,
    /// The display category of the notification.
    #[serde(rename = "type")]
    pub kind: NotificationType,
    /// A short heading.
    pub title: String,
    /// The full display message.
    pub message: String,
    /// When the notification was built, as an RFC 3339 string.
    pub timestamp: String,
    /// The user who triggered the event, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NotificationActor>,
    /// The event-specific payload, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TransactionEventData>,
    /// Display hint: the client may dismiss this automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_close: Option<bool>,
    /// Display hint: the client should keep this until dismissed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,
    /// Display hint: this was sent to more than one user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broadcast: Option<bool>,
    /// Display hint: this is a test push, not a real event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<bool>,
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

fn transaction_event(
    event: &str,
    id_prefix: &str,
    kind: NotificationType,
    title: &str,
    message: String,
    transaction: &Transaction,
    actor: &User,
    is_impersonated: bool,
) -> Notification {
    Notification {
        id: format!("{id_prefix}_{}", transaction.id),
        kind,
        title: title.to_owned(),
        message,
        timestamp: now_rfc3339(),
        from: Some(NotificationActor::from(actor)),
        data: Some(TransactionEventData {
            event: event.to_owned(),
            transaction: transaction.clone(),
            user_id: transaction.user_id,
            is_impersonated,
        }),
        auto_close: Some(true),
        persistent: None,
        broadcast: None,
        test: None,
    }
}

/// Build the notification for a freshly created transaction.
pub fn transaction_created(
    transaction: &Transaction,
    actor: &User,
    is_impersonated: bool,
) -> Notification {
    let message = format!(
        "{} of {} created: {}",
        transaction.kind.label(),
        format_brl(transaction.amount),
        transaction.description
    );

    transaction_event(
        "transaction.created",
        "transaction_created",
        NotificationType::Success,
        "Transaction created",
        message,
        transaction,
        actor,
        is_impersonated,
    )
}

/// Build the notification for an updated transaction.
pub fn transaction_updated(
    transaction: &Transaction,
    actor: &User,
    is_impersonated: bool,
) -> Notification {
    let message = format!(
        "{} of {} updated: {}",
        transaction.kind.label(),
        format_brl(transaction.amount),
        transaction.description
    );

    transaction_event(
        "transaction.updated",
        "transaction_updated",
        NotificationType::Info,
        "Transaction updated",
        message,
        transaction,
        actor,
        is_impersonated,
    )
}

/// Build the notification for a deleted transaction.
pub fn transaction_deleted(
    transaction: &Transaction,
    actor: &User,
    is_impersonated: bool,
) -> Notification {
    let message = format!(
        "{} of {} deleted: {}",
        transaction.kind.label(),
        format_brl(transaction.amount),
        transaction.description
    );

    transaction_event(
        "transaction.deleted",
        "transaction_deleted",
        NotificationType::Warning,
        "Transaction deleted",
        message,
        transaction,
        actor,
        is_impersonated,
    )
}

/// Build a test notification for the admin push endpoint.
pub fn test_notification(actor: &User) -> Notification {
    Notification {
        id: format!("test_{}", now_rfc3339()),
        kind: NotificationType::Info,
        title: "Test notification".to_owned(),
        message: format!("Test notification sent by {}", actor.name),
        timestamp: now_rfc3339(),
        from: Some(NotificationActor::from(actor)),
        data: None,
        auto_close: Some(true),
        persistent: None,
        broadcast: Some(true),
        test: Some(true),
    }
}
