//! Transient notifications pushed to connected WebSocket clients.
//!
//! Notifications are never persisted; one is built per transaction event (or
//! admin test push), handed to the dispatcher, and forgotten.

mod core;
mod test_endpoint;

pub use core::{
    Notification, NotificationActor, NotificationType, TransactionEventData, test_notification,
    transaction_created, transaction_deleted, transaction_updated,
};
pub use test_endpoint::{TestNotificationState, test_notification_endpoint};
