//! Defines the admin endpoint for pushing a test notification.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState, Error,
    auth::AuthSession,
    notification::test_notification,
    user::{UserID, UserRole, get_user_by_id},
    ws::NotificationDispatcher,
};

/// The state needed to push a test notification.
#[derive(Debug, Clone)]
pub struct TestNotificationState {
    /// The database connection used to check the caller's role.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The dispatcher that pushes to connected sockets.
    pub dispatcher: NotificationDispatcher,
}

impl FromRef<AppState> for TestNotificationState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }
}

/// The form data for the test push.
///
/// With neither field set the notification goes to every open connection.
#[derive(Debug, Default, Deserialize)]
pub struct TestNotificationForm {
    /// Deliver only to these user IDs.
    #[serde(default)]
    pub user_ids: Vec<i64>,
    /// Deliver to every connected user with this role.
    pub role: Option<UserRole>,
}

/// A route handler that pushes a test notification to connected clients.
///
/// Only admins may call this. Returns whether at least one connection
/// received the push.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn test_notification_endpoint(
    State(state): State<TestNotificationState>,
    session: AuthSession,
    Json(form): Json<TestNotificationForm>,
) -> Result<Json<Value>, Error> {
    let admin = {
        let connection = state.db_connection.lock().unwrap();
        get_user_by_id(session.user_id, &connection)?
    };

    if !admin.role.is_admin() {
        return Err(Error::Forbidden);
    }

    let notification = test_notification(&admin);

    let delivered = match form.role {
        Some(role) => state.dispatcher.broadcast_to_role(&notification, role),
        None => {
            let targets: Vec<UserID> = form.user_ids.into_iter().map(UserID::new).collect();
            state.dispatcher.broadcast(&notification, &targets)
        }
    };

    tracing::info!(admin_id = %admin.id, delivered, "test notification pushed");

    Ok(Json(json!({ "delivered": delivered })))
}
