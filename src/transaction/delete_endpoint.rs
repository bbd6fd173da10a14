//! Defines the endpoint for deleting a transaction.
use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::AuthSession,
    notification::transaction_deleted,
    transaction::{
        TransactionId,
        core::{delete_transaction, get_transaction},
    },
    user::get_user_by_id,
    ws::NotificationDispatcher,
};

/// The state needed to delete a transaction.
#[derive(Debug, Clone)]
pub struct DeleteTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The dispatcher notified after a successful delete.
    pub dispatcher: NotificationDispatcher,
}

impl FromRef<AppState> for DeleteTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }
}

/// A route handler for deleting a transaction.
///
/// The transaction is read before deletion so the notification can describe
/// what was removed.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn delete_transaction_endpoint(
    State(state): State<DeleteTransactionState>,
    session: AuthSession,
    Path(transaction_id): Path<TransactionId>,
) -> Result<impl IntoResponse, Error> {
    let acting_user_id = session.effective_user_id();

    let (transaction, actor) = {
        let connection = state.db_connection.lock().unwrap();

        let actor = get_user_by_id(session.user_id, &connection)?;
        let transaction = get_transaction(transaction_id, acting_user_id, &connection)
            .map_err(|error| match error {
                Error::NotFound => Error::DeleteMissingTransaction,
                error => error,
            })?;

        if delete_transaction(transaction_id, acting_user_id, &connection)? == 0 {
            return Err(Error::DeleteMissingTransaction);
        }

        (transaction, actor)
    };

    let notification = transaction_deleted(&transaction, &actor, session.is_impersonated());
    if !state.dispatcher.broadcast(&notification, &[acting_user_id]) {
        tracing::debug!(user_id = %acting_user_id, "no open connection for notification");
    }

    Ok(StatusCode::NO_CONTENT)
}
