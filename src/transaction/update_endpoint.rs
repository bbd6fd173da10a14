//! Defines the endpoint for updating an existing transaction.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, Path, State},
};
use rusqlite::Connection;

use crate::{
    AppState, Error,
    auth::AuthSession,
    notification::transaction_updated,
    transaction::{
        NewTransaction, Transaction, TransactionId, core::update_transaction,
        create_endpoint::TransactionForm,
    },
    user::get_user_by_id,
    ws::NotificationDispatcher,
};

/// The state needed to update a transaction.
#[derive(Debug, Clone)]
pub struct UpdateTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The dispatcher notified after a successful update.
    pub dispatcher: NotificationDispatcher,
}

impl FromRef<AppState> for UpdateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }
}

/// A route handler for overwriting a transaction with new values.
///
/// Only transactions owned by the effective user can be updated; anything
/// else looks like a missing transaction.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn update_transaction_endpoint(
    State(state): State<UpdateTransactionState>,
    session: AuthSession,
    Path(transaction_id): Path<TransactionId>,
    Json(form): Json<TransactionForm>,
) -> Result<Json<Transaction>, Error> {
    let acting_user_id = session.effective_user_id();

    let (transaction, actor) = {
        let connection = state.db_connection.lock().unwrap();

        let actor = get_user_by_id(session.user_id, &connection)?;
        let transaction = update_transaction(
            transaction_id,
            NewTransaction {
                kind: form.kind,
                amount: form.amount,
                date: form.date,
                description: form.description,
                user_id: acting_user_id,
            },
            &connection,
        )?;

        (transaction, actor)
    };

    let notification = transaction_updated(&transaction, &actor, session.is_impersonated());
    if !state.dispatcher.broadcast(&notification, &[acting_user_id]) {
        tracing::debug!(user_id = %acting_user_id, "no open connection for notification");
    }

    Ok(Json(transaction))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, extract::Path, extract::State};
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        Error,
        auth::AuthSession,
        db::initialize,
        transaction::{
            NewTransaction, TransactionKind, core::create_transaction,
            create_endpoint::TransactionForm,
        },
        user::{User, UserRole, create_user},
        ws::{ConnectionRegistry, NotificationDispatcher, OutboundFrame},
    };

    use super::{UpdateTransactionState, update_transaction_endpoint};

    fn get_test_state() -> (UpdateTransactionState, Arc<ConnectionRegistry>, User) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user("Ana", UserRole::Usuario, &conn).unwrap();

        let registry = Arc::new(ConnectionRegistry::new());
        let state = UpdateTransactionState {
            db_connection: Arc::new(Mutex::new(conn)),
            dispatcher: NotificationDispatcher::new(registry.clone()),
        };

        (state, registry, user)
    }

    fn session_for(user: &User) -> AuthSession {
        AuthSession {
            user_id: user.id,
            impersonating: None,
        }
    }

    #[tokio::test]
    async fn can_update_transaction() {
        let (state, registry, user) = get_test_state();
        let (_entry, mut rx) = registry.register(&user);

        let transaction = {
            let connection = state.db_connection.lock().unwrap();
            create_transaction(
                NewTransaction {
                    kind: TransactionKind::Expense,
                    amount: 50.0,
                    date: date!(2025 - 10 - 05),
                    description: "Lunch".to_owned(),
                    user_id: user.id,
                },
                &connection,
            )
            .unwrap()
        };

        let Json(updated) = update_transaction_endpoint(
            State(state),
            session_for(&user),
            Path(transaction.id),
            Json(TransactionForm {
                kind: TransactionKind::Expense,
                amount: 75.0,
                date: date!(2025 - 10 - 05),
                description: "Dinner".to_owned(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(updated.amount, 75.0);
        assert_eq!(updated.description, "Dinner");

        let Ok(OutboundFrame::Text(payload)) = rx.try_recv() else {
            panic!("expected a notification frame");
        };
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["data"]["type"], "info");
        assert_eq!(json["data"]["data"]["event"], "transaction.updated");
    }

    #[tokio::test]
    async fn update_fails_on_missing_transaction() {
        let (state, _registry, user) = get_test_state();

        let result = update_transaction_endpoint(
            State(state),
            session_for(&user),
            Path(42),
            Json(TransactionForm {
                kind: TransactionKind::Income,
                amount: 1.0,
                date: date!(2025 - 10 - 05),
                description: String::new(),
            }),
        )
        .await;

        assert!(matches!(result, Err(Error::UpdateMissingTransaction)));
    }
}
