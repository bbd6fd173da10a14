//! Defines the endpoint for creating a new transaction.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
    http::StatusCode,
    response::IntoResponse,
};
use rusqlite::Connection;
use serde::Deserialize;
use time::Date;

use crate::{
    AppState, Error,
    auth::AuthSession,
    notification::transaction_created,
    transaction::{NewTransaction, TransactionKind, core::create_transaction},
    user::get_user_by_id,
    ws::NotificationDispatcher,
};

/// The state needed to create a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
    /// The dispatcher notified after a successful create.
    pub dispatcher: NotificationDispatcher,
}

impl FromRef<AppState> for CreateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }
}

/// The form data for creating or updating a transaction.
#[derive(Debug, Deserialize)]
pub struct TransactionForm {
    /// Whether the transaction is an income or an expense.
    pub kind: TransactionKind,
    /// The value of the transaction in reais.
    pub amount: f64,
    /// The date when the transaction occurred.
    pub date: Date,
    /// Text detailing the transaction.
    pub description: String,
}

/// A route handler for creating a new transaction.
///
/// The transaction is owned by the effective user, i.e. the impersonated user
/// when impersonation is active. Delivery of the resulting notification is
/// best-effort and never affects the HTTP response.
///
/// # Panics
///
/// Panics if the lock for the database connection is already held by the same thread.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionState>,
    session: AuthSession,
    Json(form): Json<TransactionForm>,
) -> Result<impl IntoResponse, Error> {
    let acting_user_id = session.effective_user_id();

    let (transaction, actor) = {
        let connection = state.db_connection.lock().unwrap();

        let actor = get_user_by_id(session.user_id, &connection)?;
        let transaction = create_transaction(
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

    let notification = transaction_created(&transaction, &actor, session.is_impersonated());
    if !state.dispatcher.broadcast(&notification, &[acting_user_id]) {
        tracing::debug!(user_id = %acting_user_id, "no open connection for notification");
    }

    Ok((StatusCode::CREATED, Json(transaction)))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
    use rusqlite::Connection;
    use time::macros::date;

    use crate::{
        auth::AuthSession,
        db::initialize,
        transaction::{TransactionKind, core::get_transaction},
        user::{User, UserID, UserRole, create_user},
        ws::{ConnectionRegistry, NotificationDispatcher, OutboundFrame},
    };

    use super::{CreateTransactionState, TransactionForm, create_transaction_endpoint};

    fn get_test_state() -> (CreateTransactionState, Arc<ConnectionRegistry>, User) {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        let user = create_user("Ana", UserRole::Usuario, &conn).unwrap();

        let registry = Arc::new(ConnectionRegistry::new());
        let state = CreateTransactionState {
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

    fn lunch_form() -> TransactionForm {
        TransactionForm {
            kind: TransactionKind::Expense,
            amount: 50.0,
            date: date!(2025 - 10 - 05),
            description: "Lunch".to_owned(),
        }
    }

    #[tokio::test]
    async fn can_create_transaction() {
        let (state, _registry, user) = get_test_state();

        let response =
            create_transaction_endpoint(State(state.clone()), session_for(&user), Json(lunch_form()))
                .await
                .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);

        let connection = state.db_connection.lock().unwrap();
        let transaction = get_transaction(1, user.id, &connection).unwrap();
        assert_eq!(transaction.amount, 50.0);
        assert_eq!(transaction.description, "Lunch");
        assert_eq!(transaction.user_id, user.id);
    }

    #[tokio::test]
    async fn connected_user_receives_notification() {
        let (state, registry, user) = get_test_state();
        let (_entry, mut rx) = registry.register(&user);

        create_transaction_endpoint(State(state), session_for(&user), Json(lunch_form()))
            .await
            .unwrap();

        let Ok(OutboundFrame::Text(payload)) = rx.try_recv() else {
            panic!("expected a notification frame");
        };
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["data"]["data"]["event"], "transaction.created");
        assert!(
            json["data"]["message"]
                .as_str()
                .unwrap()
                .contains("R$ 50,00")
        );
    }

    #[tokio::test]
    async fn create_succeeds_without_open_connection() {
        let (state, _registry, user) = get_test_state();

        let result =
            create_transaction_endpoint(State(state), session_for(&user), Json(lunch_form())).await;

        assert!(result.is_ok(), "delivery failure must not fail the request");
    }

    #[tokio::test]
    async fn impersonated_create_routes_to_effective_user() {
        let (state, registry, _user) = get_test_state();

        let (admin, target) = {
            let connection = state.db_connection.lock().unwrap();
            let admin = create_user("Root", UserRole::Admin, &connection).unwrap();
            let target = create_user("Bruno", UserRole::Usuario, &connection).unwrap();
            (admin, target)
        };

        let (_admin_entry, mut admin_rx) = registry.register(&admin);
        let (_target_entry, mut target_rx) = registry.register(&target);

        let session = AuthSession {
            user_id: admin.id,
            impersonating: Some(target.id),
        };

        create_transaction_endpoint(State(state), session, Json(lunch_form()))
            .await
            .unwrap();

        let Ok(OutboundFrame::Text(payload)) = target_rx.try_recv() else {
            panic!("the impersonated user should receive the notification");
        };
        let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(json["data"]["data"]["isImpersonated"], true);
        assert_eq!(json["data"]["data"]["userId"], target.id.as_i64());

        assert!(
            admin_rx.try_recv().is_err(),
            "the admin's own connection should receive nothing"
        );
    }

    #[tokio::test]
    async fn create_fails_for_unknown_session_user() {
        let (state, _registry, _user) = get_test_state();

        let session = AuthSession {
            user_id: UserID::new(404),
            impersonating: None,
        };

        let result = create_transaction_endpoint(State(state), session, Json(lunch_form())).await;

        assert!(result.is_err());
    }
}
