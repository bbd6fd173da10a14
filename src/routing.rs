//! Application router configuration.

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{
    AppState,
    auth::{log_in_endpoint, start_impersonation_endpoint, stop_impersonation_endpoint},
    endpoints,
    notification::test_notification_endpoint,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, list_transactions_endpoint,
        update_transaction_endpoint,
    },
    ws::ws_handler,
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(health))
        .route(endpoints::WS, get(ws_handler))
        .route(endpoints::LOG_IN, post(log_in_endpoint))
        .route(
            endpoints::IMPERSONATE,
            post(start_impersonation_endpoint).delete(stop_impersonation_endpoint),
        )
        .route(
            endpoints::TRANSACTIONS,
            get(list_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(endpoints::NOTIFICATION_TEST, post(test_notification_endpoint))
        .with_state(state)
}

/// Liveness probe for deployment tooling.
async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod route_tests {
    use axum_test::TestServer;
    use rusqlite::Connection;
    use serde_json::{Value, json};

    use crate::{
        AppState, endpoints,
        user::{User, UserID, UserRole},
    };

    use super::build_router;

    fn test_state() -> AppState {
        AppState::new(Connection::open_in_memory().unwrap(), "42")
            .expect("Could not create app state")
    }

    fn seed_user(state: &AppState, id: i64, name: &str, role: UserRole) -> User {
        let connection = state.db_connection.lock().unwrap();
        connection
            .execute(
                "INSERT INTO user (id, name, role) VALUES (?1, ?2, ?3)",
                (id, name, role.as_str()),
            )
            .expect("Could not seed user");

        User::new(UserID::new(id), name, role)
    }

    fn test_server(state: AppState) -> TestServer {
        TestServer::builder()
            .http_transport()
            .save_cookies()
            .try_build(build_router(state))
            .expect("Could not create test server")
    }

    async fn connect_ws(server: &TestServer, uid: &str) -> axum_test::TestWebSocket {
        let mut websocket = server
            .get_websocket(endpoints::WS)
            .add_query_param("uid", uid)
            .await
            .into_websocket()
            .await;

        let established: Value = websocket.receive_json().await;
        assert_eq!(established["type"], "connection_established");
        assert_eq!(established["connectionId"], uid);

        websocket
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = test_server(test_state());

        let response = server.get(endpoints::HEALTH).await;

        response.assert_status_ok();
        response.assert_text("ok");
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let state = test_state();
        seed_user(&state, 7, "Ana", UserRole::Usuario);
        let server = test_server(state);

        let mut websocket = connect_ws(&server, "7").await;

        websocket.send_json(&json!({"type": "ping"})).await;

        let reply: Value = websocket.receive_json().await;
        assert_eq!(reply["type"], "pong");
        assert!(reply["timestamp"].is_string());
    }

    #[tokio::test]
    async fn created_transaction_notifies_the_acting_user() {
        let state = test_state();
        seed_user(&state, 7, "Ana", UserRole::Usuario);
        let server = test_server(state);

        let mut websocket = connect_ws(&server, "7").await;

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 7}))
            .await
            .assert_status_ok();

        let response = server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "kind": "expense",
                "amount": 50.0,
                "date": "2025-10-05",
                "description": "Lunch",
            }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);

        let frame: Value = websocket.receive_json().await;
        assert_eq!(frame["type"], "notification");
        assert_eq!(frame["data"]["type"], "success");
        assert_eq!(frame["data"]["data"]["event"], "transaction.created");

        let message = frame["data"]["message"].as_str().unwrap();
        assert!(message.contains("50,00"), "got message {message:?}");
        assert!(message.contains("Lunch"), "got message {message:?}");
    }

    #[tokio::test]
    async fn targeted_broadcast_reaches_only_its_audience() {
        let state = test_state();
        let first = seed_user(&state, 1, "Ana", UserRole::Usuario);
        let second = seed_user(&state, 2, "Bruno", UserRole::Usuario);
        let server = test_server(state.clone());

        let mut first_ws = connect_ws(&server, "1").await;
        let mut second_ws = connect_ws(&server, "2").await;

        let notification = crate::notification::test_notification(&first);
        assert!(state.dispatcher.broadcast(&notification, &[first.id]));

        let frame: Value = first_ws.receive_json().await;
        assert_eq!(frame["data"]["id"], notification.id);

        // Push a sentinel to the second socket; if it sees the sentinel first,
        // the targeted broadcast never reached it.
        let sentinel = crate::notification::test_notification(&second);
        assert!(state.dispatcher.broadcast(&sentinel, &[second.id]));

        let frame: Value = second_ws.receive_json().await;
        assert_eq!(
            frame["data"]["id"], sentinel.id,
            "client 2 should only ever see the sentinel"
        );
    }

    #[tokio::test]
    async fn impersonated_transaction_routes_to_the_impersonated_user() {
        let state = test_state();
        let admin = seed_user(&state, 1, "Root", UserRole::Admin);
        seed_user(&state, 2, "Bruno", UserRole::Usuario);
        let server = test_server(state.clone());

        let mut admin_ws = connect_ws(&server, "1").await;
        let mut target_ws = connect_ws(&server, "2").await;

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 1}))
            .await
            .assert_status_ok();

        server
            .post(endpoints::IMPERSONATE)
            .json(&json!({"user_id": 2}))
            .await
            .assert_status_ok();

        server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "kind": "expense",
                "amount": 50.0,
                "date": "2025-10-05",
                "description": "Lunch",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let frame: Value = target_ws.receive_json().await;
        assert_eq!(frame["data"]["data"]["isImpersonated"], true);
        assert_eq!(frame["data"]["data"]["userId"], 2);
        assert_eq!(frame["data"]["from"]["name"], "Root");

        // The admin's own connection must not see the event. Use a sentinel
        // frame to prove nothing arrived before it.
        let sentinel = crate::notification::test_notification(&admin);
        assert!(state.dispatcher.broadcast(&sentinel, &[admin.id]));

        let frame: Value = admin_ws.receive_json().await;
        assert_eq!(
            frame["data"]["id"], sentinel.id,
            "the admin should only ever see the sentinel"
        );
    }

    #[tokio::test]
    async fn log_in_fails_for_unknown_user() {
        let server = test_server(test_state());

        let response = server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 404}))
            .await;

        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn impersonation_is_admin_only() {
        let state = test_state();
        seed_user(&state, 1, "Ana", UserRole::Usuario);
        seed_user(&state, 2, "Bruno", UserRole::Usuario);
        let server = test_server(state);

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 1}))
            .await
            .assert_status_ok();

        let response = server
            .post(endpoints::IMPERSONATE)
            .json(&json!({"user_id": 2}))
            .await;

        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn transactions_require_a_session() {
        let server = test_server(test_state());

        let response = server.get(endpoints::TRANSACTIONS).await;

        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn stopping_impersonation_restores_the_admin_identity() {
        let state = test_state();
        seed_user(&state, 1, "Root", UserRole::Admin);
        seed_user(&state, 2, "Bruno", UserRole::Usuario);
        let server = test_server(state);

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 1}))
            .await
            .assert_status_ok();
        server
            .post(endpoints::IMPERSONATE)
            .json(&json!({"user_id": 2}))
            .await
            .assert_status_ok();

        server
            .delete(endpoints::IMPERSONATE)
            .await
            .assert_status(axum::http::StatusCode::NO_CONTENT);

        // A transaction created now belongs to the admin again.
        server
            .post(endpoints::TRANSACTIONS)
            .json(&json!({
                "kind": "income",
                "amount": 10.0,
                "date": "2025-10-05",
                "description": "Salary",
            }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        let transactions: Vec<Value> = server
            .get(endpoints::TRANSACTIONS)
            .await
            .json::<Vec<Value>>();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0]["userId"], 1);
    }

    #[tokio::test]
    async fn test_notification_endpoint_broadcasts_for_admins() {
        let state = test_state();
        seed_user(&state, 1, "Root", UserRole::Admin);
        seed_user(&state, 2, "Bruno", UserRole::Usuario);
        let server = test_server(state);

        let mut websocket = connect_ws(&server, "2").await;

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 1}))
            .await
            .assert_status_ok();

        let response = server
            .post(endpoints::NOTIFICATION_TEST)
            .json(&json!({}))
            .await;
        response.assert_status_ok();
        response.assert_json(&json!({"delivered": true}));

        let frame: Value = websocket.receive_json().await;
        assert_eq!(frame["data"]["test"], true);
    }

    #[tokio::test]
    async fn test_notification_endpoint_rejects_regular_users() {
        let state = test_state();
        seed_user(&state, 1, "Ana", UserRole::Usuario);
        let server = test_server(state);

        server
            .post(endpoints::LOG_IN)
            .json(&json!({"user_id": 1}))
            .await
            .assert_status_ok();

        let response = server
            .post(endpoints::NOTIFICATION_TEST)
            .json(&json!({}))
            .await;

        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }
}
