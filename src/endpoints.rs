//! The API endpoint URIs.

/// The health check route.
pub const HEALTH: &str = "/health";
/// The WebSocket upgrade route. Clients must pass their user ID as the `uid`
/// query parameter.
pub const WS: &str = "/ws";
/// The route for starting a session as an existing user.
pub const LOG_IN: &str = "/api/log_in";
/// The route for starting (POST) and stopping (DELETE) admin impersonation.
pub const IMPERSONATE: &str = "/api/impersonate";
/// The route for listing (GET) and creating (POST) transactions.
pub const TRANSACTIONS: &str = "/api/transactions";
/// The route for updating (PUT) and deleting (DELETE) a single transaction.
pub const TRANSACTION: &str = "/api/transactions/{transaction_id}";
/// The admin route for pushing a test notification to connected clients.
pub const NOTIFICATION_TEST: &str = "/api/notifications/test";
