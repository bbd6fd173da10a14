//! The real-time WebSocket layer.
//!
//! A client opens a socket at the upgrade endpoint with its user ID as a
//! query parameter. Once validated, the connection is stored in the
//! [ConnectionRegistry] (at most one live connection per user), the
//! [LivenessSupervisor] pings it on a fixed interval and evicts it when pongs
//! stop coming back, and the [NotificationDispatcher] pushes notification
//! frames to it whenever a transaction event targets that user.

mod dispatcher;
mod handler;
mod liveness;
mod protocol;
mod registry;

pub use dispatcher::NotificationDispatcher;
pub use handler::{WsState, ws_handler};
pub use liveness::{LivenessConfig, LivenessSupervisor};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{ConnectionEntry, ConnectionRegistry, OutboundFrame};
