//! HTTP gateway: axum router, shared state, and the WebSocket
//! push channel, split across `gateway/{mod,daemon,routes,ws}.rs`.

pub mod daemon;
pub mod routes;
pub mod state;
pub mod ws;

pub use daemon::start_gateway;
pub use state::{ApiError, GatewayState};
