pub mod adapter;
pub mod adapters;
pub mod audit;
pub mod proxy;
pub mod router;
pub mod types;

pub use adapter::ProviderAdapter;
pub use audit::AuditLog;
pub use proxy::Proxy;
pub use router::{Router, RouteDecision};
pub use types::{Message, Request, Response, Role, ToolCall, ToolChoice, ToolDef};
