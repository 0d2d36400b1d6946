pub mod budget_usage;
pub mod chat_message;
pub mod galla_log;
pub mod growth_log;
pub mod health_check;
pub mod inbox_message;
pub mod library;
pub mod llm_call;
pub mod memory;
pub mod model;
pub mod provider;

pub use budget_usage::{BudgetUsageRow, NewBudgetUsageRow};
pub use chat_message::{ChatMessageRow, NewChatMessageRow};
pub use galla_log::{GallaLogRow, NewGallaLogRow};
pub use growth_log::{GrowthLogRow, NewGrowthLogRow};
pub use health_check::{HealthCheckRow, HealthStatus, NewHealthCheckRow};
pub use inbox_message::{InboxMessageRow, NewInboxMessageRow};
pub use library::{LibraryCommentRow, LibraryItemRow, NewLibraryCommentRow, NewLibraryItemRow};
pub use llm_call::{LlmCallRow, NewLlmCallRow};
pub use memory::{MemoryRow, NewMemoryRow};
pub use model::{Capability, ModelRow, NewModelRow};
pub use provider::{NewProviderRow, ProviderRow};
