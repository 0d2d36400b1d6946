pub mod claude;
pub mod local;
pub mod openai;
pub mod shared;

pub use claude::ClaudeAdapter;
pub use local::LocalAdapter;
pub use openai::OpenAiAdapter;
