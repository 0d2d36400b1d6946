//! Error taxonomy shared across the kernel.
//!
//! Each subsystem owns a narrower `thiserror` enum (`DbError`,
//! `AdapterError`, …); this module holds the cross-cutting categories that
//! the HTTP surface needs to tell apart when deciding a status code.

use thiserror::Error;

/// Fatal-at-boot configuration failures: bad encryption key, unreachable
/// DB, failed migration. Never returned once the kernel is running.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing or malformed root encryption key: {0}")]
    BadRootKey(String),
    #[error("database unreachable: {0}")]
    DbUnreachable(String),
    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

/// Errors from the Router: returned to the proxy caller as a
/// specific status; the caller may retry later.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("no route for intent `{intent}`")]
    NoRoute { intent: String },
    #[error("model busy: {provider}/{model_key}")]
    ModelBusy { provider: String, model_key: String },
    #[error("budget exhausted for {provider}/{intent}")]
    BudgetExhausted { provider: String, intent: String },
}

/// Programmer-error class from a Provider Adapter: malformed
/// request construction or unparseable wire response. Surfaced as 5xx.
#[derive(Debug, Error, Clone)]
pub enum AdapterError {
    #[error("failed to build request: {0}")]
    BuildFailed(String),
    #[error("failed to parse response: {0}")]
    ParseFailed(String),
}

/// Wire-level 4xx/5xx from the upstream provider.
#[derive(Debug, Error, Clone)]
#[error("provider error: status {status}, body: {body}")]
pub struct ProviderError {
    pub status: u16,
    pub body: String,
}

impl ProviderError {
    /// Status codes the Proxy's retry loop treats as transient.
    pub fn is_retryable(status: u16) -> bool {
        matches!(status, 429 | 502 | 503 | 529)
    }
}

/// Dial/timeout failures talking to a provider.
#[derive(Debug, Error, Clone)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

/// SSH failures from the Supervisor. Logged and reflected in status;
/// never fatal to the kernel process.
#[derive(Debug, Error, Clone)]
pub enum SupervisorError {
    #[error("ssh connect failed: {0}")]
    Connect(String),
    #[error("ssh command failed (exit {code:?}): {stderr}")]
    Command { code: Option<i32>, stderr: String },
    #[error("ssh command timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("remote operation failed: {0}")]
    Remote(String),
}

/// Top-level error returned from `Proxy::think` to the HTTP layer.
#[derive(Debug, Error, Clone)]
pub enum KernelError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("setup not complete")]
    SetupNotComplete,
}

impl KernelError {
    /// HTTP status this error should surface as.
    pub fn status_code(&self) -> u16 {
        match self {
            KernelError::Route(RouteError::NoRoute { .. }) => 409,
            KernelError::Route(RouteError::ModelBusy { .. }) => 409,
            KernelError::Route(RouteError::BudgetExhausted { .. }) => 402,
            KernelError::Adapter(_) => 500,
            KernelError::Provider(e) => {
                if e.status >= 400 && e.status < 600 {
                    e.status
                } else {
                    502
                }
            }
            KernelError::Transport(_) => 502,
            KernelError::SetupNotComplete => 403,
        }
    }
}
