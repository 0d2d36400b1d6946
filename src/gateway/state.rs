//! Shared state handed to every gateway route: the full set of
//! subsystems the kernel's HTTP surface fans out to.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use crate::config::ConfigStore;
use crate::database::DbPool;
use crate::event_bus::EventBus;
use crate::llm::Proxy;
use crate::supervisor::Supervisor;

#[derive(Clone)]
pub struct GatewayState {
    pub proxy: Arc<Proxy>,
    pub supervisor: Arc<Supervisor>,
    pub config: Arc<ConfigStore>,
    pub bus: Arc<dyn EventBus>,
    pub pool: DbPool,
    pub bootstrap_script_path: PathBuf,
    /// Shared client for the `/jodo/*` reverse proxy — kept off the
    /// Supervisor, which only ever makes short SSH-adjacent calls.
    pub http_client: reqwest::Client,
}

/// Uniform JSON error envelope for the gateway. `setup_not_complete` is
/// the one literal shape with a fixed name; everything else is a
/// `{error}` body with the matching status code.
pub struct ApiError {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl ApiError {
    pub fn setup_not_complete() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: json!({ "error": "setup_not_complete" }),
        }
    }

    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<crate::error::KernelError> for ApiError {
    fn from(e: crate::error::KernelError) -> Self {
        let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, e.to_string())
    }
}

impl From<crate::error::SupervisorError> for ApiError {
    fn from(e: crate::error::SupervisorError) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, e.to_string())
    }
}

impl From<crate::database::DbError> for ApiError {
    fn from(e: crate::database::DbError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

/// Operational-endpoint gate: everything except setup/config
/// endpoints returns `setup_not_complete` while the flag is off.
pub fn require_setup_complete(config: &ConfigStore) -> Result<(), ApiError> {
    match config.is_setup_complete() {
        Ok(true) => Ok(()),
        Ok(false) => Err(ApiError::setup_not_complete()),
        Err(e) => Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
