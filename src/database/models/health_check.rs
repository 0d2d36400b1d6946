//! `health_checks` — one persisted row per probe result.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::health_checks;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Fail,
    Timeout,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Fail => "fail",
            HealthStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = health_checks)]
pub struct HealthCheckRow {
    pub id: String,
    pub status: String,
    pub response_time_ms: i64,
    pub details_json: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = health_checks)]
pub struct NewHealthCheckRow {
    pub id: String,
    pub status: String,
    pub response_time_ms: i64,
    pub details_json: Option<String>,
    pub created_at: String,
}

impl NewHealthCheckRow {
    pub fn new(status: HealthStatus, response_time_ms: i64, details_json: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: status.as_str().to_string(),
            response_time_ms,
            details_json,
            created_at: now_rfc3339(),
        }
    }
}
