//! `growth_log` — append-only record of self-modification events (commits, rollbacks, rebirths).

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::growth_log;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = growth_log)]
pub struct GrowthLogRow {
    pub id: String,
    pub kind: String,
    pub details_json: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = growth_log)]
pub struct NewGrowthLogRow {
    pub id: String,
    pub kind: String,
    pub details_json: Option<String>,
    pub created_at: String,
}

impl NewGrowthLogRow {
    pub fn new(kind: impl Into<String>, details_json: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            details_json,
            created_at: now_rfc3339(),
        }
    }
}
