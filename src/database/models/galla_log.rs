//! `galla_log` — one row per "galla" (the agent's work cycle), keyed by cycle number.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::galla_log;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = galla_log)]
pub struct GallaLogRow {
    pub galla: i32,
    pub plan: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = galla_log)]
pub struct NewGallaLogRow {
    pub galla: i32,
    pub plan: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl NewGallaLogRow {
    pub fn new(galla: i32, plan: Option<String>) -> Self {
        let now = now_rfc3339();
        Self {
            galla,
            plan,
            summary: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
