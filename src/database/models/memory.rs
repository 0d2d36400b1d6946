//! `memories` — long-term recall store, optionally embedded for vector search.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::memories;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = memories)]
pub struct MemoryRow {
    pub id: String,
    pub content: String,
    #[serde(skip)]
    pub embedding: Option<Vec<u8>>,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = memories)]
pub struct NewMemoryRow {
    pub id: String,
    pub content: String,
    pub embedding: Option<Vec<u8>>,
    pub created_at: String,
}

impl NewMemoryRow {
    pub fn new(content: impl Into<String>, embedding: Option<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            embedding,
            created_at: now_rfc3339(),
        }
    }
}
