//! `inbox_messages` — inter-component nudge/result channel (`/api/inbox`).

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::inbox_messages;
use crate::database::utils::{bool_to_int, now_rfc3339};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = inbox_messages)]
pub struct InboxMessageRow {
    pub id: String,
    pub direction: String,
    pub content: String,
    pub read: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = inbox_messages)]
pub struct NewInboxMessageRow {
    pub id: String,
    pub direction: String,
    pub content: String,
    pub read: i32,
    pub created_at: String,
}

impl NewInboxMessageRow {
    pub fn new(direction: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            direction: direction.into(),
            content: content.into(),
            read: bool_to_int(false),
            created_at: now_rfc3339(),
        }
    }
}
