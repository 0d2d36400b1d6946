//! `chat_messages` — the agent/world chat log surfaced at `/api/chat`.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::chat_messages;
use crate::database::utils::{bool_to_int, now_rfc3339};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = chat_messages)]
pub struct ChatMessageRow {
    pub id: String,
    pub source: String,
    pub galla: Option<i32>,
    pub role: String,
    pub content: String,
    pub read: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = chat_messages)]
pub struct NewChatMessageRow {
    pub id: String,
    pub source: String,
    pub galla: Option<i32>,
    pub role: String,
    pub content: String,
    pub read: i32,
    pub created_at: String,
}

impl NewChatMessageRow {
    pub fn new(source: impl Into<String>, galla: Option<i32>, role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            galla,
            role: role.into(),
            content: content.into(),
            read: bool_to_int(false),
            created_at: now_rfc3339(),
        }
    }
}
