//! `library_items` / `library_comments` — the agent's self-authored doc library.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::{library_comments, library_items};
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = library_items)]
pub struct LibraryItemRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = library_items)]
pub struct NewLibraryItemRow {
    pub id: String,
    pub title: String,
    pub body: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NewLibraryItemRow {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = now_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            body: body.into(),
            status: "draft".to_string(),
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = library_comments)]
pub struct LibraryCommentRow {
    pub id: String,
    pub item_id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = library_comments)]
pub struct NewLibraryCommentRow {
    pub id: String,
    pub item_id: String,
    pub author: String,
    pub body: String,
    pub created_at: String,
}

impl NewLibraryCommentRow {
    pub fn new(item_id: impl Into<String>, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            author: author.into(),
            body: body.into(),
            created_at: now_rfc3339(),
        }
    }
}
