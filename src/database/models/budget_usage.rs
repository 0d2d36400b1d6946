//! `budget_usage` — append-only spend ledger row.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::schema::budget_usage;
use crate::database::utils::now_rfc3339;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = budget_usage)]
pub struct BudgetUsageRow {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub intent: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = budget_usage)]
pub struct NewBudgetUsageRow {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub intent: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
    pub created_at: String,
}

impl NewBudgetUsageRow {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        intent: impl Into<String>,
        tokens_in: i64,
        tokens_out: i64,
        cost: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider: provider.into(),
            model: model.into(),
            intent: intent.into(),
            tokens_in,
            tokens_out,
            cost,
            created_at: now_rfc3339(),
        }
    }
}
