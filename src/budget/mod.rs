//! Budget Tracker: per-provider monthly spend ledger with
//! emergency reserve. Pure accounting over `budget_usage` rows — no
//! in-memory state beyond the DB pool, so the tracker is cheap to clone
//! and safe to share across the proxy's concurrent request handlers.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::database::models::{BudgetUsageRow, NewBudgetUsageRow, ProviderRow};
use crate::database::schema::{budget_usage, providers};
use crate::database::{DbError, DbPool};

#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    pub provider: String,
    pub monthly_budget: f64,
    pub emergency_reserve: f64,
    pub spent_this_month: f64,
    pub remaining: f64,
}

#[derive(Debug, Clone, Serialize, Queryable)]
pub struct ModelSpend {
    pub provider: String,
    pub model: String,
    pub spent_this_month: f64,
}

#[derive(Clone)]
pub struct BudgetTracker {
    pool: DbPool,
}

impl BudgetTracker {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn month_start_utc() -> DateTime<Utc> {
        let now = Utc::now();
        Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .expect("first of month is always a valid timestamp")
    }

    /// Sum over `budget_usage` rows for `provider` with `created_at >=` the
    /// first of the current UTC month.
    pub fn spent_this_month(&self, provider: &str) -> Result<f64, DbError> {
        let mut conn = self.pool.get()?;
        let month_start = Self::month_start_utc().to_rfc3339();
        let total: Option<f64> = budget_usage::table
            .filter(budget_usage::provider.eq(provider))
            .filter(budget_usage::created_at.ge(month_start))
            .select(diesel::dsl::sum(budget_usage::cost))
            .first(&mut conn)?;
        Ok(total.unwrap_or(0.0))
    }

    /// `intent == "repair"` bypasses the emergency reserve — the agent must
    /// always be able to ask for help fixing itself.
    pub fn has_budget(&self, provider: &str, intent: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get()?;
        let row: Option<ProviderRow> = providers::table
            .find(provider)
            .first(&mut conn)
            .optional()?;
        let Some(row) = row else {
            return Ok(false);
        };
        // budget == 0 and reserve == 0 means unlimited.
        if row.monthly_budget == 0.0 && row.emergency_reserve == 0.0 {
            return Ok(true);
        }
        let spent = self.spent_this_month(provider)?;
        let reserve = if intent == "repair" { 0.0 } else { row.emergency_reserve };
        Ok(row.monthly_budget - spent - reserve > 0.0)
    }

    pub fn log_usage(
        &self,
        provider: &str,
        model: &str,
        intent: &str,
        tokens_in: i64,
        tokens_out: i64,
        cost: f64,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get()?;
        let row = NewBudgetUsageRow::new(provider, model, intent, tokens_in, tokens_out, cost);
        diesel::insert_into(budget_usage::table)
            .values(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_all_budget_status(&self) -> Result<HashMap<String, BudgetStatus>, DbError> {
        let mut conn = self.pool.get()?;
        let all_providers: Vec<ProviderRow> = providers::table.load(&mut conn)?;
        drop(conn);

        let mut out = HashMap::with_capacity(all_providers.len());
        for p in all_providers {
            let spent = self.spent_this_month(&p.name)?;
            out.insert(
                p.name.clone(),
                BudgetStatus {
                    provider: p.name,
                    monthly_budget: p.monthly_budget,
                    emergency_reserve: p.emergency_reserve,
                    spent_this_month: spent,
                    remaining: p.monthly_budget - spent,
                },
            );
        }
        Ok(out)
    }

    /// Per-`(provider, model)` spend for the current UTC month, for
    /// `/api/budget/breakdown`.
    pub fn breakdown_by_model(&self) -> Result<Vec<ModelSpend>, DbError> {
        let mut conn = self.pool.get()?;
        let month_start = Self::month_start_utc().to_rfc3339();
        let rows: Vec<(String, String, Option<f64>)> = budget_usage::table
            .filter(budget_usage::created_at.ge(month_start))
            .group_by((budget_usage::provider, budget_usage::model))
            .select((budget_usage::provider, budget_usage::model, diesel::dsl::sum(budget_usage::cost)))
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|(provider, model, spent)| ModelSpend {
                provider,
                model,
                spent_this_month: spent.unwrap_or(0.0),
            })
            .collect())
    }

    /// Raw usage rows for a provider, newest first — used by the API's
    /// spend-history view.
    pub fn usage_history(&self, provider: &str, limit: i64) -> Result<Vec<BudgetUsageRow>, DbError> {
        let mut conn = self.pool.get()?;
        let rows = budget_usage::table
            .filter(budget_usage::provider.eq(provider))
            .order(budget_usage::created_at.desc())
            .limit(limit)
            .load(&mut conn)?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_test_pool;
    use crate::database::models::NewProviderRow;

    fn seed_provider(pool: &DbPool, name: &str, budget: f64, reserve: f64) {
        let mut conn = pool.get().unwrap();
        let row = NewProviderRow::new(name, budget, reserve);
        diesel::insert_into(providers::table)
            .values(&row)
            .execute(&mut conn)
            .unwrap();
    }

    #[test]
    fn has_budget_true_when_unspent() {
        let pool = init_test_pool();
        seed_provider(&pool, "openai", 100.0, 10.0);
        let tracker = BudgetTracker::new(pool);
        assert!(tracker.has_budget("openai", "chat").unwrap());
    }

    #[test]
    fn repair_intent_bypasses_emergency_reserve() {
        let pool = init_test_pool();
        seed_provider(&pool, "openai", 100.0, 10.0);
        let tracker = BudgetTracker::new(pool);
        tracker
            .log_usage("openai", "gpt-4", "chat", 1_000_000, 0, 95.0)
            .unwrap();
        // spent=95, budget-reserve=90: normal intent is over the reserved ceiling...
        assert!(!tracker.has_budget("openai", "chat").unwrap());
        // ...but repair ignores the reserve and still has headroom to 100.
        assert!(tracker.has_budget("openai", "repair").unwrap());
    }

    #[test]
    fn unknown_provider_has_no_budget() {
        let pool = init_test_pool();
        let tracker = BudgetTracker::new(pool);
        assert!(!tracker.has_budget("nonexistent", "chat").unwrap());
    }

    #[test]
    fn log_usage_persists_and_sums() {
        let pool = init_test_pool();
        seed_provider(&pool, "openai", 100.0, 10.0);
        let tracker = BudgetTracker::new(pool);
        tracker.log_usage("openai", "gpt-4", "chat", 1000, 500, 1.5).unwrap();
        tracker.log_usage("openai", "gpt-4", "chat", 1000, 500, 2.5).unwrap();
        assert!((tracker.spent_this_month("openai").unwrap() - 4.0).abs() < 1e-9);
    }
}
