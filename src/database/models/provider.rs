//! Provider database model.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::database::schema::providers;
use crate::database::utils::{bool_to_int, int_to_bool, now_rfc3339};

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = providers)]
pub struct ProviderRow {
    pub name: String,
    pub enabled: i32,
    pub encrypted_api_key_ref: Option<String>,
    pub base_url: Option<String>,
    pub monthly_budget: f64,
    pub emergency_reserve: f64,
    pub total_vram_bytes: Option<i64>,
    pub created_at: String,
}

impl ProviderRow {
    pub fn is_enabled(&self) -> bool {
        int_to_bool(self.enabled)
    }
}

#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = providers)]
pub struct NewProviderRow {
    pub name: String,
    pub enabled: i32,
    pub encrypted_api_key_ref: Option<String>,
    pub base_url: Option<String>,
    pub monthly_budget: f64,
    pub emergency_reserve: f64,
    pub total_vram_bytes: Option<i64>,
    pub created_at: String,
}

impl NewProviderRow {
    pub fn new(name: impl Into<String>, monthly_budget: f64, emergency_reserve: f64) -> Self {
        Self {
            name: name.into(),
            enabled: bool_to_int(true),
            encrypted_api_key_ref: None,
            base_url: None,
            monthly_budget,
            emergency_reserve,
            total_vram_bytes: None,
            created_at: now_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_provider_defaults_enabled() {
        let p = NewProviderRow::new("ollama", 0.0, 0.0);
        assert_eq!(p.enabled, 1);
        assert_eq!(p.monthly_budget, 0.0);
    }
}
