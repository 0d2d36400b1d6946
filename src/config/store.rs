//! Config Store: durable key-value for config plus encrypted
//! secrets, and structured accessors for providers, models, routing
//! preferences, and genesis. The single source of truth subsystems read
//! through — nothing else touches `system_config`/`secrets`/`providers`/
//! `provider_models`/`routing_preferences` directly.

use std::collections::{HashMap, HashSet};

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::{
    Capability, ModelRow, NewModelRow, NewProviderRow, ProviderRow,
};
use crate::database::schema::{provider_models, providers, routing_preferences, secrets, system_config};
use crate::database::utils::now_rfc3339;
use crate::database::{DbError, DbPool};
use crate::security::{self, CryptoError, RootKey};

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Diesel(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
    #[error("no secret stored under key `{0}`")]
    SecretNotFound(String),
    #[error("invalid genesis payload: {0}")]
    InvalidGenesis(String),
}

/// The kernel's one-shot "who am I, how was I born" record.
/// Opaque beyond a system prompt and a bootstrap script path — the
/// agent script itself decides what to do with it.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Genesis {
    pub system_prompt: String,
    pub bootstrap_script_path: Option<String>,
}

const GENESIS_KEY: &str = "genesis";
const SETUP_COMPLETE_KEY: &str = "setup_complete";

#[derive(Clone)]
pub struct ConfigStore {
    pool: DbPool,
    root_key: std::sync::Arc<RootKey>,
}

impl ConfigStore {
    /// `root_key` is fetched once at startup from an environment variable;
    /// a missing or malformed key is fatal (`ConfigError::BadRootKey`).
    pub fn new(pool: DbPool, root_key: RootKey) -> Self {
        Self {
            pool,
            root_key: std::sync::Arc::new(root_key),
        }
    }

    /// Clones the underlying pool handle for subsystems (the Proxy) that
    /// need their own connection for a table outside the Config Store's
    /// remit (`llm_calls`).
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    // ─── plain key/value ──────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let value: Option<String> = system_config::table
            .find(key)
            .select(system_config::value)
            .first(&mut conn)
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), ConfigStoreError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(system_config::table)
            .values((
                system_config::key.eq(key),
                system_config::value.eq(value),
                system_config::updated_at.eq(now_rfc3339()),
            ))
            .on_conflict(system_config::key)
            .do_update()
            .set((
                system_config::value.eq(value),
                system_config::updated_at.eq(now_rfc3339()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn is_setup_complete(&self) -> Result<bool, ConfigStoreError> {
        Ok(self.get(SETUP_COMPLETE_KEY)?.as_deref() == Some("true"))
    }

    pub fn mark_setup_complete(&self) -> Result<(), ConfigStoreError> {
        self.set(SETUP_COMPLETE_KEY, "true")
    }

    // ─── secrets ──────────────────────────────────────────────────────

    pub fn save_secret(&self, key: &str, plaintext: &str) -> Result<(), ConfigStoreError> {
        let ciphertext = security::encrypt(&self.root_key, plaintext)?;
        let mut conn = self.pool.get()?;
        diesel::insert_into(secrets::table)
            .values((
                secrets::key.eq(key),
                secrets::ciphertext.eq(&ciphertext),
                secrets::updated_at.eq(now_rfc3339()),
            ))
            .on_conflict(secrets::key)
            .do_update()
            .set((
                secrets::ciphertext.eq(&ciphertext),
                secrets::updated_at.eq(now_rfc3339()),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn get_secret(&self, key: &str) -> Result<String, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let ciphertext: Option<Vec<u8>> = secrets::table
            .find(key)
            .select(secrets::ciphertext)
            .first(&mut conn)
            .optional()?;
        let ciphertext = ciphertext.ok_or_else(|| ConfigStoreError::SecretNotFound(key.to_string()))?;
        Ok(security::decrypt(&self.root_key, &ciphertext)?)
    }

    // ─── providers ────────────────────────────────────────────────────

    pub fn list_providers(&self) -> Result<Vec<ProviderRow>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        Ok(providers::table.load(&mut conn)?)
    }

    pub fn get_provider(&self, name: &str) -> Result<Option<ProviderRow>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        Ok(providers::table.find(name).first(&mut conn).optional()?)
    }

    pub fn upsert_provider(&self, row: NewProviderRow) -> Result<(), ConfigStoreError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(providers::table)
            .values(&row)
            .on_conflict(providers::name)
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    // ─── models ───────────────────────────────────────────────────────

    pub fn list_models(&self, provider_name: &str) -> Result<Vec<ModelRow>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        Ok(provider_models::table
            .filter(provider_models::provider_name.eq(provider_name))
            .load(&mut conn)?)
    }

    pub fn get_model(&self, provider_name: &str, model_key: &str) -> Result<Option<ModelRow>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        Ok(provider_models::table
            .find((provider_name, model_key))
            .first(&mut conn)
            .optional()?)
    }

    /// Models declaring `capability`, across all enabled providers.
    pub fn models_with_capability(&self, capability: Capability) -> Result<Vec<ModelRow>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let all: Vec<ModelRow> = provider_models::table.load(&mut conn)?;
        Ok(all
            .into_iter()
            .filter(|m| m.is_routable() && m.capability_set().contains(&capability))
            .collect())
    }

    pub fn upsert_model(&self, row: NewModelRow) -> Result<(), ConfigStoreError> {
        let mut conn = self.pool.get()?;
        diesel::insert_into(provider_models::table)
            .values(&row)
            .on_conflict((provider_models::provider_name, provider_models::model_key))
            .do_update()
            .set(&row)
            .execute(&mut conn)?;
        Ok(())
    }

    // ─── routing preferences ──────────────────────────────────────────

    /// Ordered `model_ref` list for `intent`.
    pub fn get_routing_preferences(&self, intent: &str) -> Result<Vec<String>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let refs_json: Option<String> = routing_preferences::table
            .find(intent)
            .select(routing_preferences::refs_json)
            .first(&mut conn)
            .optional()?;
        match refs_json {
            Some(json) => Ok(serde_json::from_str(&json).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    pub fn set_routing_preferences(&self, intent: &str, refs: &[String]) -> Result<(), ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let refs_json = serde_json::to_string(refs).expect("Vec<String> always serializes");
        diesel::insert_into(routing_preferences::table)
            .values((
                routing_preferences::intent.eq(intent),
                routing_preferences::refs_json.eq(&refs_json),
            ))
            .on_conflict(routing_preferences::intent)
            .do_update()
            .set(routing_preferences::refs_json.eq(&refs_json))
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn all_routing_preferences(&self) -> Result<HashMap<String, Vec<String>>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let rows: Vec<(String, String)> = routing_preferences::table
            .select((routing_preferences::intent, routing_preferences::refs_json))
            .load(&mut conn)?;
        Ok(rows
            .into_iter()
            .map(|(intent, json)| (intent, serde_json::from_str(&json).unwrap_or_default()))
            .collect())
    }

    // ─── genesis ──────────────────────────────────────────────────────

    pub fn get_genesis(&self) -> Result<Genesis, ConfigStoreError> {
        match self.get(GENESIS_KEY)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| ConfigStoreError::InvalidGenesis(e.to_string())),
            None => Ok(Genesis::default()),
        }
    }

    pub fn set_genesis(&self, genesis: &Genesis) -> Result<(), ConfigStoreError> {
        let json = serde_json::to_string(genesis).expect("Genesis always serializes");
        self.set(GENESIS_KEY, &json)
    }

    /// Models enabled with an intent capability but no declared model yet
    /// for tools requiring `needs_tools` (used by setup diagnostics).
    pub fn capability_coverage(&self) -> Result<HashSet<Capability>, ConfigStoreError> {
        let mut conn = self.pool.get()?;
        let all: Vec<ModelRow> = provider_models::table.load(&mut conn)?;
        let mut covered = HashSet::new();
        for m in all.into_iter().filter(|m| m.is_routable()) {
            covered.extend(m.capability_set());
        }
        Ok(covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_test_pool;
    use base64::Engine;

    fn store() -> ConfigStore {
        let pool = init_test_pool();
        let raw = [0x11u8; 32];
        let key = RootKey::from_base64(&base64::engine::general_purpose::STANDARD.encode(raw)).unwrap();
        ConfigStore::new(pool, key)
    }

    #[test]
    fn get_set_roundtrip() {
        let store = store();
        assert_eq!(store.get("foo").unwrap(), None);
        store.set("foo", "bar").unwrap();
        assert_eq!(store.get("foo").unwrap(), Some("bar".to_string()));
    }

    #[test]
    fn set_is_visible_to_next_call() {
        let store = store();
        store.set("k", "v1").unwrap();
        store.set("k", "v2").unwrap();
        assert_eq!(store.get("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    fn setup_complete_flag_defaults_false() {
        let store = store();
        assert!(!store.is_setup_complete().unwrap());
        store.mark_setup_complete().unwrap();
        assert!(store.is_setup_complete().unwrap());
    }

    #[test]
    fn secret_roundtrip_through_encryption() {
        let store = store();
        store.save_secret("openai_key", "sk-abc123").unwrap();
        assert_eq!(store.get_secret("openai_key").unwrap(), "sk-abc123");
    }

    #[test]
    fn missing_secret_errors() {
        let store = store();
        assert!(matches!(
            store.get_secret("nope"),
            Err(ConfigStoreError::SecretNotFound(_))
        ));
    }

    #[test]
    fn provider_upsert_and_get() {
        let store = store();
        store.upsert_provider(NewProviderRow::new("openai", 100.0, 10.0)).unwrap();
        let row = store.get_provider("openai").unwrap().unwrap();
        assert_eq!(row.monthly_budget, 100.0);

        store.upsert_provider(NewProviderRow::new("openai", 200.0, 10.0)).unwrap();
        let row = store.get_provider("openai").unwrap().unwrap();
        assert_eq!(row.monthly_budget, 200.0);
    }

    #[test]
    fn routing_preferences_roundtrip() {
        let store = store();
        store
            .set_routing_preferences("code", &["qwen@ollama".to_string(), "openai".to_string()])
            .unwrap();
        let prefs = store.get_routing_preferences("code").unwrap();
        assert_eq!(prefs, vec!["qwen@ollama".to_string(), "openai".to_string()]);
    }

    #[test]
    fn unknown_intent_has_empty_preferences() {
        let store = store();
        assert!(store.get_routing_preferences("plan").unwrap().is_empty());
    }

    #[test]
    fn genesis_defaults_then_roundtrips() {
        let store = store();
        assert_eq!(store.get_genesis().unwrap(), Genesis::default());
        let genesis = Genesis {
            system_prompt: "You are awake.".to_string(),
            bootstrap_script_path: Some("/opt/agent/bootstrap.sh".to_string()),
        };
        store.set_genesis(&genesis).unwrap();
        assert_eq!(store.get_genesis().unwrap(), genesis);
    }
}
