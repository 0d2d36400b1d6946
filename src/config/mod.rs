//! Bootstrap TOML configuration and the database-backed Config Store.

pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{default_config_path, load_config, load_default_config, save_config};
pub use schema::AppConfig;
pub use store::{ConfigStore, ConfigStoreError, Genesis};
