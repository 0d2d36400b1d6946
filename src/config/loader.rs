//! TOML configuration loading, env-var overrides, and atomic saves.
//!
//! # Loading order
//! 1. Parse `~/.kernel/config.toml` (or the path in `KERNEL_CONFIG`)
//! 2. Apply `KERNEL_*` environment variable overrides
//! 3. Fall back to [`AppConfig::default()`] if the file is missing
//!
//! # Atomic save
//! Writes to `<path>.tmp` then renames to `<path>` to avoid partial
//! writes corrupting the config file.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use super::schema::AppConfig;

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::home_dir()
        .map(|h| h.join(".kernel").join("config.toml"))
        .ok_or_else(|| "could not determine home directory".to_string())
}

/// Load [`AppConfig`] from the given path, falling back to defaults if the
/// file does not exist, then applying environment variable overrides.
pub fn load_config(path: &Path) -> Result<AppConfig, String> {
    let mut config = match fs::read_to_string(path) {
        Ok(content) => toml::from_str::<AppConfig>(&content)
            .map_err(|e| format!("failed to parse config at {path:?}: {e}"))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
        Err(e) => return Err(format!("failed to read config at {path:?}: {e}")),
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load config from the default path (or `KERNEL_CONFIG`).
pub fn load_default_config() -> AppConfig {
    let path = env::var("KERNEL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_config_path().unwrap_or_else(|_| PathBuf::from("config.toml")));

    load_config(&path).unwrap_or_default()
}

/// Apply `KERNEL_*` environment variable overrides to `config`.
///
/// Supported overrides:
/// - `KERNEL_BIND_ADDR`            → `server.bind_addr`
/// - `KERNEL_PORT`                 → `server.port`
/// - `KERNEL_DB_PATH`              → `database.path`
/// - `KERNEL_HEALTH_INTERVAL_SECS` → `health.interval_secs`
/// - `KERNEL_LOG_FILTER`           → `logging.filter`
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(v) = env::var("KERNEL_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Ok(v) = env::var("KERNEL_PORT") {
        if let Ok(port) = v.parse::<u16>() {
            config.server.port = port;
        }
    }
    if let Ok(v) = env::var("KERNEL_DB_PATH") {
        config.database.path = v;
    }
    if let Ok(v) = env::var("KERNEL_HEALTH_INTERVAL_SECS") {
        if let Ok(secs) = v.parse::<u64>() {
            config.health.interval_secs = secs;
        }
    }
    if let Ok(v) = env::var("KERNEL_LOG_FILTER") {
        config.logging.filter = v;
    }
}

/// Atomically save `config` to `path`.
pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), String> {
    let content = toml::to_string_pretty(config).map_err(|e| format!("failed to serialise config: {e}"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("failed to create config dir: {e}"))?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &content).map_err(|e| format!("failed to write temp config: {e}"))?;
    fs::rename(&tmp_path, path).map_err(|e| format!("failed to replace config file: {e}"))?;

    Ok(())
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_partial_config_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[server]
port = 9000
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_addr, "127.0.0.1");
        assert_eq!(config.health.interval_secs, 10);
    }

    #[test]
    fn save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut original = AppConfig::default();
        original.server.port = 8888;
        original.database.path = "custom.sqlite3".to_owned();

        save_config(&path, &original).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn env_override_port() {
        let key = "KERNEL_PORT";
        // SAFETY: single-threaded test context; no other threads read this var.
        unsafe { env::set_var(key, "1234") };
        let config = load_default_config();
        // SAFETY: same as set_var above.
        unsafe { env::remove_var(key) };
        assert_eq!(config.server.port, 1234);
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "this is not valid toml!!!");
        assert!(load_config(&path).is_err());
    }
}
