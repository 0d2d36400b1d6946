//! TOML configuration schema for the kernel process.
//!
//! This is the *bootstrap* config — where to find the database, which
//! address to bind, how verbose to log. Runtime configuration that the
//! kernel itself mutates (providers, models, routing preferences, the
//! setup-mode flag) lives in the Config Store's database tables instead —
//! see [`crate::config::store`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: String,
    /// Port the HTTP API binds to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_owned(),
            port: 7117,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file. Relative paths resolve against
    /// the kernel's data directory.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "kernel.sqlite3".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Seconds between health checks against the agent's health endpoint.
    pub interval_secs: u64,
    /// Seconds after an agent start/restart during which failures are suppressed.
    pub grace_period_secs: u64,
    /// HTTP timeout for a single health probe.
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            grace_period_secs: 30,
            probe_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SshConfigDefaults {
    /// Default SSH connect timeout for one-shot command RPCs.
    pub connect_timeout_secs: u64,
    /// Default timeout for a single remote command.
    pub command_timeout_secs: u64,
}

impl Default for SshConfigDefaults {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// SSH host the Supervisor connects to for every one-shot RPC.
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_username: String,
    /// `"password"` or `"key"` — selects which secret the Supervisor reads
    /// out of the Config Store's encrypted `secrets` table at boot.
    pub ssh_auth_method: String,
    /// Local path to the private key file, only used when `ssh_auth_method == "key"`.
    pub ssh_key_path: String,
    /// Local SSH tunnel port, if the agent box is reached through a jump host.
    pub ssh_local_port: Option<u16>,
    /// Remote directory the agent's code and git repo live under.
    pub code_dir: String,
    /// URL the seed script calls back into the kernel on (`__KERNEL_URL__`).
    pub kernel_url: String,
    /// Remote path to the agent's persistent memory/brain file.
    pub brain_path: String,
    /// Port the agent's seed process listens on.
    pub seed_port: u16,
    /// Port the agent's self-hosted app (proxied at `/jodo/*`) listens on.
    pub app_port: u16,
    /// Base URL the Health Checker and inbox writer target, normally
    /// `http://<ssh-host>:<seed_port>`.
    pub agent_base_url: String,
    /// Local path to the bootstrap script template deployed via heredoc.
    pub bootstrap_script_path: String,
    /// Remote directory `BackupBrain` archives into.
    pub backup_dir: String,
    /// `BackupBrain` skips archiving above this size.
    pub max_backup_mb: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ssh_host: "127.0.0.1".to_owned(),
            ssh_port: 22,
            ssh_username: "agent".to_owned(),
            ssh_auth_method: "password".to_owned(),
            ssh_key_path: String::new(),
            ssh_local_port: None,
            code_dir: "/opt/agent".to_owned(),
            kernel_url: "http://127.0.0.1:7117".to_owned(),
            brain_path: "/opt/agent/brain.db".to_owned(),
            seed_port: 9001,
            app_port: 9002,
            agent_base_url: "http://127.0.0.1:9001".to_owned(),
            bootstrap_script_path: "bootstrap.sh".to_owned(),
            backup_dir: "/opt/agent-backups".to_owned(),
            max_backup_mb: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"kernel=debug,info"`.
    pub filter: String,
    /// Directory for rolling daily log files.
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            log_dir: "logs".to_owned(),
        }
    }
}

/// Top-level kernel bootstrap configuration.
///
/// Loaded from `~/.kernel/config.toml`, falling back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub health: HealthConfig,
    pub ssh: SshConfigDefaults,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}
