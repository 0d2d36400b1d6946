//! Supervisor: owns the SSH client factory and the single
//! `AgentStatus` aggregate. Every remote operation is a one-shot RPC;
//! the status mutex is never exposed outside this module.

pub mod process;
pub mod snapshot;
pub mod ssh;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SupervisorError;
use snapshot::SnapshotStore;
use ssh::SshClient;

pub use ssh::{SshAuth, SshConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Dead,
    Starting,
    Running,
    Unhealthy,
    Rebirthing,
}

/// `galla`/`phase` come from heartbeats and are opaque
/// to the core.
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub state: AgentState,
    pub pid: Option<u32>,
    pub galla: i64,
    pub phase: String,
    pub uptime_start: Option<DateTime<Utc>>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub health_ok: bool,
    pub restarts_today: i64,
    pub grace_until: Option<DateTime<Utc>>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self {
            state: AgentState::Dead,
            pid: None,
            galla: 0,
            phase: String::new(),
            uptime_start: None,
            last_health_check: None,
            health_ok: false,
            restarts_today: 0,
            grace_until: None,
        }
    }
}

pub struct SupervisorConfig {
    pub code_dir: String,
    pub kernel_url: String,
    pub brain_path: String,
    pub seed_port: u16,
    pub app_port: u16,
    /// Base URL the agent's bootstrap script listens on; the Health
    /// Checker and `WriteInbox` both derive their target from this.
    pub agent_base_url: String,
    pub command_timeout: Duration,
    pub grace_period: Duration,
}

const GRACE_PERIOD_DEFAULT: Duration = Duration::from_secs(30);

pub struct Supervisor {
    ssh: Arc<SshClient>,
    config: SupervisorConfig,
    status: Mutex<AgentStatus>,
    /// Filename of the last-deployed bootstrap script, for `StopSeed`'s
    /// pattern match. Not part of `AgentStatus` — purely an
    /// implementation detail of the kill commands.
    script_name: Mutex<String>,
    snapshot: SnapshotStore,
    http: reqwest::Client,
}

impl Supervisor {
    pub fn new(ssh_config: SshConfig, connect_timeout: Duration, config: SupervisorConfig) -> Self {
        let ssh = Arc::new(SshClient::new(ssh_config, connect_timeout));
        let snapshot = SnapshotStore::new(ssh.clone(), config.code_dir.clone(), config.command_timeout);
        Self {
            ssh,
            config,
            status: Mutex::new(AgentStatus::default()),
            script_name: Mutex::new("bootstrap".to_string()),
            snapshot,
            http: reqwest::Client::new(),
        }
    }

    pub fn snapshot(&self) -> &SnapshotStore {
        &self.snapshot
    }

    /// Never hand out the mutex itself — only a cloned read.
    pub fn status_snapshot(&self) -> AgentStatus {
        self.status.lock().expect("agent status mutex poisoned").clone()
    }

    fn with_status<R>(&self, f: impl FnOnce(&mut AgentStatus) -> R) -> R {
        let mut status = self.status.lock().expect("agent status mutex poisoned");
        f(&mut status)
    }

    /// One command, 10s total timeout.
    pub async fn run(&self, cmd: &str) -> Result<String, SupervisorError> {
        self.ssh.run(cmd, self.config.command_timeout).await
    }

    fn bootstrap_script_name(local_path: &Path) -> String {
        process::script_file_name(local_path)
    }

    /// Reads the local bootstrap script, substitutes placeholders, writes
    /// it to the remote code directory via heredoc, and launches it.
    pub async fn start_seed(&self, local_path: &Path, merged_prompt: &str) -> Result<(), SupervisorError> {
        self.with_status(|s| {
            s.state = AgentState::Rebirthing;
            s.pid = None;
        });

        let template = tokio::fs::read_to_string(local_path)
            .await
            .map_err(|e| SupervisorError::Remote(format!("reading local bootstrap script: {e}")))?;

        let ctx = process::BootstrapContext {
            kernel_url: &self.config.kernel_url,
            brain_path: &self.config.brain_path,
            seed_port: self.config.seed_port,
            app_port: self.config.app_port,
            merged_prompt,
        };
        let rendered = process::render_bootstrap_script(&template, &ctx);

        let script_name = Self::bootstrap_script_name(local_path);
        let remote_path = format!("{}/{script_name}", self.config.code_dir);
        let launch_cmd = format!("./{script_name}");
        let cmd = process::deploy_and_launch_command(&remote_path, &rendered, &launch_cmd);

        let pid_out = self.ssh.run(&cmd, self.config.command_timeout).await?;
        let pid = process::parse_pid(&pid_out);
        *self.script_name.lock().expect("script name mutex poisoned") = script_name;

        self.with_status(|s| {
            s.pid = pid;
            s.state = AgentState::Starting;
            s.uptime_start = Some(Utc::now());
            s.grace_until = Some(Utc::now() + chrono::Duration::from_std(self.config.grace_period).unwrap_or_else(|_| chrono::Duration::seconds(30)));
        });
        Ok(())
    }

    /// Idempotent: killing an already-dead PID or a no-match pattern is
    /// not an error.
    pub async fn stop_seed(&self) -> Result<(), SupervisorError> {
        let pid = self.with_status(|s| s.pid);
        let script_name = self.script_name.lock().expect("script name mutex poisoned").clone();
        let cmd = process::stop_seed_command(pid, &script_name);
        self.ssh.run_allow_failure(&cmd, self.config.command_timeout).await?;
        Ok(())
    }

    pub async fn stop_all(&self) -> Result<(), SupervisorError> {
        let pid = self.with_status(|s| s.pid);
        let script_name = self.script_name.lock().expect("script name mutex poisoned").clone();
        let cmd = process::stop_all_command(pid, &script_name, &self.config.code_dir);
        self.ssh.run_allow_failure(&cmd, self.config.command_timeout).await?;
        self.with_status(|s| {
            *s = AgentStatus::default();
        });
        Ok(())
    }

    pub async fn restart_agent(&self, local_path: &Path, merged_prompt: &str) -> Result<(), SupervisorError> {
        self.stop_seed().await?;
        let result = self.start_seed(local_path, merged_prompt).await;
        self.with_status(|s| s.restarts_today += 1);
        result
    }

    /// `StopAll` + `StartSeed` — the deeper of
    /// the two restart flavors used by the `≥9` nuclear-rebirth bucket.
    pub async fn nuclear_restart(&self, local_path: &Path, merged_prompt: &str) -> Result<(), SupervisorError> {
        self.stop_all().await?;
        let result = self.start_seed(local_path, merged_prompt).await;
        self.with_status(|s| s.restarts_today += 1);
        result
    }

    pub fn get_pid(&self) -> Option<u32> {
        self.with_status(|s| s.pid)
    }

    pub fn uptime_seconds(&self) -> Option<i64> {
        self.with_status(|s| s.uptime_start.map(|t| (Utc::now() - t).num_seconds()))
    }

    pub fn in_grace_period(&self) -> bool {
        self.with_status(|s| s.grace_until.is_some_and(|until| Utc::now() < until))
    }

    /// Called from the API when the agent posts a heartbeat. Any
    /// heartbeat while `rebirthing` flips status to `running` — the agent
    /// is clearly alive, even if this can race an in-flight restart.
    pub fn set_heartbeat(&self, galla: i64, phase: impl Into<String>) {
        self.with_status(|s| {
            s.galla = galla;
            s.phase = phase.into();
            if matches!(s.state, AgentState::Rebirthing) {
                s.state = AgentState::Running;
            }
        });
    }

    /// On the first ok-with-unknown-PID transition, launches an async PID
    /// discovery so the Supervisor learns the PID the agent's own
    /// supervisor established. Does not itself drive `unhealthy`/`running`
    /// transitions beyond `starting`/`unhealthy` → `running` on success —
    /// those at and beyond `unhealthy` belong to Recovery.
    pub fn set_health_result(self: &Arc<Self>, ok: bool) {
        let needs_pid_discovery = self.with_status(|s| {
            s.health_ok = ok;
            s.last_health_check = Some(Utc::now());
            if ok {
                if matches!(s.state, AgentState::Starting | AgentState::Unhealthy) {
                    s.state = AgentState::Running;
                }
                ok && s.pid.is_none()
            } else {
                false
            }
        });

        if needs_pid_discovery {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                let script_name = this.script_name.lock().expect("script name mutex poisoned").clone();
                let cmd = process::pgrep_command(&script_name);
                match this.ssh.run(&cmd, this.config.command_timeout).await {
                    Ok(out) => {
                        if let Some(pid) = process::parse_pid(&out) {
                            this.with_status(|s| s.pid = Some(pid));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "pid discovery failed"),
                }
            });
        }
    }

    /// Driven by Recovery's escalation ladder (restart and rollback buckets), never
    /// by a single failed health check on its own.
    pub fn mark_unhealthy(&self) {
        self.with_status(|s| {
            if !matches!(s.state, AgentState::Dead) {
                s.state = AgentState::Unhealthy;
            }
        });
    }

    pub fn mark_dead(&self) {
        self.with_status(|s| s.state = AgentState::Dead);
    }

    /// Driven by the nuclear-rebirth recovery path, which tears the agent
    /// down to nothing and rebuilds it from scratch. Set before the
    /// destructive steps start and held across `stop_all`'s own status
    /// reset so a status poll never observes `dead` mid-rebirth.
    pub fn mark_rebirthing(&self) {
        self.with_status(|s| s.state = AgentState::Rebirthing);
    }

    /// Posts to the agent's inbox HTTP endpoint — the "nudge" channel
    /// used by maintenance.
    pub async fn write_inbox(&self, msg: &str) -> Result<(), SupervisorError> {
        let url = format!("{}/inbox", self.config.agent_base_url);
        self.http
            .post(&url)
            .json(&serde_json::json!({ "message": msg }))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| SupervisorError::Remote(e.to_string()))?
            .error_for_status()
            .map_err(|e| SupervisorError::Remote(e.to_string()))?;
        Ok(())
    }

    pub fn agent_base_url(&self) -> &str {
        &self.config.agent_base_url
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            code_dir: "/opt/agent".to_string(),
            kernel_url: "http://127.0.0.1:7117".to_string(),
            brain_path: "/opt/agent/brain.db".to_string(),
            seed_port: 9001,
            app_port: 9002,
            agent_base_url: "http://127.0.0.1:9001".to_string(),
            command_timeout: Duration::from_secs(10),
            grace_period: GRACE_PERIOD_DEFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SshConfig {
        SshConfig {
            host: "localhost".into(),
            port: 22,
            username: "agent".into(),
            auth: SshAuth::Password { password: String::new() },
            local_port: None,
        }
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(test_config(), Duration::from_secs(10), SupervisorConfig::default())
    }

    #[test]
    fn fresh_status_is_dead_with_no_pid() {
        let sup = supervisor();
        let status = sup.status_snapshot();
        assert_eq!(status.state, AgentState::Dead);
        assert_eq!(status.pid, None);
    }

    #[test]
    fn heartbeat_during_rebirthing_flips_to_running() {
        let sup = supervisor();
        sup.with_status(|s| s.state = AgentState::Rebirthing);
        sup.set_heartbeat(42, "thinking");
        let status = sup.status_snapshot();
        assert_eq!(status.state, AgentState::Running);
        assert_eq!(status.galla, 42);
        assert_eq!(status.phase, "thinking");
    }

    #[test]
    fn mark_unhealthy_does_not_touch_dead() {
        let sup = supervisor();
        sup.mark_unhealthy();
        assert_eq!(sup.status_snapshot().state, AgentState::Dead);

        sup.with_status(|s| s.state = AgentState::Running);
        sup.mark_unhealthy();
        assert_eq!(sup.status_snapshot().state, AgentState::Unhealthy);
    }

    #[test]
    fn in_grace_period_reflects_grace_until() {
        let sup = supervisor();
        assert!(!sup.in_grace_period());
        sup.with_status(|s| s.grace_until = Some(Utc::now() + chrono::Duration::seconds(30)));
        assert!(sup.in_grace_period());
        sup.with_status(|s| s.grace_until = Some(Utc::now() - chrono::Duration::seconds(1)));
        assert!(!sup.in_grace_period());
    }
}
