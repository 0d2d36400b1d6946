//! Recovery escalation ladder. Stateless: reads the
//! passed-in failure count on every call, the counter itself lives in
//! the Health Checker.

use std::path::PathBuf;
use std::sync::Arc;

use crate::database::models::NewGrowthLogRow;
use crate::database::{DbError, DbPool};
use crate::supervisor::Supervisor;

pub struct RecoveryConfig {
    pub bootstrap_script_path: PathBuf,
    pub backup_dir: String,
    pub backup_max_mb: u64,
}

pub struct Recovery {
    supervisor: Arc<Supervisor>,
    pool: DbPool,
    config: RecoveryConfig,
}

impl Recovery {
    pub fn new(supervisor: Arc<Supervisor>, pool: DbPool, config: RecoveryConfig) -> Self {
        Self { supervisor, pool, config }
    }

    fn merged_prompt(&self) -> String {
        // Genesis system prompt merging happens at boot; Recovery redeploys
        // the same bundled script, so an empty prompt here means "reuse
        // whatever is already templated into the deployed file" — the
        // bootstrap script is not re-rendered from genesis on every restart.
        String::new()
    }

    fn log_growth(&self, kind: &str, details: Option<String>) {
        use crate::database::schema::growth_log;
        use diesel::RunQueryDsl;

        let result: Result<(), DbError> = (|| {
            let row = NewGrowthLogRow::new(kind, details);
            let mut conn = self.pool.get()?;
            diesel::insert_into(growth_log::table).values(&row).execute(&mut conn)?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, kind, "failed to persist growth_log row, continuing");
        }
    }

    /// `HandleFailure(fail_count)` — the escalation callback wired into
    /// the Health Checker.
    pub async fn handle_failure(&self, fail_count: u32) {
        self.supervisor.mark_unhealthy();

        match fail_count {
            1..=2 => {
                tracing::warn!(fail_count, "health check failing, below restart threshold");
            }
            3..=5 => {
                if fail_count == 3 {
                    self.log_growth("health_restart", Some(format!("fail_count={fail_count}")));
                }
                if let Err(e) = self.supervisor.restart_agent(&self.config.bootstrap_script_path, &self.merged_prompt()).await {
                    tracing::error!(error = %e, fail_count, "restart_agent failed");
                }
            }
            6..=8 => self.rollback_or_nuclear(fail_count).await,
            _ => self.nuclear_rebirth(fail_count).await,
        }
    }

    async fn rollback_or_nuclear(&self, fail_count: u32) {
        let snapshot = self.supervisor.snapshot();

        let preflight_ok = snapshot.git_exists().await;
        let last_stable = if preflight_ok { snapshot.last_stable_tag().await.ok().flatten() } else { None };

        let Some(stable_tag) = last_stable else {
            tracing::warn!(fail_count, "no snapshot repo or stable tag, escalating to nuclear rebirth");
            self.nuclear_rebirth(fail_count).await;
            return;
        };

        if let Err(e) = snapshot.rollback(&stable_tag).await {
            tracing::warn!(error = %e, fail_count, "rollback failed, escalating to nuclear rebirth");
            self.nuclear_rebirth(fail_count).await;
            return;
        }

        self.log_growth("rollback", Some(format!("fail_count={fail_count}, target={stable_tag}")));
        if let Err(e) = self.supervisor.restart_agent(&self.config.bootstrap_script_path, &self.merged_prompt()).await {
            tracing::error!(error = %e, fail_count, "restart_agent after rollback failed");
        }
    }

    async fn nuclear_rebirth(&self, fail_count: u32) {
        self.supervisor.mark_rebirthing();
        self.log_growth("nuclear_rebirth", Some(format!("fail_count={fail_count}")));

        if let Err(e) = self.supervisor.stop_all().await {
            tracing::warn!(error = %e, "stop_all during nuclear rebirth failed, continuing");
        }
        // stop_all resets status to its all-default state; reassert
        // rebirthing so it holds through the wipe/init window below.
        self.supervisor.mark_rebirthing();

        let snapshot = self.supervisor.snapshot();
        let _ = snapshot.backup_brain(self.config.backup_max_mb, &self.config.backup_dir).await;
        if let Err(e) = snapshot.wipe_brain().await {
            tracing::error!(error = %e, "wipe_brain failed during nuclear rebirth");
        }
        if let Err(e) = snapshot.init().await {
            tracing::error!(error = %e, "snapshot re-init failed during nuclear rebirth");
        }

        match self.supervisor.start_seed(&self.config.bootstrap_script_path, &self.merged_prompt()).await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(error = %e, "start_seed failed during nuclear rebirth, marking dead");
                self.supervisor.mark_dead();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{AgentState, SupervisorConfig, SshAuth, SshConfig};
    use std::time::Duration;

    // The restart/rollback/nuclear buckets all drive real SSH round-trips
    // and are covered end-to-end against a live sandbox in
    // tests/recovery_escalation.rs. The log-only bucket below needs no
    // network access, so it's exercised directly here.

    fn test_recovery() -> (Recovery, Arc<Supervisor>) {
        let ssh = SshConfig {
            host: "localhost".into(),
            port: 22,
            username: "agent".into(),
            auth: SshAuth::Password { password: String::new() },
            local_port: None,
        };
        let supervisor = Arc::new(Supervisor::new(ssh, Duration::from_secs(10), SupervisorConfig::default()));
        let pool = crate::database::init_test_pool();
        let recovery = Recovery::new(
            supervisor.clone(),
            pool,
            RecoveryConfig {
                bootstrap_script_path: PathBuf::from("/tmp/bootstrap.sh"),
                backup_dir: "/tmp/kernel-backups".to_string(),
                backup_max_mb: 10,
            },
        );
        (recovery, supervisor)
    }

    #[tokio::test]
    async fn low_fail_counts_mark_unhealthy_without_restarting() {
        let (recovery, supervisor) = test_recovery();

        recovery.handle_failure(1).await;
        assert_eq!(supervisor.status_snapshot().state, AgentState::Unhealthy);
        assert_eq!(supervisor.status_snapshot().restarts_today, 0);

        recovery.handle_failure(2).await;
        assert_eq!(supervisor.status_snapshot().restarts_today, 0);
    }
}
