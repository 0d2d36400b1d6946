//! Integration tests for the Recovery escalation ladder
//! against a real SSH-accessible sandbox.
//!
//! Run with: cargo test --test recovery_escalation -- --ignored
//!
//! Prerequisites:
//! 1. An SSH-reachable host with a throwaway code directory and a
//!    `git`-initialized snapshot repo the test is allowed to wipe.
//! 2. Export the sandbox coordinates:
//!    ```bash
//!    export KERNEL_TEST_SSH_HOST=127.0.0.1
//!    export KERNEL_TEST_SSH_PORT=2222
//!    export KERNEL_TEST_SSH_USER=agent
//!    export KERNEL_TEST_SSH_PASSWORD=agent
//!    export KERNEL_TEST_CODE_DIR=/tmp/kernel-sandbox
//!    ```
//! 3. Run tests: `cargo test --test recovery_escalation -- --ignored --nocapture`
//!
//! The non-I/O part of the escalation ladder (bucket boundaries) is
//! covered by a plain unit test inside `recovery::tests`; everything here
//! needs a live remote shell and is skipped by default.

#[cfg(test)]
mod tests {
    use std::env;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use kernel::database;
    use kernel::recovery::{Recovery, RecoveryConfig};
    use kernel::supervisor::{Supervisor, SupervisorConfig, SshAuth, SshConfig};

    fn sandbox_ssh_config() -> SshConfig {
        SshConfig {
            host: env::var("KERNEL_TEST_SSH_HOST").expect("KERNEL_TEST_SSH_HOST not set"),
            port: env::var("KERNEL_TEST_SSH_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(22),
            username: env::var("KERNEL_TEST_SSH_USER").expect("KERNEL_TEST_SSH_USER not set"),
            auth: SshAuth::Password {
                password: env::var("KERNEL_TEST_SSH_PASSWORD").expect("KERNEL_TEST_SSH_PASSWORD not set"),
            },
            local_port: None,
        }
    }

    fn sandbox_supervisor() -> Arc<Supervisor> {
        let code_dir = env::var("KERNEL_TEST_CODE_DIR").expect("KERNEL_TEST_CODE_DIR not set");
        let config = SupervisorConfig {
            code_dir,
            ..SupervisorConfig::default()
        };
        Arc::new(Supervisor::new(sandbox_ssh_config(), Duration::from_secs(10), config))
    }

    fn recovery_for(supervisor: Arc<Supervisor>) -> Recovery {
        let db_path = std::env::temp_dir().join(format!("kernel-recovery-test-{}.sqlite", std::process::id()));
        let pool = database::init(&db_path).expect("open test database");
        Recovery::new(
            supervisor,
            pool,
            RecoveryConfig {
                bootstrap_script_path: PathBuf::from("/tmp/bootstrap.sh"),
                backup_dir: "/tmp/kernel-backups".to_string(),
                backup_max_mb: 10,
            },
        )
    }

    /// fail_count in 1..=2 only logs — no SSH traffic at all, but still
    /// worth pinning end-to-end since a regression here would start
    /// restarting the agent on every transient blip.
    #[tokio::test]
    #[ignore = "requires a live SSH sandbox (see module docs)"]
    async fn low_fail_count_does_not_touch_the_remote() {
        let supervisor = sandbox_supervisor();
        let recovery = recovery_for(supervisor.clone());

        recovery.handle_failure(1).await;
        recovery.handle_failure(2).await;

        assert_eq!(supervisor.get_pid(), None, "no restart should have been attempted");
    }

    /// fail_count 6-8 with no snapshot repo present on the sandbox must
    /// escalate straight to nuclear rebirth rather than attempting a
    /// rollback against a tag that doesn't exist.
    #[tokio::test]
    #[ignore = "requires a live SSH sandbox with no git repo under KERNEL_TEST_CODE_DIR"]
    async fn missing_snapshot_repo_escalates_to_nuclear_rebirth() {
        let supervisor = sandbox_supervisor();
        let recovery = recovery_for(supervisor.clone());

        recovery.handle_failure(6).await;

        let snapshot = supervisor.snapshot();
        assert!(snapshot.git_exists().await, "nuclear rebirth should have re-initialized the snapshot repo");
    }
}
