//! Snapshot Store: git-backed versioning of the agent's code
//! directory, entirely over the Supervisor's SSH channel. Every operation
//! is a one-shot remote command — there is no local git state.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SupervisorError;
use crate::supervisor::ssh::SshClient;

pub struct SnapshotStore {
    ssh: Arc<SshClient>,
    code_dir: String,
    command_timeout: Duration,
}

impl SnapshotStore {
    pub fn new(ssh: Arc<SshClient>, code_dir: String, command_timeout: Duration) -> Self {
        Self { ssh, code_dir, command_timeout }
    }

    async fn git(&self, args: &str) -> Result<String, SupervisorError> {
        self.ssh.run(&format!("cd {} && git {args}", self.code_dir), self.command_timeout).await
    }

    pub async fn init(&self) -> Result<(), SupervisorError> {
        self.ssh
            .run(&format!("mkdir -p {} && cd {} && (git rev-parse --git-dir >/dev/null 2>&1 || git init)", self.code_dir, self.code_dir), self.command_timeout)
            .await?;
        Ok(())
    }

    pub async fn git_exists(&self) -> bool {
        self.ssh
            .run_allow_failure(&format!("cd {} && git rev-parse --git-dir", self.code_dir), self.command_timeout)
            .await
            .map(|(ok, _)| ok)
            .unwrap_or(false)
    }

    pub async fn main_py_exists(&self) -> bool {
        self.ssh
            .run_allow_failure(&format!("test -f {}/main.py", self.code_dir), self.command_timeout)
            .await
            .map(|(ok, _)| ok)
            .unwrap_or(false)
    }

    pub async fn galla_file_exists(&self) -> bool {
        self.ssh
            .run_allow_failure(&format!("test -f {}/galla.txt", self.code_dir), self.command_timeout)
            .await
            .map(|(ok, _)| ok)
            .unwrap_or(false)
    }

    pub async fn commit(&self, message: &str) -> Result<String, SupervisorError> {
        self.git("add -A").await?;
        let escaped = message.replace('\'', "'\\''");
        let _ = self.git(&format!("commit -m '{escaped}' --allow-empty")).await?;
        self.git("rev-parse HEAD").await.map(|s| s.trim().to_string())
    }

    pub async fn tag(&self, name: &str) -> Result<(), SupervisorError> {
        self.git(&format!("tag -f {name}")).await?;
        Ok(())
    }

    pub async fn current_tag(&self) -> Result<Option<String>, SupervisorError> {
        match self.ssh.run_allow_failure(&format!("cd {} && git describe --tags --exact-match", self.code_dir), self.command_timeout).await? {
            (true, out) => Ok(Some(out.trim().to_string())),
            (false, _) => Ok(None),
        }
    }

    pub async fn current_hash(&self) -> Result<String, SupervisorError> {
        self.git("rev-parse HEAD").await.map(|s| s.trim().to_string())
    }

    /// Highest `stable-v<N>` tag, if any. Tag sort is numeric on `<N>`
    /// since lexicographic sort would rank `stable-v10` before `stable-v9`.
    pub async fn last_stable_tag(&self) -> Result<Option<String>, SupervisorError> {
        let out = self.git("tag --list 'stable-v*'").await?;
        Ok(out
            .lines()
            .filter_map(|l| l.trim().strip_prefix("stable-v").map(|n| (n.parse::<u64>().ok(), l.trim().to_string())))
            .filter_map(|(n, tag)| n.map(|n| (n, tag)))
            .max_by_key(|(n, _)| *n)
            .map(|(_, tag)| tag))
    }

    pub async fn stable_tag_count(&self) -> Result<u64, SupervisorError> {
        let out = self.git("tag --list 'stable-v*'").await?;
        Ok(out.lines().filter(|l| !l.trim().is_empty()).count() as u64)
    }

    pub async fn last_modified_ago(&self) -> Result<Duration, SupervisorError> {
        let out = self
            .ssh
            .run(
                &format!("find {} -type f -printf '%T@\\n' | sort -n | tail -1", self.code_dir),
                self.command_timeout,
            )
            .await?;
        let mtime: f64 = out.trim().parse().map_err(|_| SupervisorError::Remote("no files under code directory".into()))?;
        let now = self.ssh.run("date +%s.%N", self.command_timeout).await?;
        let now: f64 = now.trim().parse().map_err(|_| SupervisorError::Remote("could not read remote clock".into()))?;
        Ok(Duration::from_secs_f64((now - mtime).max(0.0)))
    }

    pub async fn rollback(&self, target: &str) -> Result<(), SupervisorError> {
        self.git(&format!("reset --hard {target}")).await?;
        Ok(())
    }

    pub async fn wipe_brain(&self) -> Result<(), SupervisorError> {
        self.ssh
            .run(&format!("rm -rf {}/* {}/.[!.]*", self.code_dir, self.code_dir), self.command_timeout)
            .await?;
        Ok(())
    }

    /// Archives the code directory unless it exceeds `max_mb`; `None`
    /// return means the backup was skipped.
    pub async fn backup_brain(&self, max_mb: u64, backup_dir: &str) -> Result<Option<String>, SupervisorError> {
        let size_out = self.ssh.run(&format!("du -sm {} | cut -f1", self.code_dir), self.command_timeout).await?;
        let size_mb: u64 = size_out.trim().parse().unwrap_or(u64::MAX);
        if size_mb > max_mb {
            return Ok(None);
        }
        let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ");
        let dest = format!("{backup_dir}/backup-{stamp}.tar.gz");
        self.ssh
            .run(
                &format!("mkdir -p {backup_dir} && tar -czf {dest} -C {} .", self.code_dir),
                self.command_timeout,
            )
            .await?;
        Ok(Some(dest))
    }
}
