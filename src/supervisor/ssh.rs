//! SSH client factory. Every remote command
//! is a one-shot session: connect, run, disconnect. No session reuse, no
//! persistent pipes — a dropped or half-dead connection never lingers
//! past a single `Run`.

use std::path::PathBuf;
use std::time::Duration;

use openssh::{KnownHosts, Session, SessionBuilder};
use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// Password and key material are skipped on serialize — this config is
/// sometimes echoed back to the UI in `/api/status` and must never leak
/// a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub local_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SshAuth {
    Password {
        #[serde(skip_serializing, default)]
        password: String,
    },
    PrivateKey {
        key_path: PathBuf,
        #[serde(skip_serializing, default)]
        passphrase: Option<String>,
    },
}

pub struct SshClient {
    config: SshConfig,
    connect_timeout: Duration,
}

impl SshClient {
    pub fn new(config: SshConfig, connect_timeout: Duration) -> Self {
        Self { config, connect_timeout }
    }

    async fn connect(&self) -> Result<Session, SupervisorError> {
        let destination = format!("ssh://{}@{}:{}", self.config.username, self.config.host, self.config.port);
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Accept);
        builder.connect_timeout(self.connect_timeout);
        if let SshAuth::PrivateKey { key_path, .. } = &self.config.auth {
            builder.keyfile(key_path);
        }
        builder
            .connect_mux(&destination)
            .await
            .map_err(|e| SupervisorError::Connect(e.to_string()))
    }

    /// Runs one command with a hard total timeout, tearing the session
    /// down on every path — success, failure, or timeout.
    pub async fn run(&self, cmd: &str, total_timeout: Duration) -> Result<String, SupervisorError> {
        let session = self.connect().await?;
        let result = tokio::time::timeout(total_timeout, session.raw_command(cmd).output()).await;
        let _ = session.close().await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(SupervisorError::Remote(e.to_string())),
            Err(_) => return Err(SupervisorError::Timeout(total_timeout)),
        };

        if !output.status.success() {
            return Err(SupervisorError::Command {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like `run`, but a nonzero exit is not an error — callers that poll
    /// for presence (`GallaFileExists`, `pgrep`) want the exit code itself.
    pub async fn run_allow_failure(&self, cmd: &str, total_timeout: Duration) -> Result<(bool, String), SupervisorError> {
        let session = self.connect().await?;
        let result = tokio::time::timeout(total_timeout, session.raw_command(cmd).output()).await;
        let _ = session.close().await;

        let output = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(SupervisorError::Remote(e.to_string())),
            Err(_) => return Err(SupervisorError::Timeout(total_timeout)),
        };
        Ok((output.status.success(), String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_auth_excluded_from_serialization() {
        let config = SshConfig {
            host: "example.com".into(),
            port: 22,
            username: "agent".into(),
            auth: SshAuth::Password { password: "hunter2".into() },
            local_port: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("\"type\":\"Password\""));
    }

    #[test]
    fn private_key_passphrase_excluded_from_serialization() {
        let config = SshConfig {
            host: "example.com".into(),
            port: 22,
            username: "agent".into(),
            auth: SshAuth::PrivateKey {
                key_path: PathBuf::from("/home/agent/.ssh/id_ed25519"),
                passphrase: Some("shh".into()),
            },
            local_port: None,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("shh"));
        assert!(json.contains("id_ed25519"));
    }
}
