//! Audit log: append-only JSON-lines file, external to the
//! database. Every call writes a `think_request` line and either a
//! `think_response` or `think_error` line. A write failure is logged and
//! swallowed — the audit log must never block the kernel.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;

use crate::llm::types::{Request, Response};

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AuditLine<'a> {
    ThinkRequest { request: &'a Request },
    ThinkResponse { response: &'a Response },
    ThinkError { error: String },
    AgentLog { level: String, message: String },
}

pub struct AuditLog {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl AuditLog {
    pub fn open(path: PathBuf) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    fn write_line(&self, line: &AuditLine<'_>) {
        let Ok(json) = serde_json::to_string(line) else {
            tracing::warn!(path = %self.path.display(), "failed to serialize audit line");
            return;
        };
        let Ok(mut file) = self.file.lock() else {
            tracing::warn!(path = %self.path.display(), "audit log mutex poisoned");
            return;
        };
        if let Err(e) = writeln!(file, "{json}") {
            tracing::warn!(path = %self.path.display(), error = %e, "audit write failed, continuing");
        }
    }

    pub fn log_request(&self, request: &Request) {
        self.write_line(&AuditLine::ThinkRequest { request });
    }

    pub fn log_response(&self, response: &Response) {
        self.write_line(&AuditLine::ThinkResponse { response });
    }

    pub fn log_error(&self, error: impl Into<String>) {
        self.write_line(&AuditLine::ThinkError { error: error.into() });
    }

    /// `/api/log`: the agent forwards its own log lines through the
    /// kernel so they land in the same audit trail as `think` calls.
    pub fn log_agent(&self, level: impl Into<String>, message: impl Into<String>) {
        self.write_line(&AuditLine::AgentLog { level: level.into(), message: message.into() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ToolChoice};
    use std::io::BufRead;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("kernel-audit-test-{name}-{}.jsonl", std::process::id()))
    }

    fn sample_request() -> Request {
        Request {
            intent: "chat".into(),
            system: None,
            messages: vec![Message::user("hi")],
            tools: None,
            tool_choice: ToolChoice::Auto,
            max_tokens: 100,
            max_cost: None,
            chain_id: None,
        }
    }

    #[test]
    fn request_then_response_writes_two_lines() {
        let path = tmp_path("req-resp");
        let _ = std::fs::remove_file(&path);
        let log = AuditLog::open(path.clone()).unwrap();
        log.log_request(&sample_request());
        log.log_response(&Response {
            content: "hello".into(),
            tool_calls: vec![],
            done: true,
            model_used: "m".into(),
            provider: "p".into(),
            tokens_in: 1,
            tokens_out: 1,
            cost: 0.0,
            total_chain_cost: 0.0,
            budget_remaining: 1.0,
        });

        let lines: Vec<String> = std::io::BufReader::new(std::fs::File::open(&path).unwrap())
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("think_request"));
        assert!(lines[1].contains("think_response"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn request_then_error_writes_two_lines() {
        let path = tmp_path("req-err");
        let _ = std::fs::remove_file(&path);
        let log = AuditLog::open(path.clone()).unwrap();
        log.log_request(&sample_request());
        log.log_error("transport timeout");

        let lines: Vec<String> = std::io::BufReader::new(std::fs::File::open(&path).unwrap())
            .lines()
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("think_error"));
        let _ = std::fs::remove_file(&path);
    }
}
