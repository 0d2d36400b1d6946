//! Health Checker: periodic HTTP probe against the agent's
//! health endpoint. Structured like the VRAM poller — a cancellable
//! ticker loop joined on shutdown.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::database::models::{HealthStatus, NewHealthCheckRow};
use crate::database::{DbError, DbPool};
use crate::supervisor::Supervisor;

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: String,
}

/// Callback invoked with the new consecutive-failure count; wired to
/// `Recovery::handle_failure` at boot.
pub type EscalationCallback = Arc<dyn Fn(u32) + Send + Sync>;

pub struct HealthChecker {
    url: String,
    interval: Duration,
    probe_timeout: Duration,
    http: reqwest::Client,
    pool: DbPool,
    supervisor: Arc<Supervisor>,
    consecutive_failures: Arc<AtomicU32>,
    running: Arc<AtomicBool>,
    on_failure: EscalationCallback,
}

impl HealthChecker {
    pub fn new(
        health_url: String,
        interval: Duration,
        probe_timeout: Duration,
        pool: DbPool,
        supervisor: Arc<Supervisor>,
        on_failure: EscalationCallback,
    ) -> Self {
        Self {
            url: health_url,
            interval,
            probe_timeout,
            http: reqwest::Client::new(),
            pool,
            supervisor,
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            running: Arc::new(AtomicBool::new(false)),
            on_failure,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    async fn probe(http: &reqwest::Client, url: &str, timeout: Duration) -> (HealthStatus, i64, Option<String>) {
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, http.get(url).send()).await;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        match result {
            Err(_) => (HealthStatus::Timeout, elapsed_ms, None),
            Ok(Err(e)) => (HealthStatus::Fail, elapsed_ms, Some(e.to_string())),
            Ok(Ok(response)) => {
                if response.status() != reqwest::StatusCode::OK {
                    return (HealthStatus::Fail, elapsed_ms, Some(format!("status {}", response.status())));
                }
                match response.json::<HealthBody>().await {
                    Ok(body) if body.status == "ok" => (HealthStatus::Ok, elapsed_ms, None),
                    Ok(body) => (HealthStatus::Fail, elapsed_ms, Some(format!("status field was {:?}", body.status))),
                    Err(e) => (HealthStatus::Fail, elapsed_ms, Some(format!("bad body: {e}"))),
                }
            }
        }
    }

    fn persist(pool: &DbPool, status: HealthStatus, response_time_ms: i64, details: Option<String>) -> Result<(), DbError> {
        use crate::database::schema::health_checks;
        use diesel::RunQueryDsl;

        let row = NewHealthCheckRow::new(status, response_time_ms, details.map(|d| serde_json::json!({ "error": d }).to_string()));
        let mut conn = pool.get()?;
        diesel::insert_into(health_checks::table).values(&row).execute(&mut conn)?;
        Ok(())
    }

    /// One tick, exposed separately from `spawn` so tests can drive it
    /// deterministically without a ticker.
    async fn tick(&self) {
        let (status, response_time_ms, details) = Self::probe(&self.http, &self.url, self.probe_timeout).await;

        if status == HealthStatus::Ok {
            let previous = self.consecutive_failures.swap(0, Ordering::SeqCst);
            if previous > 0 {
                tracing::info!(previous_failures = previous, "agent health recovered");
            }
            self.supervisor.set_health_result(true);
            return;
        }

        self.supervisor.set_health_result(false);
        if let Err(e) = Self::persist(&self.pool, status, response_time_ms, details) {
            tracing::warn!(error = %e, "failed to persist health check row, continuing");
        }

        let count = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;

        // The counter still increments during grace;
        // only the escalation callback is suppressed.
        if self.supervisor.in_grace_period() {
            tracing::debug!(count, "health failure suppressed during grace period");
            return;
        }
        (self.on_failure)(count);
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("health checker already running, ignoring duplicate spawn");
        }
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.interval);
            loop {
                interval.tick().await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                this.tick().await;
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{Supervisor, SupervisorConfig, SshAuth, SshConfig};
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn ok_body_parses_as_ok_status() {
        let body: HealthBody = serde_json::from_str(r#"{"status":"ok"}"#).unwrap();
        assert_eq!(body.status, "ok");
    }

    fn test_supervisor() -> Arc<Supervisor> {
        let ssh = SshConfig {
            host: "localhost".into(),
            port: 22,
            username: "agent".into(),
            auth: SshAuth::Password { password: String::new() },
            local_port: None,
        };
        Arc::new(Supervisor::new(ssh, Duration::from_secs(10), SupervisorConfig::default()))
    }

    fn checker(url: String, pool: DbPool, supervisor: Arc<Supervisor>, on_failure: EscalationCallback) -> HealthChecker {
        HealthChecker::new(url, Duration::from_secs(60), Duration::from_secs(1), pool, supervisor, on_failure)
    }

    /// After 3 consecutive probe failures outside the
    /// grace period, the escalation callback fires exactly once, carrying
    /// the running failure count.
    #[tokio::test]
    async fn three_consecutive_failures_fire_escalation_once_per_tick() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pool = crate::database::init_test_pool();
        let supervisor = test_supervisor();
        let calls = Arc::new(StdAtomicU32::new(0));
        let last_count = Arc::new(AtomicU32::new(0));
        let on_failure: EscalationCallback = {
            let calls = calls.clone();
            let last_count = last_count.clone();
            Arc::new(move |count: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                last_count.store(count, Ordering::SeqCst);
            })
        };

        let hc = checker(format!("{}/health", server.uri()), pool, supervisor, on_failure);

        hc.tick().await;
        hc.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2, "callback fires on every failing tick outside grace");
        hc.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(last_count.load(Ordering::SeqCst), 3);
        assert_eq!(hc.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn recovery_resets_consecutive_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let pool = crate::database::init_test_pool();
        let supervisor = test_supervisor();
        let on_failure: EscalationCallback = Arc::new(|_| {});
        let hc = checker(format!("{}/health", server.uri()), pool, supervisor, on_failure);

        hc.tick().await;
        assert_eq!(hc.consecutive_failures(), 1);

        server.reset().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "ok" })))
            .mount(&server)
            .await;

        hc.tick().await;
        assert_eq!(hc.consecutive_failures(), 0);
    }
}
