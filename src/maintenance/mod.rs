//! Maintenance loop: periodic auto-tagging and stale-row pruning.
//! Ticks every 5 minutes; structured like the other long-lived pollers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};

use crate::database::{DbError, DbPool};
use crate::supervisor::{AgentState, Supervisor};

const TICK_INTERVAL: Duration = Duration::from_secs(300);
const AUTO_TAG_QUIET_PERIOD: Duration = Duration::from_secs(300);

/// Retention for `health_checks`. `llm_calls` is deliberately left
/// unbounded — the UI reads
/// the full call history, and it is already keyed off `chain_id`/month
/// for the budget views rather than scanned in bulk). Seven days covers
/// the window an operator would plausibly want to eyeball after an
/// incident without the table growing unbounded on a long-lived kernel.
const HEALTH_CHECK_RETENTION: ChronoDuration = ChronoDuration::days(7);

pub struct Maintenance {
    supervisor: Arc<Supervisor>,
    pool: DbPool,
    running: Arc<AtomicBool>,
}

impl Maintenance {
    pub fn new(supervisor: Arc<Supervisor>, pool: DbPool) -> Self {
        Self {
            supervisor,
            pool,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    async fn auto_tag(&self) {
        let status = self.supervisor.status_snapshot();
        if status.state != AgentState::Running || !status.health_ok {
            return;
        }

        let snapshot = self.supervisor.snapshot();
        let last_modified_ago = match snapshot.last_modified_ago().await {
            Ok(ago) => ago,
            Err(e) => {
                tracing::debug!(error = %e, "skipping auto-tag, could not read last-modified");
                return;
            }
        };
        if last_modified_ago < AUTO_TAG_QUIET_PERIOD {
            return;
        }

        match snapshot.current_tag().await {
            Ok(Some(tag)) if tag.starts_with("stable-") => return,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "skipping auto-tag, could not read current tag");
                return;
            }
        }

        let count = match snapshot.stable_tag_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(error = %e, "skipping auto-tag, could not count stable tags");
                return;
            }
        };

        let new_tag = format!("stable-v{}", count + 1);
        if let Err(e) = snapshot.tag(&new_tag).await {
            tracing::warn!(error = %e, tag = %new_tag, "auto-tag failed");
        } else {
            tracing::info!(tag = %new_tag, "auto-tagged stable snapshot");
        }
    }

    fn prune_health_checks(pool: &DbPool) -> Result<usize, DbError> {
        use crate::database::schema::health_checks::dsl::*;
        use diesel::prelude::*;

        let cutoff = (Utc::now() - HEALTH_CHECK_RETENTION).to_rfc3339();
        let mut conn = pool.get()?;
        let deleted = diesel::delete(health_checks.filter(created_at.lt(cutoff))).execute(&mut conn)?;
        Ok(deleted)
    }

    async fn tick(&self) {
        self.auto_tag().await;

        let pool = self.pool.clone();
        match tokio::task::spawn_blocking(move || Self::prune_health_checks(&pool)).await {
            Ok(Ok(deleted)) if deleted > 0 => tracing::debug!(deleted, "pruned old health_checks rows"),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "health_checks pruning failed, continuing"),
            Err(e) => tracing::warn!(error = %e, "health_checks pruning task panicked, continuing"),
        }
    }

    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("maintenance loop already running, ignoring duplicate spawn");
        }
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
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
