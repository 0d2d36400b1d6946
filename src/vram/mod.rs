//! VRAM Tracker: background poller of the local runtime's
//! "loaded models" endpoint (e.g. Ollama's `/api/ps`). Lock-free snapshot
//! swap via `arc_swap` so the poller and request-path readers never block
//! each other.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Deserialize)]
pub struct LoadedModel {
    pub name: String,
    pub size_vram: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct VramSnapshot {
    pub loaded: Vec<LoadedModel>,
    pub used_vram: i64,
}

impl VramSnapshot {
    fn from_loaded(loaded: Vec<LoadedModel>) -> Self {
        let used_vram = loaded.iter().map(|m| m.size_vram).sum();
        Self { loaded, used_vram }
    }
}

#[async_trait::async_trait]
pub trait PsSource: Send + Sync {
    async fn list_loaded(&self) -> Result<Vec<LoadedModel>, crate::error::TransportError>;
}

/// Enabled/disabled is the "true if VRAM tracking disabled" escape
/// hatch for deployments with no local runtime at all.
#[derive(Clone)]
pub struct VramTracker {
    enabled: bool,
    total_vram_bytes: Option<i64>,
    snapshot: Arc<ArcSwap<VramSnapshot>>,
    inflight: Arc<DashMap<String, ()>>,
    running: Arc<AtomicBool>,
}

impl VramTracker {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            total_vram_bytes: None,
            snapshot: Arc::new(ArcSwap::from_pointee(VramSnapshot::default())),
            inflight: Arc::new(DashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn enabled(total_vram_bytes: i64) -> Self {
        Self {
            enabled: true,
            total_vram_bytes: Some(total_vram_bytes),
            snapshot: Arc::new(ArcSwap::from_pointee(VramSnapshot::default())),
            inflight: Arc::new(DashMap::new()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Spawns the 5-second poll loop. On source error, the previous
    /// snapshot is retained rather than treated as "nothing loaded".
    pub fn spawn_poller(&self, source: Arc<dyn PsSource>) -> tokio::task::JoinHandle<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("vram poller already running, ignoring duplicate spawn");
        }
        let snapshot = self.snapshot.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                match source.list_loaded().await {
                    Ok(loaded) => snapshot.store(Arc::new(VramSnapshot::from_loaded(loaded))),
                    Err(e) => tracing::warn!(error = %e, "vram poll failed, retaining last snapshot"),
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_loaded(&self, model_name: &str) -> bool {
        let snap = self.snapshot.load();
        let now = Utc::now();
        snap.loaded
            .iter()
            .any(|m| m.name == model_name && now < m.expires_at)
    }

    /// `estimate` is `None` when the caller has no size data for the model.
    pub fn can_fit(&self, model_name: &str, estimate: Option<i64>) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(estimate) = estimate else {
            return true;
        };
        if self.is_loaded(model_name) {
            return true;
        }
        let Some(total) = self.total_vram_bytes else {
            return true;
        };
        let snap = self.snapshot.load();
        (total - snap.used_vram) >= estimate
    }

    /// Per-model inflight slot, limit 1. Returns `false` if already held.
    pub fn acquire(&self, model_name: &str) -> bool {
        self.inflight.insert(model_name.to_string(), ()).is_none()
    }

    pub fn release(&self, model_name: &str) {
        self.inflight.remove(model_name);
    }

    pub fn snapshot(&self) -> Arc<VramSnapshot> {
        self.snapshot.load_full()
    }

    #[cfg(test)]
    pub(crate) fn load_for_test(&self, model_name: &str, size_vram: i64) {
        self.snapshot.store(Arc::new(VramSnapshot::from_loaded(vec![LoadedModel {
            name: model_name.to_string(),
            size_vram,
            expires_at: Utc::now() + chrono::Duration::seconds(300),
        }])));
    }
}

/// Polls Ollama's `/api/ps` for the set of currently loaded models — the
/// concrete `PsSource` wired in at boot for a local runtime provider.
pub struct OllamaPsSource {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaPsSource {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[derive(Debug, Deserialize)]
struct OllamaPsResponse {
    models: Vec<LoadedModel>,
}

#[async_trait::async_trait]
impl PsSource for OllamaPsSource {
    async fn list_loaded(&self) -> Result<Vec<LoadedModel>, crate::error::TransportError> {
        let url = format!("{}/api/ps", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| crate::error::TransportError(e.to_string()))?
            .json::<OllamaPsResponse>()
            .await
            .map_err(|e| crate::error::TransportError(e.to_string()))?;
        Ok(resp.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str, size: i64, expires_in_secs: i64) -> LoadedModel {
        LoadedModel {
            name: name.to_string(),
            size_vram: size,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn disabled_tracker_always_fits() {
        let tracker = VramTracker::disabled();
        assert!(tracker.can_fit("llama3", Some(8_000_000_000)));
        assert!(!tracker.is_loaded("llama3"));
    }

    #[test]
    fn unknown_estimate_always_fits() {
        let tracker = VramTracker::enabled(8_000_000_000);
        assert!(tracker.can_fit("llama3", None));
    }

    #[test]
    fn already_loaded_always_fits() {
        let tracker = VramTracker::enabled(8_000_000_000);
        tracker
            .snapshot
            .store(Arc::new(VramSnapshot::from_loaded(vec![model("llama3", 7_000_000_000, 300)])));
        assert!(tracker.can_fit("llama3", Some(999_000_000_000)));
    }

    #[test]
    fn fits_only_when_headroom_available() {
        let tracker = VramTracker::enabled(8_000_000_000);
        tracker
            .snapshot
            .store(Arc::new(VramSnapshot::from_loaded(vec![model("mistral", 6_000_000_000, 300)])));
        assert!(tracker.can_fit("llama3", Some(1_000_000_000)));
        assert!(!tracker.can_fit("llama3", Some(5_000_000_000)));
    }

    #[test]
    fn expired_entry_is_not_loaded() {
        let tracker = VramTracker::enabled(8_000_000_000);
        tracker
            .snapshot
            .store(Arc::new(VramSnapshot::from_loaded(vec![model("llama3", 1_000_000_000, -10)])));
        assert!(!tracker.is_loaded("llama3"));
    }

    #[test]
    fn acquire_release_single_slot() {
        let tracker = VramTracker::enabled(8_000_000_000);
        assert!(tracker.acquire("llama3"));
        assert!(!tracker.acquire("llama3"));
        tracker.release("llama3");
        assert!(tracker.acquire("llama3"));
    }
}
