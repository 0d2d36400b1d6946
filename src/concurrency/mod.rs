//! Concurrency Tracker: per-`(provider, model_key)` inflight
//! counters with a per-provider-type limit. Local GPU providers get a
//! limit of 1 (only one local inference can run at a time); cloud
//! providers are unlimited.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Providers backed by a single local GPU process vs. an unlimited cloud API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Cloud,
}

#[derive(Clone)]
pub struct ConcurrencyTracker {
    inflight: Arc<DashMap<(String, String), Arc<AtomicU32>>>,
}

impl Default for ConcurrencyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(DashMap::new()),
        }
    }

    fn limit(kind: ProviderKind) -> u32 {
        match kind {
            ProviderKind::Local => 1,
            ProviderKind::Cloud => u32::MAX,
        }
    }

    fn counter(&self, provider: &str, model_key: &str) -> Arc<AtomicU32> {
        self.inflight
            .entry((provider.to_string(), model_key.to_string()))
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone()
    }

    /// `true` and reserves a slot if under the limit; `false` (no side
    /// effect) if at the limit.
    pub fn acquire(&self, provider: &str, model_key: &str, kind: ProviderKind) -> bool {
        let counter = self.counter(provider, model_key);
        let limit = Self::limit(kind);
        loop {
            let current = counter.load(Ordering::SeqCst);
            if current >= limit {
                return false;
            }
            if counter
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Idempotent against accidental double-release: never goes negative.
    pub fn release(&self, provider: &str, model_key: &str) {
        let counter = self.counter(provider, model_key);
        loop {
            let current = counter.load(Ordering::SeqCst);
            if current == 0 {
                return;
            }
            if counter
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return;
            }
        }
    }

    pub fn is_busy(&self, provider: &str, model_key: &str, kind: ProviderKind) -> bool {
        let counter = self.counter(provider, model_key);
        counter.load(Ordering::SeqCst) >= Self::limit(kind)
    }

    pub fn inflight_count(&self, provider: &str, model_key: &str) -> u32 {
        self.counter(provider, model_key).load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_provider_limit_one() {
        let tracker = ConcurrencyTracker::new();
        assert!(tracker.acquire("ollama", "llama3", ProviderKind::Local));
        assert!(!tracker.acquire("ollama", "llama3", ProviderKind::Local));
        tracker.release("ollama", "llama3");
        assert!(tracker.acquire("ollama", "llama3", ProviderKind::Local));
    }

    #[test]
    fn cloud_provider_unlimited() {
        let tracker = ConcurrencyTracker::new();
        for _ in 0..50 {
            assert!(tracker.acquire("openai", "gpt-4", ProviderKind::Cloud));
        }
    }

    #[test]
    fn release_never_goes_negative() {
        let tracker = ConcurrencyTracker::new();
        tracker.release("ollama", "llama3");
        tracker.release("ollama", "llama3");
        assert_eq!(tracker.inflight_count("ollama", "llama3"), 0);
        assert!(tracker.acquire("ollama", "llama3", ProviderKind::Local));
    }

    #[test]
    fn distinct_model_keys_independent() {
        let tracker = ConcurrencyTracker::new();
        assert!(tracker.acquire("ollama", "llama3", ProviderKind::Local));
        assert!(tracker.acquire("ollama", "mistral", ProviderKind::Local));
    }
}
