//! Chain Tracker: process-wide cumulative cost keyed by
//! correlation ID, with TTL eviction. `chain_id` links together the
//! several `llm_calls` a single agent turn can spawn (e.g. a tool-use
//! round trip); this tracker is how the proxy enforces a per-turn cost
//! ceiling without consulting the database on every call.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SWEEP_INTERVAL: Duration = Duration::from_secs(600);
const EVICT_AFTER_IDLE: Duration = Duration::from_secs(3600);

struct ChainEntry {
    total_cost: f64,
    last_use: Instant,
}

#[derive(Clone)]
pub struct ChainTracker {
    chains: Arc<DashMap<String, ChainEntry>>,
}

impl Default for ChainTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainTracker {
    pub fn new() -> Self {
        Self {
            chains: Arc::new(DashMap::new()),
        }
    }

    /// Adds `cost` to the chain's running total and returns the new total.
    pub fn add_cost(&self, chain_id: &str, cost: f64) -> f64 {
        let mut entry = self
            .chains
            .entry(chain_id.to_string())
            .or_insert_with(|| ChainEntry {
                total_cost: 0.0,
                last_use: Instant::now(),
            });
        entry.total_cost += cost;
        entry.last_use = Instant::now();
        entry.total_cost
    }

    pub fn total_cost(&self, chain_id: &str) -> f64 {
        self.chains.get(chain_id).map(|e| e.total_cost).unwrap_or(0.0)
    }

    /// Spawns the 10-minute sweep that evicts chains idle over an hour.
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let chains = self.chains.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let now = Instant::now();
                let before = chains.len();
                chains.retain(|_, entry| now.duration_since(entry.last_use) < EVICT_AFTER_IDLE);
                let evicted = before - chains.len();
                if evicted > 0 {
                    tracing::debug!(evicted, "chain tracker sweep evicted idle chains");
                }
            }
        })
    }

    #[cfg(test)]
    fn evict_idle_for_test(&self) {
        let now = Instant::now();
        self.chains
            .retain(|_, entry| now.duration_since(entry.last_use) < EVICT_AFTER_IDLE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_cost_accumulates() {
        let tracker = ChainTracker::new();
        assert_eq!(tracker.add_cost("chain-1", 1.5), 1.5);
        assert_eq!(tracker.add_cost("chain-1", 2.5), 4.0);
    }

    #[test]
    fn separate_chains_are_independent() {
        let tracker = ChainTracker::new();
        tracker.add_cost("chain-1", 1.0);
        tracker.add_cost("chain-2", 5.0);
        assert_eq!(tracker.total_cost("chain-1"), 1.0);
        assert_eq!(tracker.total_cost("chain-2"), 5.0);
    }

    #[test]
    fn unknown_chain_has_zero_cost() {
        let tracker = ChainTracker::new();
        assert_eq!(tracker.total_cost("nonexistent"), 0.0);
    }

    #[test]
    fn fresh_chain_survives_sweep() {
        let tracker = ChainTracker::new();
        tracker.add_cost("chain-1", 1.0);
        tracker.evict_idle_for_test();
        assert_eq!(tracker.total_cost("chain-1"), 1.0);
    }
}
