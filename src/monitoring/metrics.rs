// Copyright (c) 2026 Cachering
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Prometheus metrics describing the pool manager's live routing state.

use std::sync::atomic::{AtomicU64, Ordering};

use prometheus::{IntCounter, IntGauge, Registry};
use thiserror::Error;

/// Errors registering this module's metrics with a [`Registry`].
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Prometheus rejected a metric registration, usually a name collision.
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
}

/// Pool-manager metrics: node counts by liveness, and a running swap counter.
///
/// `swap_count` is also tracked locally in an `AtomicU64` so tests and
/// callers can read it back without going through the Prometheus text
/// exposition format.
pub struct PoolMetrics {
    nodes_alive: IntGauge,
    nodes_dead: IntGauge,
    config_swaps_total: IntCounter,
    resurrection_passes_total: IntCounter,
    swap_count: AtomicU64,
}

impl PoolMetrics {
    /// Construct metrics and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, MetricsError> {
        let nodes_alive = IntGauge::new("cachering_nodes_alive", "Nodes currently believed reachable")?;
        let nodes_dead = IntGauge::new("cachering_nodes_dead", "Nodes currently believed unreachable")?;
        let config_swaps_total = IntCounter::new(
            "cachering_config_swaps_total",
            "Cluster configuration snapshots applied",
        )?;
        let resurrection_passes_total = IntCounter::new(
            "cachering_resurrection_passes_total",
            "Resurrection timer probe passes completed",
        )?;

        registry.register(Box::new(nodes_alive.clone()))?;
        registry.register(Box::new(nodes_dead.clone()))?;
        registry.register(Box::new(config_swaps_total.clone()))?;
        registry.register(Box::new(resurrection_passes_total.clone()))?;

        Ok(Self {
            nodes_alive,
            nodes_dead,
            config_swaps_total,
            resurrection_passes_total,
            swap_count: AtomicU64::new(0),
        })
    }

    /// Build metrics without touching a [`Registry`], for tests and other
    /// callers that don't want a Prometheus exporter wired up.
    pub fn new_unregistered() -> Self {
        Self {
            nodes_alive: IntGauge::new("cachering_nodes_alive", "unregistered").unwrap(),
            nodes_dead: IntGauge::new("cachering_nodes_dead", "unregistered").unwrap(),
            config_swaps_total: IntCounter::new("cachering_config_swaps_total", "unregistered").unwrap(),
            resurrection_passes_total: IntCounter::new(
                "cachering_resurrection_passes_total",
                "unregistered",
            )
            .unwrap(),
            swap_count: AtomicU64::new(0),
        }
    }

    /// Record a completed configuration swap: total node count and how many
    /// of those are dead in the freshly-published snapshot.
    pub fn record_swap(&self, total_nodes: usize, dead_nodes: usize) {
        self.nodes_alive.set((total_nodes - dead_nodes) as i64);
        self.nodes_dead.set(dead_nodes as i64);
        self.config_swaps_total.inc();
        self.swap_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed resurrection probe pass.
    pub fn record_resurrection_pass(&self) {
        self.resurrection_passes_total.inc();
    }

    /// Number of swaps recorded so far. Exposed for tests; the Prometheus
    /// counter itself is the source of truth for real deployments.
    pub fn swap_count(&self) -> u64 {
        self.swap_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_swap_updates_alive_and_dead_gauges() {
        let metrics = PoolMetrics::new_unregistered();
        metrics.record_swap(5, 2);
        assert_eq!(metrics.nodes_alive.get(), 3);
        assert_eq!(metrics.nodes_dead.get(), 2);
        assert_eq!(metrics.swap_count(), 1);
    }

    #[test]
    fn registering_twice_on_the_same_registry_fails() {
        let registry = Registry::new();
        let _first = PoolMetrics::new(&registry).unwrap();
        assert!(PoolMetrics::new(&registry).is_err());
    }
}
