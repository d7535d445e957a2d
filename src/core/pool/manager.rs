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

//! The dynamic pool manager: owns the live [`InternalState`], swaps it in
//! reaction to a configuration stream, and keeps the resurrection timer
//! running while any node is dead.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::core::locator::LocatorError;
use crate::core::node::{NodeId, NodeProberFactory};
use crate::core::operation::OperationFactory;
use crate::core::pool::state::InternalState;
use crate::core::pool::timer::ResurrectionTimer;
use crate::core::types::{BucketIdentity, ClusterConfig, ConfigError, PortType, SaslSelection};
use crate::monitoring::metrics::PoolMetrics;

/// External collaborator: a live stream of cluster configuration snapshots.
///
/// Implemented outside this crate (it requires an HTTP/streaming client
/// talking to the cluster's management port); the pool manager only needs
/// "give me the next config, or tell me the stream ended."
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Await the next configuration snapshot. Returns `None` once the
    /// upstream stream is exhausted (manager shutdown follows).
    async fn next_config(&mut self) -> Option<ClusterConfig>;
}

/// Pool-manager-level errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolManagerError {
    /// The configuration snapshot failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No live node could be found for a routed key.
    #[error(transparent)]
    Locator(#[from] LocatorError),
}

/// The dynamic connection pool / request router.
///
/// Holds exactly one [`InternalState`] behind an [`ArcSwap`] so readers
/// (`locate`, `working_nodes`, `operation_factory`) never block on a
/// configuration swap in flight; writers (`apply_config`) serialize through
/// `r` so two overlapping config updates can't interleave their node
/// reuse/dispose bookkeeping.
pub struct PoolManager {
    state: Arc<ArcSwap<InternalState>>,
    r: AsyncMutex<()>,
    prober_factory: Arc<dyn NodeProberFactory>,
    identity: BucketIdentity,
    resurrection_timer: Arc<ResurrectionTimer>,
    metrics: Arc<PoolMetrics>,
}

impl PoolManager {
    /// Build a manager with no configuration applied yet
    /// ([`InternalState::empty`]).
    pub fn new(
        prober_factory: Arc<dyn NodeProberFactory>,
        identity: BucketIdentity,
        dead_timeout: Duration,
        metrics: Arc<PoolMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(ArcSwap::from_pointee(InternalState::empty())),
            r: AsyncMutex::new(()),
            prober_factory,
            identity,
            resurrection_timer: ResurrectionTimer::new(dead_timeout),
            metrics,
        })
    }

    /// The SASL authentication this manager's bucket identity resolves to.
    /// An external connection factory reads this when it establishes sockets.
    pub fn sasl_selection(&self) -> SaslSelection {
        self.identity.resolve_sasl()
    }

    /// Consume `source` until it ends, applying each snapshot in turn.
    /// Intended to be spawned as a background task by the caller.
    pub async fn start(self: Arc<Self>, mut source: impl ConfigSource + 'static) {
        while let Some(config) = source.next_config().await {
            if let Err(err) = self.apply_config(&config).await {
                warn!(error = %err, "rejected cluster configuration snapshot");
            }
        }
        info!("configuration stream ended");
    }

    /// Route `key` to a live node, via the current locator and liveness snapshot.
    pub fn locate(&self, key: &str) -> Result<NodeId, PoolManagerError> {
        let state = self.state.load_full();
        state
            .locator
            .locate(key, &|id| state.is_alive(id))
            .map_err(Into::into)
    }

    /// Resolve a vbucket index already known to the caller (e.g. one stamped
    /// on a prior `Operation` by the vbucket operation factory) straight to
    /// its master node, via the current locator and liveness snapshot. Only
    /// meaningful for a vbucket deployment; any other locator kind reports
    /// [`crate::core::locator::LocatorError::NoRoute`].
    pub fn locate_by_vbucket(&self, index: usize) -> Result<NodeId, PoolManagerError> {
        let state = self.state.load_full();
        state
            .locator
            .locate_by_vbucket(index, &|id| state.is_alive(id))
            .map_err(Into::into)
    }

    /// The operation factory matched to the current deployment shape.
    pub fn operation_factory(&self) -> Arc<dyn OperationFactory> {
        Arc::clone(&self.state.load_full().op_factory)
    }

    /// All nodes in the current snapshot, alive or dead.
    pub fn working_nodes(&self) -> Vec<NodeId> {
        self.state
            .load_full()
            .nodes
            .iter()
            .map(|n| n.id().clone())
            .collect()
    }

    /// Replace the live state with one built from `config`.
    ///
    /// 1. Validate the snapshot's shape.
    /// 2. Build the candidate state (fresh node handles, locator, operation
    ///    factory matched to the deployment kind).
    /// 3. Carry forward dead status for any node id present in both the old
    ///    and new snapshots — a config refresh alone doesn't resurrect a node.
    /// 4. Publish the candidate atomically.
    /// 5. Register this manager's `failed` listener on every new node handle.
    /// 6. Dispose every node handle in the old snapshot unconditionally —
    ///    construction always mints fresh handles, even for a persisting
    ///    endpoint, so the old handle is never reused.
    /// 7. Arm the resurrection timer if any node in the published state is dead.
    /// 8. Update swap/liveness metrics.
    pub async fn apply_config(&self, config: &ClusterConfig) -> Result<(), PoolManagerError> {
        let _guard = self.r.lock().await;

        let candidate = match config {
            ClusterConfig::VBucket { v_bucket_server_map } => {
                InternalState::build_vbucket(v_bucket_server_map, self.prober_factory.as_ref())?
            }
            ClusterConfig::Basic { nodes, port_type } => {
                InternalState::build_basic(nodes, *port_type, self.prober_factory.as_ref())
            }
        };

        let previous = self.state.load_full();
        for node in &candidate.nodes {
            if let Some(prior) = previous.node_by_id(node.id()) {
                if !prior.is_alive() {
                    node.mark_failed();
                }
            }
        }

        self.state.store(Arc::new(candidate));
        let published = self.state.load_full();

        let manager_timer = Arc::clone(&self.resurrection_timer);
        for node in &published.nodes {
            let timer = Arc::clone(&manager_timer);
            let state_for_probe = Arc::clone(&self.state);
            let metrics_for_probe = Arc::clone(&self.metrics);
            node.on_failed(move |_id| {
                let timer = Arc::clone(&timer);
                let state_for_probe = Arc::clone(&state_for_probe);
                let metrics_for_probe = Arc::clone(&metrics_for_probe);
                tokio::spawn(async move {
                    timer
                        .arm_if_needed(move || {
                            let state_for_probe = Arc::clone(&state_for_probe);
                            let metrics_for_probe = Arc::clone(&metrics_for_probe);
                            Box::pin(async move { probe_dead_nodes(state_for_probe, metrics_for_probe).await })
                        })
                        .await;
                });
            });
        }

        // Every node in the previous snapshot is disposed unconditionally:
        // `build_basic`/`build_vbucket` always mint fresh `CacheNode`
        // instances, even for an endpoint that persists across the refresh,
        // so the old handle for that endpoint is never the one `published`
        // now routes through and must not be left holding stale listeners.
        for old_node in previous.nodes.iter() {
            old_node.dispose();
        }

        let dead_count = published.dead_nodes().len();
        self.metrics.record_swap(published.nodes.len(), dead_count);
        if dead_count > 0 {
            let state_for_probe = Arc::clone(&self.state);
            let metrics_for_probe = Arc::clone(&self.metrics);
            manager_timer
                .arm_if_needed(move || {
                    let state_for_probe = Arc::clone(&state_for_probe);
                    let metrics_for_probe = Arc::clone(&metrics_for_probe);
                    Box::pin(async move { probe_dead_nodes(state_for_probe, metrics_for_probe).await })
                })
                .await;
        }

        Ok(())
    }

    /// Dispose every node in the current snapshot and revert to empty.
    pub fn dispose(&self) {
        let previous = self.state.swap(Arc::new(InternalState::empty()));
        for node in &previous.nodes {
            node.dispose();
        }
    }
}

async fn probe_dead_nodes(state: Arc<ArcSwap<InternalState>>, metrics: Arc<PoolMetrics>) -> usize {
    let snapshot = state.load_full();
    let dead: Vec<_> = snapshot.dead_nodes();
    for node in &dead {
        let _ = node.ping().await;
    }
    metrics.record_resurrection_pass();
    state.load().dead_nodes().len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::node::{CacheNode, NodeError, NodeProber};
    use crate::core::types::NodeDescriptor;

    struct AlwaysOkProber;

    #[async_trait]
    impl NodeProber for AlwaysOkProber {
        async fn probe(&self, _id: &NodeId) -> Result<(), NodeError> {
            Ok(())
        }
    }

    struct AlwaysOkFactory;

    impl NodeProberFactory for AlwaysOkFactory {
        fn prober_for(&self, _id: &NodeId) -> Box<dyn NodeProber> {
            Box::new(AlwaysOkProber)
        }
    }

    fn descriptor(host: &str) -> NodeDescriptor {
        NodeDescriptor {
            host: host.into(),
            proxy_port: 11211,
            direct_port: 11210,
            status: "healthy".into(),
        }
    }

    #[tokio::test]
    async fn locate_by_vbucket_resolves_the_same_master_as_locate() {
        use crate::core::types::{HashAlgorithmKind, VBucketServerMap};

        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        let map = VBucketServerMap {
            hash_algorithm: HashAlgorithmKind::Crc,
            server_list: vec!["a:11211".into(), "b:11211".into()],
            v_bucket_map: vec![vec![0, 1], vec![1, 0]],
        };
        manager
            .apply_config(&ClusterConfig::VBucket {
                v_bucket_server_map: map,
            })
            .await
            .unwrap();

        let routed = manager.locate("widget-42").unwrap();

        // Both of the two buckets must resolve through locate_by_vbucket to
        // one of the two configured nodes, matching what plain key-based
        // locate() would have returned for a key that hashed to that bucket.
        let via_bucket_0 = manager.locate_by_vbucket(0).unwrap();
        let via_bucket_1 = manager.locate_by_vbucket(1).unwrap();
        assert_ne!(via_bucket_0, via_bucket_1);
        assert!(via_bucket_0 == routed || via_bucket_1 == routed);
    }

    #[tokio::test]
    async fn locate_by_vbucket_on_a_classic_deployment_yields_no_route() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        manager
            .apply_config(&ClusterConfig::Basic {
                nodes: vec![descriptor("a")],
                port_type: PortType::Direct,
            })
            .await
            .unwrap();
        assert!(manager.locate_by_vbucket(0).is_err());
    }

    #[tokio::test]
    async fn locate_before_any_config_yields_no_route() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        assert!(manager.locate("anything").is_err());
    }

    #[tokio::test]
    async fn apply_config_makes_keys_routable() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        let config = ClusterConfig::Basic {
            nodes: vec![descriptor("a"), descriptor("b")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&config).await.unwrap();
        assert!(manager.locate("widget-42").is_ok());
        assert_eq!(manager.working_nodes().len(), 2);
    }

    #[tokio::test]
    async fn dispose_clears_the_working_set() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        let config = ClusterConfig::Basic {
            nodes: vec![descriptor("a")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&config).await.unwrap();
        manager.dispose();
        assert!(manager.working_nodes().is_empty());
    }

    #[tokio::test]
    async fn config_refresh_does_not_silently_resurrect_a_dead_node() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(3600),
            metrics,
        );
        let config = ClusterConfig::Basic {
            nodes: vec![descriptor("a"), descriptor("b")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&config).await.unwrap();

        {
            let state = manager.state.load();
            state.nodes[0].mark_failed();
        }
        assert_eq!(manager.state.load().dead_nodes().len(), 1);

        manager.apply_config(&config).await.unwrap();
        assert_eq!(manager.state.load().dead_nodes().len(), 1);
    }

    #[tokio::test]
    async fn removed_node_is_disposed_on_refresh() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        let first = ClusterConfig::Basic {
            nodes: vec![descriptor("a"), descriptor("b")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&first).await.unwrap();
        let removed: Arc<CacheNode> = manager.state.load().nodes[1].clone();

        let second = ClusterConfig::Basic {
            nodes: vec![descriptor("a")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&second).await.unwrap();

        assert!(removed.is_disposed());
    }

    #[tokio::test]
    async fn persisting_endpoint_gets_a_fresh_handle_and_the_old_one_is_disposed() {
        // build_basic/build_vbucket always mint new CacheNode instances, even
        // for an endpoint present in both the old and new config, so the old
        // handle must still be disposed even though its endpoint survives.
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics,
        );
        let first = ClusterConfig::Basic {
            nodes: vec![descriptor("a"), descriptor("b")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&first).await.unwrap();
        let original_a: Arc<CacheNode> = manager.state.load().nodes[0].clone();
        assert_eq!(original_a.id().as_str(), "a:11210");

        let second = ClusterConfig::Basic {
            nodes: vec![descriptor("a"), descriptor("c")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&second).await.unwrap();
        let refreshed_a: Arc<CacheNode> = manager.state.load().nodes[0].clone();

        assert!(original_a.is_disposed());
        assert!(!Arc::ptr_eq(&original_a, &refreshed_a));
        assert!(!refreshed_a.is_disposed());
        assert!(refreshed_a.is_alive());
    }

    #[tokio::test]
    async fn swap_metric_counts_every_apply() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_secs(1),
            metrics.clone(),
        );
        let config = ClusterConfig::Basic {
            nodes: vec![descriptor("a")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&config).await.unwrap();
        manager.apply_config(&config).await.unwrap();
        assert_eq!(metrics.swap_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn resurrection_timer_restores_routing_once_the_node_answers() {
        let metrics = Arc::new(PoolMetrics::new_unregistered());
        let manager = PoolManager::new(
            Arc::new(AlwaysOkFactory),
            BucketIdentity::default(),
            Duration::from_millis(50),
            metrics,
        );
        let config = ClusterConfig::Basic {
            nodes: vec![descriptor("a")],
            port_type: PortType::Direct,
        };
        manager.apply_config(&config).await.unwrap();
        manager.state.load().nodes[0].mark_failed();
        assert!(manager.locate("widget-42").is_err());
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(manager.locate("widget-42").is_ok());
    }
}
