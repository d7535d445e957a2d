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

//! End-to-end coverage for the pool manager against a fake configuration
//! stream and a fake node prober, standing in for the real HTTP config
//! listener and socket transport.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cachering::core::node::{NodeError, NodeId, NodeProber, NodeProberFactory};
use cachering::core::pool::manager::ConfigSource;
use cachering::core::types::{BucketIdentity, ClusterConfig, NodeDescriptor, PortType};
use cachering::monitoring::metrics::PoolMetrics;
use cachering::PoolManager;

/// A `ConfigSource` backed by an mpsc channel, so tests can push snapshots
/// at will and signal end-of-stream by dropping the sender.
struct ChannelConfigSource(mpsc::Receiver<ClusterConfig>);

#[async_trait]
impl ConfigSource for ChannelConfigSource {
    async fn next_config(&mut self) -> Option<ClusterConfig> {
        self.0.recv().await
    }
}

/// A prober whose answer for a given node can be flipped at runtime, so
/// resurrection-timer tests can simulate a node coming back up mid-probe.
struct SwitchableProber {
    reachable: Arc<AtomicBool>,
}

#[async_trait]
impl NodeProber for SwitchableProber {
    async fn probe(&self, id: &NodeId) -> Result<(), NodeError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(NodeError::NodeUnreachable(id.clone()))
        }
    }
}

struct SwitchableProberFactory {
    reachable: Arc<AtomicBool>,
}

impl NodeProberFactory for SwitchableProberFactory {
    fn prober_for(&self, _id: &NodeId) -> Box<dyn NodeProber> {
        Box::new(SwitchableProber {
            reachable: self.reachable.clone(),
        })
    }
}

fn healthy_node(host: &str) -> NodeDescriptor {
    NodeDescriptor {
        host: host.into(),
        proxy_port: 11211,
        direct_port: 11210,
        status: "healthy".into(),
    }
}

#[tokio::test]
async fn config_stream_drives_routable_state_until_it_ends() {
    let reachable = Arc::new(AtomicBool::new(true));
    let factory = Arc::new(SwitchableProberFactory {
        reachable: reachable.clone(),
    });
    let metrics = Arc::new(PoolMetrics::new_unregistered());
    let manager = PoolManager::new(
        factory,
        BucketIdentity::default(),
        Duration::from_secs(60),
        metrics,
    );

    let (tx, rx) = mpsc::channel(4);
    let source = ChannelConfigSource(rx);
    let driver = {
        let manager = manager.clone();
        tokio::spawn(async move {
            manager.start(source).await;
        })
    };

    assert!(manager.locate("widget-42").is_err());

    tx.send(ClusterConfig::Basic {
        nodes: vec![healthy_node("a"), healthy_node("b"), healthy_node("c")],
        port_type: PortType::Direct,
    })
    .await
    .unwrap();

    // Give the driver task a chance to process the snapshot.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(manager.locate("widget-42").is_ok());
    assert_eq!(manager.working_nodes().len(), 3);

    drop(tx);
    driver.await.unwrap();
}

#[tokio::test]
async fn unknown_hash_algorithm_is_rejected_before_construction() {
    let json = r#"{
        "vBucketServerMap": {
            "hashAlgorithm": "murmur3",
            "serverList": ["a:11211"],
            "vBucketMap": [[0]]
        }
    }"#;
    let parsed: Result<ClusterConfig, _> = serde_json::from_str(json);
    assert!(parsed.is_err());
}

#[tokio::test]
async fn vbucket_config_round_trips_through_serde_and_routes() {
    let json = r#"{
        "vBucketServerMap": {
            "hashAlgorithm": "crc",
            "serverList": ["a:11211", "b:11211"],
            "vBucketMap": [[0, 1], [1, 0]]
        }
    }"#;
    let config: ClusterConfig = serde_json::from_str(json).unwrap();
    assert!(config.is_vbucket());

    let reachable = Arc::new(AtomicBool::new(true));
    let factory = Arc::new(SwitchableProberFactory {
        reachable: reachable.clone(),
    });
    let metrics = Arc::new(PoolMetrics::new_unregistered());
    let manager = PoolManager::new(
        factory,
        BucketIdentity::default(),
        Duration::from_secs(60),
        metrics,
    );
    manager.apply_config(&config).await.unwrap();
    assert!(manager.locate("widget-42").is_ok());
}

#[tokio::test]
async fn repeated_config_swaps_do_not_leak_disposed_node_handles() {
    let reachable = Arc::new(AtomicBool::new(true));
    let factory = Arc::new(SwitchableProberFactory {
        reachable: reachable.clone(),
    });
    let metrics = Arc::new(PoolMetrics::new_unregistered());
    let manager = PoolManager::new(
        factory,
        BucketIdentity::default(),
        Duration::from_secs(60),
        metrics,
    );

    let swap_count = Arc::new(AtomicUsize::new(0));
    for i in 0..5 {
        let hosts: Vec<NodeDescriptor> = (0..=i).map(|n| healthy_node(&format!("h{n}"))).collect();
        manager
            .apply_config(&ClusterConfig::Basic {
                nodes: hosts,
                port_type: PortType::Direct,
            })
            .await
            .unwrap();
        swap_count.fetch_add(1, Ordering::SeqCst);
    }

    assert_eq!(manager.working_nodes().len(), 5);
    assert_eq!(swap_count.load(Ordering::SeqCst), 5);
}
