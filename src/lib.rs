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

//! Cachering - client-side connection pool and request router for a distributed
//! in-memory cache cluster.
//!
//! This crate provides:
//! - A type-tagged binary envelope codec for cached values (raw bytes, scalars,
//!   and a BSON fallback for structured objects).
//! - A Ketama consistent-hashing ring and a vbucket locator for routing a key
//!   to its owning node.
//! - A dynamic pool manager that consumes a live cluster configuration stream,
//!   rebuilds routing state under membership changes, and runs a resurrection
//!   timer that periodically re-probes dead nodes.
//!
//! Socket I/O, SASL authentication, the memcached wire protocol, and the
//! HTTP/streaming configuration listener are external collaborators named by
//! interface only; this crate does not implement them.

/// Core protocol primitives (types, transcoder, locators, node handles, pool manager).
pub mod core;
/// Observability (Prometheus metrics for the pool manager).
pub mod monitoring;

pub use crate::core::node::{CacheNode, NodeId, NodeProber, NodeProberFactory};
pub use crate::core::operation::{Operation, OperationFactory, OperationKind};
pub use crate::core::pool::manager::{ConfigSource, PoolManager, PoolManagerError};
pub use crate::core::pool::state::InternalState;
pub use crate::core::transcoder::{CacheItem, CacheValue, DefaultTranscoder, Transcoder};
pub use crate::core::types::{ClusterConfig, NodeDescriptor, PortType, VBucketServerMap};
