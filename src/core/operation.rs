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

//! Builds protocol-agnostic operation descriptors for a routed key.
//!
//! The memcached binary protocol itself (header framing, opcodes, actually
//! writing bytes to a socket) is out of scope here; an [`OperationFactory`]
//! only decides *what metadata* a request needs to carry, given where the
//! locator routed it. A classic deployment needs nothing beyond the target
//! node; a vbucket deployment must also stamp the request with the vbucket
//! index so the server can detect a stale client-side map.

use crate::core::node::NodeId;

/// The verb an operation performs. Kept minimal: this crate routes and
/// envelopes requests, it does not implement the wire protocol's full opcode set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Fetch a value.
    Get,
    /// Store a value unconditionally.
    Set,
    /// Remove a value.
    Delete,
}

/// A routed operation: target node plus whatever routing metadata the
/// deployment's locator variant requires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    /// Which verb to perform.
    pub kind: OperationKind,
    /// The cache key this operation addresses.
    pub key: String,
    /// The node the transport should send this operation to.
    pub target: NodeId,
    /// Present only for vbucket deployments: the vbucket index the server
    /// should validate the request against.
    pub vbucket: Option<u16>,
}

/// Builds [`Operation`] descriptors for a key already routed to a node.
///
/// `InternalState` pairs exactly one locator with exactly one factory, chosen
/// together at construction time so a vbucket locator is never paired with a
/// factory that forgets to stamp the vbucket index, or vice versa.
pub trait OperationFactory: Send + Sync {
    /// Build the operation descriptor for `kind key` routed to `target`,
    /// using `vbucket` if this factory's deployment kind carries one.
    fn build(
        &self,
        kind: OperationKind,
        key: &str,
        target: NodeId,
        vbucket: Option<u16>,
    ) -> Operation;
}

/// Factory for classic (non-vbucket) deployments: no vbucket index is ever attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicOperationFactory;

impl OperationFactory for BasicOperationFactory {
    fn build(
        &self,
        kind: OperationKind,
        key: &str,
        target: NodeId,
        _vbucket: Option<u16>,
    ) -> Operation {
        Operation {
            kind,
            key: key.to_owned(),
            target,
            vbucket: None,
        }
    }
}

/// Factory for vbucket deployments: the vbucket index the locator resolved
/// travels with the request so the server can reject it on a stale map.
#[derive(Clone, Copy, Debug, Default)]
pub struct VBucketOperationFactory;

impl OperationFactory for VBucketOperationFactory {
    fn build(
        &self,
        kind: OperationKind,
        key: &str,
        target: NodeId,
        vbucket: Option<u16>,
    ) -> Operation {
        Operation {
            kind,
            key: key.to_owned(),
            target,
            vbucket,
        }
    }
}
