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

//! Core routing/codec engine: data model, transcoder, locators, node handles, pool manager.

/// Cluster configuration data model shared by both locator variants.
pub mod types;
/// Envelope codec (serialize/deserialize cached values).
pub mod transcoder;
/// Node locators (Ketama ring, vbucket map).
pub mod locator;
/// Stateful lifecycle of one cache node.
pub mod node;
/// Operation factory abstraction.
pub mod operation;
/// Dynamic pool manager (state swap, resurrection timer, config ingest).
pub mod pool;
