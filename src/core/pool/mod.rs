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

//! Dynamic pool manager: live routing state, its swap algorithm, and the
//! resurrection timer that keeps dead nodes under periodic re-probe.

/// The `{nodes, locator, opFactory}` snapshot routing runs against.
pub mod state;
/// One-shot, self-rearming dead-node re-probe timer.
pub mod timer;
/// Consumes a configuration stream and drives state swaps.
pub mod manager;
