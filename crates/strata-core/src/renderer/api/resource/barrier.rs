// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! State transitions recorded into batches.

use super::{handle::Resource, state::ResourceState};

/// A recorded state transition of one resource.
///
/// Produced by [`Resource::transition`] or [`Resource::observe`], consumed by
/// [`Batch::insert`](crate::renderer::Batch::insert).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierCommand {
    resource: Resource,
    before: ResourceState,
    after: ResourceState,
}

impl BarrierCommand {
    pub(crate) fn new(resource: Resource, before: ResourceState, after: ResourceState) -> Self {
        Self {
            resource,
            before,
            after,
        }
    }

    /// The transitioned resource.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// The state the resource leaves.
    pub fn before(&self) -> ResourceState {
        self.before
    }

    /// The state the resource enters.
    pub fn after(&self) -> ResourceState {
        self.after
    }

    /// Returns `true` if the barrier changes the state.
    pub fn is_transition(&self) -> bool {
        self.before != self.after
    }

    /// Returns `true` if the barrier requires the GPU to synchronize at all. A barrier
    /// that keeps a read-only state needs no work; one that keeps a write state still
    /// orders the writes on either side of it.
    pub fn needs_sync(&self) -> bool {
        self.is_transition() || self.after.is_write()
    }
}
