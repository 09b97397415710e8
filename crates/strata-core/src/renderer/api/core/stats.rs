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

//! Counters describing the live state of a device.

/// A snapshot of device-side counters, returned by
/// [`Device::stats`](crate::renderer::Device::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    /// Number of live resources.
    pub resources: usize,
    /// Number of live layouts.
    pub layouts: usize,
    /// Number of live meshes.
    pub meshes: usize,
    /// Number of live techniques.
    pub techniques: usize,
    /// Number of live passes.
    pub passes: usize,
    /// Native pipeline objects currently cached, shared between techniques with
    /// identical descriptors.
    pub cached_pipelines: usize,
    /// Entities destroyed by the caller whose native objects still await GPU completion.
    pub pending_releases: usize,
    /// Total number of batches submitted.
    pub submissions: u64,
    /// Value of the most recently completed submission.
    pub completed_submission: u64,
    /// Bytes of GPU memory currently allocated.
    pub allocated_bytes: u64,
    /// Highest value `allocated_bytes` has reached.
    pub peak_allocated_bytes: u64,
    /// Recorded commands translated into native commands.
    pub commands_translated: u64,
    /// Native barriers (or hazard unbinds) emitted by translation.
    pub barriers_emitted: u64,
    /// Recorded barriers that required no native work.
    pub barriers_elided: u64,
}
