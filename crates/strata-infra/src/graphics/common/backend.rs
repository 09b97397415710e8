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

//! The seam between the shared device logic and one native API.

use std::fmt::Debug;
use std::time::Duration;
use strata_core::renderer::{
    BackendType, Batch, Layout, LayoutId, Pass, PassId, Resource, ResourceDescriptor,
    ResourceId, Technique,
};
use strata_core::RhiError;

/// Identifies a native pipeline: techniques with the same fingerprint created against
/// the same layout share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    /// The technique fingerprint.
    pub fingerprint: u64,
    /// The layout the technique was created against.
    pub layout: LayoutId,
}

impl PipelineKey {
    /// The key of the pipeline `technique` executes with.
    pub fn of(technique: &Technique) -> Self {
        Self {
            fingerprint: technique.fingerprint(),
            layout: technique.layout().id(),
        }
    }
}

/// A native object whose release waits for the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retired {
    /// The memory and views of a buffer or texture.
    Resource(ResourceId),
    /// A binding layout.
    Layout(LayoutId),
    /// A pipeline no technique references anymore.
    Pipeline(PipelineKey),
    /// The bindings of a pass.
    Pass(PassId),
}

/// What translating one batch produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitReport {
    /// Native commands recorded.
    pub commands: u64,
    /// Barriers (or hazard unbinds) that reached the native stream.
    pub barriers_emitted: u64,
    /// Barriers that needed no native work.
    pub barriers_elided: u64,
}

/// Everything a device needs from one native API.
///
/// Implementations own their native object tables, keyed by Strata handles. The shared
/// device guarantees that every call receives validated input, that submissions arrive
/// with strictly increasing values, and that [`release`](Self::release) is only called
/// once the GPU no longer uses the object.
pub trait NativeBackend: Send + Sync + Debug + 'static {
    /// The API this backend drives.
    const KIND: BackendType;

    /// Creates the native buffer or texture of `resource`, uploading the descriptor's
    /// initial data.
    /// ## Returns
    /// The number of bytes of device memory the resource occupies.
    fn create_resource(
        &self,
        resource: &Resource,
        descriptor: &ResourceDescriptor,
    ) -> Result<u64, RhiError>;

    /// Creates the native binding layout of `layout`.
    fn create_layout(&self, layout: &Layout) -> Result<(), RhiError>;

    /// Creates the native pipeline for `key`. Only called on a cache miss.
    fn create_pipeline(&self, key: PipelineKey, technique: &Technique) -> Result<(), RhiError>;

    /// Creates the native views and bindings of `pass`.
    fn create_pass(&self, pass: &Pass) -> Result<(), RhiError>;

    /// Translates `batch` into the native command stream and hands it to the GPU queue.
    /// The GPU signals `value` once the stream has executed.
    fn submit(&self, batch: &Batch, value: u64) -> Result<SubmitReport, RhiError>;

    /// Copies `resource` into CPU memory through a submission signaling `value`, and
    /// blocks until it completes.
    fn read_back(&self, resource: &Resource, value: u64) -> Result<Vec<u8>, RhiError>;

    /// The highest submission value the GPU has completed.
    fn completed_value(&self) -> Result<u64, RhiError>;

    /// Blocks until `value` completes or `timeout` elapses. Returns `true` on completion.
    fn wait_for(&self, value: u64, timeout: Duration) -> Result<bool, RhiError>;

    /// Releases a native object.
    fn release(&self, retired: Retired);
}
