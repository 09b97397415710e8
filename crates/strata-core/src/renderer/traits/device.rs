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

//! Defines the `Device` trait, the single backend-selection point of Strata.

use crate::renderer::api::*;
use crate::renderer::error::RhiError;
use std::fmt::Debug;
use std::time::Duration;

/// The owner and factory of every GPU entity.
///
/// A device is created once for one backend (see [`BackendType`]) and never mixes
/// backends afterwards. Both concrete devices implement exactly this contract, run the
/// same [`validation`](crate::renderer::validation) before any native call, and differ
/// only in how they translate batches.
///
/// Once [`is_lost`](Self::is_lost) reports `true`, every call fails with
/// [`RhiError::DeviceLost`]; after [`shutdown`](Self::shutdown), with
/// [`RhiError::DeviceShutDown`].
pub trait Device: Send + Sync + Debug {
    /// Identifies the device. Every handle it creates carries this id.
    fn id(&self) -> DeviceId;

    /// The backend the device was created for.
    fn backend(&self) -> BackendType;

    /// Creates a buffer or texture.
    /// ## Arguments
    /// * `descriptor` - Geometry, format, usage and optional initial content.
    /// ## Returns
    /// The resource handle, in [`ResourceState::Undefined`], or in
    /// [`ResourceState::CopyDst`] when initial data was supplied.
    /// ## Errors
    /// * [`RhiError::Validation`] - If format and usage are incompatible.
    /// * [`RhiError::OutOfMemory`] - If the allocation does not fit.
    fn create_resource(&self, descriptor: &ResourceDescriptor) -> Result<Resource, RhiError>;

    /// Creates a binding layout.
    /// ## Errors
    /// * [`RhiError::Validation`] - If slot indices are not unique and contiguous from zero.
    fn create_layout(&self, descriptor: &LayoutDescriptor) -> Result<Layout, RhiError>;

    /// Creates a mesh over existing vertex and index buffers.
    fn create_mesh(&self, descriptor: &MeshDescriptor) -> Result<Mesh, RhiError>;

    /// Creates a technique addressed by `layout`.
    /// ## Errors
    /// * [`RhiError::Validation`] - If the descriptor is malformed.
    /// * [`RhiError::LayoutMismatch`] - If a stage's interface does not fit `layout`.
    fn create_technique(
        &self,
        descriptor: &TechniqueDescriptor,
        layout: &Layout,
    ) -> Result<Technique, RhiError>;

    /// Creates a pass writing `targets` and reading `inputs` with the descriptor's
    /// technique.
    /// ## Errors
    /// * [`RhiError::Validation`] - If targets or inputs do not fit the technique, or if a
    ///   resource is both written and read without the matching feedback flag.
    fn create_pass(
        &self,
        descriptor: &PassDescriptor,
        targets: &PassTargets,
        inputs: &[PassInput],
    ) -> Result<Pass, RhiError>;

    /// Starts recording a batch against `pass`.
    fn create_batch(&self, pass: &Pass) -> Result<Batch, RhiError>;

    /// Starts recording a batch with no pass bound, for copies and updates.
    fn create_transfer_batch(&self) -> Result<Batch, RhiError>;

    /// Hands a finished batch to the GPU queue. Batches execute in submission order.
    /// ## Returns
    /// A token signaled once the GPU has executed the batch.
    /// ## Errors
    /// * [`RhiError::Validation`] - If the batch is unfinished, belongs to another
    ///   device, or references a destroyed entity.
    fn submit(&self, batch: Batch) -> Result<CompletionToken, RhiError>;

    /// Destroys an entity. Its native objects are released once every submission that
    /// references it has completed; the handle is invalid immediately.
    /// ## Errors
    /// * [`RhiError::NotFound`] - If the entity is unknown or already destroyed.
    fn destroy(&self, entity: Entity) -> Result<(), RhiError>;

    /// Copies the content of a resource back to the CPU in its packed layout, blocking
    /// until the copy completes. The resource must have [`ResourceUsage::COPY_SRC`] and
    /// every submission writing it must have been made before this call.
    fn read_resource(&self, resource: &Resource) -> Result<Vec<u8>, RhiError>;

    /// Releases the native objects of destroyed entities whose submissions completed.
    /// Returns how many entities were released.
    fn maintain(&self) -> Result<usize, RhiError>;

    /// Blocks until every submission completes or `timeout` elapses.
    fn wait_idle(&self, timeout: Duration) -> Result<WaitStatus, RhiError>;

    /// A snapshot of the device counters.
    fn stats(&self) -> DeviceStats;

    /// Returns `true` once the GPU context has been lost.
    fn is_lost(&self) -> bool;

    /// Drains every outstanding submission, then releases every entity. Every handle
    /// the device created becomes invalid.
    ///
    /// Dropping the last handle of a device that was not shut down does the same.
    ///
    /// # Errors
    ///
    /// Fails with [`RhiError::SubmissionsPending`] if the GPU does not finish within a
    /// bounded wait. The device then stays open and owns everything it owned before.
    fn shutdown(&self) -> Result<(), RhiError>;
}
