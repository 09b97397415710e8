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

use super::backend::{NativeBackend, PipelineKey, Retired, SubmitReport};
use super::cache::TechniqueCache;
use super::fence::DeviceFence;
use super::registry::{Registry, Removed};
use super::retire::RetireQueue;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::renderer::validation;
use strata_core::renderer::*;
use strata_core::{Device, RhiError};

/// How long [`Device::shutdown`] waits for outstanding submissions.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The internal, non-clonable state of a device, shared with its fences.
pub(crate) struct DeviceShared<B: NativeBackend> {
    id: DeviceId,
    label: Option<String>,
    backend: B,
    fence: Arc<DeviceFence<B>>,

    registry: Mutex<Registry>,
    cache: Mutex<TechniqueCache>,
    retire: Mutex<RetireQueue<Retired>>,
    /// The last submission value handed to the backend.
    queue: Mutex<u64>,
    completed: AtomicU64,
    lost: AtomicBool,
    shut_down: AtomicBool,

    next_resource_id: AtomicU32,
    next_layout_id: AtomicU32,
    next_mesh_id: AtomicU32,
    next_technique_id: AtomicU32,
    next_pass_id: AtomicU32,

    submissions: AtomicU64,
    commands_translated: AtomicU64,
    barriers_emitted: AtomicU64,
    barriers_elided: AtomicU64,
    allocated_bytes: AtomicU64,
    peak_allocated_bytes: AtomicU64,
}

impl<B: NativeBackend> fmt::Debug for DeviceShared<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceShared")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("backend", &self.backend)
            .field("completed", &self.completed)
            .field("lost", &self.lost)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}

impl<B: NativeBackend> DeviceShared<B> {
    fn check_alive(&self) -> Result<(), RhiError> {
        if self.shut_down.load(Ordering::Acquire) {
            Err(RhiError::DeviceShutDown)
        } else if self.lost.load(Ordering::Acquire) {
            Err(RhiError::DeviceLost)
        } else {
            Ok(())
        }
    }

    /// Passes `result` through, latching the device lost if it reports so.
    fn latch<T>(&self, result: Result<T, RhiError>) -> Result<T, RhiError> {
        if let Err(RhiError::DeviceLost) = &result {
            self.mark_lost();
        }
        result
    }

    fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::AcqRel) {
            log::error!(
                "{} ({}): device lost, every further call will fail",
                self.id,
                B::KIND
            );
        }
    }

    /// Asks the backend how far the GPU got and releases what it finished with.
    pub(crate) fn refresh_completed(&self) -> Result<u64, RhiError> {
        if self.lost.load(Ordering::Acquire) {
            return Err(RhiError::DeviceLost);
        }
        if self.shut_down.load(Ordering::Acquire) {
            return Ok(self.completed.load(Ordering::Acquire));
        }
        let completed = self.latch(self.backend.completed_value())?;
        let previous = self.completed.fetch_max(completed, Ordering::AcqRel);
        if completed > previous {
            self.release_completed(completed);
        }
        Ok(completed.max(previous))
    }

    pub(crate) fn wait_value(&self, value: u64, timeout: Duration) -> Result<bool, RhiError> {
        if self.refresh_completed()? >= value {
            return Ok(true);
        }
        if !self.latch(self.backend.wait_for(value, timeout))? {
            return Ok(false);
        }
        Ok(self.refresh_completed()? >= value)
    }

    /// Releases every retired object whose last submission is at most `completed`.
    fn release_completed(&self, completed: u64) -> usize {
        let ready = self.retire.lock().drain(completed);
        let count = ready.len();
        for retired in ready {
            log::trace!("{}: releasing {:?}", self.id, retired);
            self.backend.release(retired);
        }
        count
    }

    fn retire(&self, removed: Removed, last_use: u64) {
        let retired = match removed {
            Removed::Resource { resource, bytes } => {
                resource.mark_released();
                self.allocated_bytes.fetch_sub(bytes, Ordering::AcqRel);
                Some((Retired::Resource(resource.id()), last_use))
            }
            Removed::Layout(id) => Some((Retired::Layout(id), last_use)),
            Removed::Mesh => None,
            Removed::Technique(id) => self
                .cache
                .lock()
                .release(id)
                .map(|(key, pipeline_use)| (Retired::Pipeline(key), pipeline_use.max(last_use))),
            Removed::Pass(id) => Some((Retired::Pass(id), last_use)),
        };
        if let Some((retired, at)) = retired {
            self.retire.lock().push(at, retired);
        }
    }

    fn track_allocation(&self, bytes: u64) {
        let total = self.allocated_bytes.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak_allocated_bytes.fetch_max(total, Ordering::AcqRel);
    }

    fn ensure_live(&self, entity: impl Into<Entity>) -> Result<(), RhiError> {
        let entity = entity.into();
        validation::ensure_device(self.id, entity)?;
        if self.registry.lock().contains(entity) {
            Ok(())
        } else {
            Err(RhiError::NotFound(entity))
        }
    }

    /// Allocates the next submission value, records it as the last use of `entities`
    /// and runs `submit` with it, keeping values and queue order in step.
    ///
    /// The entities are claimed before the backend sees them, so a concurrent
    /// `destroy` retires them behind this submission.
    fn with_next_value<T>(
        &self,
        entities: &[Entity],
        submit: impl FnOnce(u64) -> Result<T, RhiError>,
    ) -> Result<(u64, T), RhiError> {
        let mut queue = self.queue.lock();
        self.check_alive()?;
        let value = *queue + 1;
        {
            let mut registry = self.registry.lock();
            registry
                .touch_all(entities, value)
                .map_err(RhiError::NotFound)?;
            let mut cache = self.cache.lock();
            for entity in entities {
                if let Entity::Technique(id) = entity {
                    cache.touch(*id, value);
                }
            }
        }
        let output = self.latch(submit(value))?;
        *queue = value;
        Ok((value, output))
    }

    /// Waits for every submission, then releases every entity and native object.
    ///
    /// Nothing is released while the GPU may still execute a submission: if it does
    /// not finish within [`SHUTDOWN_TIMEOUT`] the device stays open.
    fn teardown(&self) -> Result<(), RhiError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(RhiError::DeviceShutDown);
        }
        let last = *self.queue.lock();
        match self.wait_value(last, SHUTDOWN_TIMEOUT) {
            Ok(true) | Err(RhiError::DeviceLost) => {}
            Ok(false) => return Err(RhiError::SubmissionsPending { pending: last }),
            Err(e) => return Err(e),
        }
        {
            // A submission may have slipped in while waiting.
            let queue = self.queue.lock();
            if *queue > self.completed.load(Ordering::Acquire)
                && !self.lost.load(Ordering::Acquire)
            {
                return Err(RhiError::SubmissionsPending { pending: *queue });
            }
            if self.shut_down.swap(true, Ordering::AcqRel) {
                return Err(RhiError::DeviceShutDown);
            }
        }

        let removed = self.registry.lock().drain();
        for entity in removed {
            self.retire(entity, 0);
        }
        let mut released = self.retire.lock().drain_all();
        released.extend(self.cache.lock().clear().into_iter().map(Retired::Pipeline));
        let count = released.len();
        for retired in released {
            self.backend.release(retired);
        }

        log::info!(
            "{} ({}): shut down, released {} native objects",
            self.id,
            B::KIND,
            count
        );
        Ok(())
    }
}

impl<B: NativeBackend> Drop for DeviceShared<B> {
    fn drop(&mut self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.teardown() {
            log::warn!(
                "{}: dropped without a clean shutdown, native objects stay allocated: {}",
                self.id,
                e
            );
        }
    }
}

/// A [`Device`] built on one native backend.
///
/// All backend-independent work happens here: validation, entity tables, submission
/// values, deferred destruction and pipeline sharing. The backend only translates.
/// [`D11Device`](crate::graphics::D11Device) and [`VlkDevice`](crate::graphics::VlkDevice)
/// are the two instantiations.
///
/// The handle is cheap to clone; clones share the device.
pub struct RhiDevice<B: NativeBackend> {
    shared: Arc<DeviceShared<B>>,
}

impl<B: NativeBackend> Clone for RhiDevice<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: NativeBackend> fmt::Debug for RhiDevice<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RhiDevice")
            .field("id", &self.shared.id)
            .field("backend", &B::KIND)
            .field("label", &self.shared.label)
            .finish()
    }
}

impl<B: NativeBackend> RhiDevice<B> {
    /// Wraps an initialized backend into a device.
    pub fn with_backend(descriptor: &DeviceDescriptor, backend: B) -> Self {
        let id = DeviceId::allocate();
        let shared = Arc::new_cyclic(|weak| DeviceShared {
            id,
            label: descriptor.label.clone(),
            backend,
            fence: Arc::new(DeviceFence::new(weak.clone())),
            registry: Mutex::new(Registry::default()),
            cache: Mutex::new(TechniqueCache::default()),
            retire: Mutex::new(RetireQueue::default()),
            queue: Mutex::new(0),
            completed: AtomicU64::new(0),
            lost: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
            next_resource_id: AtomicU32::new(0),
            next_layout_id: AtomicU32::new(0),
            next_mesh_id: AtomicU32::new(0),
            next_technique_id: AtomicU32::new(0),
            next_pass_id: AtomicU32::new(0),
            submissions: AtomicU64::new(0),
            commands_translated: AtomicU64::new(0),
            barriers_emitted: AtomicU64::new(0),
            barriers_elided: AtomicU64::new(0),
            allocated_bytes: AtomicU64::new(0),
            peak_allocated_bytes: AtomicU64::new(0),
        });
        log::info!(
            "{} ({}): created device {:?}",
            id,
            B::KIND,
            descriptor.label.as_deref().unwrap_or("<unnamed>")
        );
        Self { shared }
    }

    /// The native backend, for backend-specific inspection.
    pub fn backend_impl(&self) -> &B {
        &self.shared.backend
    }

    // --- ID Generation Helpers ---

    fn generate_resource_id(&self) -> ResourceId {
        ResourceId::new(
            self.shared.id,
            self.shared.next_resource_id.fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_layout_id(&self) -> LayoutId {
        LayoutId::new(
            self.shared.id,
            self.shared.next_layout_id.fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_mesh_id(&self) -> MeshId {
        MeshId::new(
            self.shared.id,
            self.shared.next_mesh_id.fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_technique_id(&self) -> TechniqueId {
        TechniqueId::new(
            self.shared.id,
            self.shared.next_technique_id.fetch_add(1, Ordering::Relaxed),
        )
    }

    fn generate_pass_id(&self) -> PassId {
        PassId::new(
            self.shared.id,
            self.shared.next_pass_id.fetch_add(1, Ordering::Relaxed),
        )
    }

    fn check_pass_resources(
        &self,
        targets: &PassTargets,
        inputs: &[PassInput],
    ) -> Result<(), RhiError> {
        let views = targets
            .colors
            .iter()
            .map(|c| &c.view)
            .chain(targets.depth.as_ref().map(|d| &d.view));
        for view in views {
            self.shared.ensure_live(view.resource_id())?;
        }
        for input in inputs {
            match &input.binding {
                InputBinding::View(view) => self.shared.ensure_live(view.resource_id())?,
                InputBinding::Buffer { resource, .. } => self.shared.ensure_live(resource.id())?,
            }
        }
        Ok(())
    }
}

impl<B: NativeBackend> Device for RhiDevice<B> {
    fn id(&self) -> DeviceId {
        self.shared.id
    }

    fn backend(&self) -> BackendType {
        B::KIND
    }

    fn create_resource(&self, descriptor: &ResourceDescriptor) -> Result<Resource, RhiError> {
        self.shared.check_alive()?;
        validation::validate_resource(descriptor)?;

        let resource = Resource::new(self.generate_resource_id(), descriptor);
        let bytes = self
            .shared
            .latch(self.shared.backend.create_resource(&resource, descriptor))?;
        self.shared.track_allocation(bytes);
        self.shared
            .registry
            .lock()
            .insert_resource(resource.clone(), bytes);

        log::debug!(
            "{}: created {} {:?} ({} bytes, {:?})",
            self.shared.id,
            resource.id(),
            descriptor.label.as_deref().unwrap_or_default(),
            bytes,
            resource.current_state()
        );
        Ok(resource)
    }

    fn create_layout(&self, descriptor: &LayoutDescriptor) -> Result<Layout, RhiError> {
        self.shared.check_alive()?;
        let slots = validation::validate_layout(descriptor)?;

        let layout = Layout::new(self.generate_layout_id(), descriptor.label.as_deref(), slots);
        self.shared
            .latch(self.shared.backend.create_layout(&layout))?;
        self.shared.registry.lock().insert_layout(layout.clone());

        log::debug!(
            "{}: created {} with {} slots",
            self.shared.id,
            layout.id(),
            layout.slot_count()
        );
        Ok(layout)
    }

    fn create_mesh(&self, descriptor: &MeshDescriptor) -> Result<Mesh, RhiError> {
        self.shared.check_alive()?;
        validation::validate_mesh(descriptor)?;
        let buffers = descriptor
            .vertex_buffers
            .iter()
            .map(|v| &v.resource)
            .chain(descriptor.index_buffer.iter().map(|i| &i.resource));
        for buffer in buffers {
            self.shared.ensure_live(buffer.id())?;
        }

        let mesh = Mesh::new(self.generate_mesh_id(), descriptor.clone());
        self.shared.registry.lock().insert_mesh(mesh.clone());

        log::debug!(
            "{}: created {} ({} elements)",
            self.shared.id,
            mesh.id(),
            mesh.element_count()
        );
        Ok(mesh)
    }

    fn create_technique(
        &self,
        descriptor: &TechniqueDescriptor,
        layout: &Layout,
    ) -> Result<Technique, RhiError> {
        self.shared.check_alive()?;
        self.shared.ensure_live(layout.id())?;
        validation::validate_technique(descriptor)?;
        validation::check_technique_layout(descriptor, layout)?;

        let technique = Technique::new(self.generate_technique_id(), descriptor.clone(), layout);
        let key = PipelineKey::of(&technique);
        let cached = self.shared.cache.lock().acquire(key, technique.id());
        // A pipeline whose last technique was destroyed may still wait for release.
        let revived = if cached {
            None
        } else {
            self.shared.retire.lock().cancel(&Retired::Pipeline(key))
        };
        if let Some(last_use) = revived {
            self.shared.cache.lock().touch(technique.id(), last_use);
        } else if !cached {
            let created = self
                .shared
                .latch(self.shared.backend.create_pipeline(key, &technique));
            if let Err(e) = created {
                self.shared.cache.lock().release(technique.id());
                return Err(e);
            }
        }
        self.shared
            .registry
            .lock()
            .insert_technique(technique.clone());

        log::debug!(
            "{}: created {} {:?} (pipeline {:#018x}, {})",
            self.shared.id,
            technique.id(),
            technique.label().unwrap_or_default(),
            key.fingerprint,
            if cached {
                "shared"
            } else if revived.is_some() {
                "revived"
            } else {
                "new"
            }
        );
        Ok(technique)
    }

    fn create_pass(
        &self,
        descriptor: &PassDescriptor,
        targets: &PassTargets,
        inputs: &[PassInput],
    ) -> Result<Pass, RhiError> {
        self.shared.check_alive()?;
        self.shared.ensure_live(descriptor.technique.id())?;
        self.check_pass_resources(targets, inputs)?;
        let requirements = validation::validate_pass(descriptor, targets, inputs)?;

        let pass = Pass::new(
            self.generate_pass_id(),
            descriptor.clone(),
            targets.clone(),
            inputs.to_vec(),
            requirements,
        );
        self.shared.latch(self.shared.backend.create_pass(&pass))?;
        self.shared.registry.lock().insert_pass(pass.clone());

        log::debug!(
            "{}: created {} {:?} ({} requirements)",
            self.shared.id,
            pass.id(),
            pass.label().unwrap_or_default(),
            pass.requirements().len()
        );
        Ok(pass)
    }

    fn create_batch(&self, pass: &Pass) -> Result<Batch, RhiError> {
        self.shared.check_alive()?;
        self.shared.ensure_live(pass.id())?;
        Ok(Batch::new(self.shared.id, Some(pass)))
    }

    fn create_transfer_batch(&self) -> Result<Batch, RhiError> {
        self.shared.check_alive()?;
        Ok(Batch::new(self.shared.id, None))
    }

    fn submit(&self, batch: Batch) -> Result<CompletionToken, RhiError> {
        self.shared.check_alive()?;
        if batch.device() != self.shared.id {
            return Err(ValidationError::ForeignBatch {
                owner: batch.device(),
                expected: self.shared.id,
            }
            .into());
        }
        if !batch.is_finished() {
            return Err(ValidationError::UnfinishedBatch.into());
        }
        let entities = batch.referenced_entities();
        let (value, report) = self.shared.with_next_value(&entities, |value| {
            match self.shared.backend.submit(&batch, value) {
                // The batch reached the queue; its token reports the loss.
                Err(RhiError::DeviceLost) => {
                    self.shared.mark_lost();
                    Ok(SubmitReport::default())
                }
                other => other,
            }
        })?;
        self.shared.submissions.fetch_add(1, Ordering::Relaxed);
        self.shared
            .commands_translated
            .fetch_add(report.commands, Ordering::Relaxed);
        self.shared
            .barriers_emitted
            .fetch_add(report.barriers_emitted, Ordering::Relaxed);
        self.shared
            .barriers_elided
            .fetch_add(report.barriers_elided, Ordering::Relaxed);

        log::debug!(
            "{}: submitted batch {:?} as #{} ({} commands, {} native, {}/{} barriers emitted/elided)",
            self.shared.id,
            batch.label().unwrap_or_default(),
            value,
            batch.len(),
            report.commands,
            report.barriers_emitted,
            report.barriers_elided
        );
        if let Err(e) = self.shared.refresh_completed() {
            log::debug!("{}: submission #{} observed {}", self.shared.id, value, e);
        }
        let fence = Arc::clone(&self.shared.fence);
        Ok(CompletionToken::new(self.shared.id, value, fence))
    }

    fn destroy(&self, entity: Entity) -> Result<(), RhiError> {
        self.shared.check_alive()?;
        validation::ensure_device(self.shared.id, entity)?;
        let (removed, last_use) = self
            .shared
            .registry
            .lock()
            .remove(entity)
            .ok_or(RhiError::NotFound(entity))?;
        self.shared.retire(removed, last_use);
        log::debug!(
            "{}: destroyed {}, release after submission #{}",
            self.shared.id,
            entity,
            last_use
        );
        self.shared.refresh_completed()?;
        Ok(())
    }

    fn read_resource(&self, resource: &Resource) -> Result<Vec<u8>, RhiError> {
        self.shared.check_alive()?;
        self.shared.ensure_live(resource.id())?;
        if !resource.usage().contains(ResourceUsage::COPY_SRC) {
            return Err(ValidationError::StateNotAllowed {
                state: ResourceState::CopySrc,
                usage: resource.usage(),
            }
            .into());
        }
        let (value, bytes) = self
            .shared
            .with_next_value(&[resource.id().into()], |value| {
                self.shared.backend.read_back(resource, value)
            })?;
        log::debug!(
            "{}: read back {} ({} bytes) as #{}",
            self.shared.id,
            resource.id(),
            bytes.len(),
            value
        );
        self.shared.refresh_completed()?;
        Ok(bytes)
    }

    fn maintain(&self) -> Result<usize, RhiError> {
        self.shared.check_alive()?;
        let completed = self.shared.latch(self.shared.backend.completed_value())?;
        self.shared.completed.fetch_max(completed, Ordering::AcqRel);
        let released = self
            .shared
            .release_completed(self.shared.completed.load(Ordering::Acquire));
        if released > 0 {
            log::debug!("{}: released {} native objects", self.shared.id, released);
        }
        Ok(released)
    }

    fn wait_idle(&self, timeout: Duration) -> Result<WaitStatus, RhiError> {
        self.shared.check_alive()?;
        let last = *self.shared.queue.lock();
        if self.shared.wait_value(last, timeout)? {
            Ok(WaitStatus::Signaled)
        } else {
            Ok(WaitStatus::TimedOut)
        }
    }

    fn stats(&self) -> DeviceStats {
        let [resources, layouts, meshes, techniques, passes] =
            self.shared.registry.lock().counts();
        DeviceStats {
            resources,
            layouts,
            meshes,
            techniques,
            passes,
            cached_pipelines: self.shared.cache.lock().len(),
            pending_releases: self.shared.retire.lock().len(),
            submissions: self.shared.submissions.load(Ordering::Relaxed),
            completed_submission: self.shared.completed.load(Ordering::Acquire),
            allocated_bytes: self.shared.allocated_bytes.load(Ordering::Acquire),
            peak_allocated_bytes: self.shared.peak_allocated_bytes.load(Ordering::Acquire),
            commands_translated: self.shared.commands_translated.load(Ordering::Relaxed),
            barriers_emitted: self.shared.barriers_emitted.load(Ordering::Relaxed),
            barriers_elided: self.shared.barriers_elided.load(Ordering::Relaxed),
        }
    }

    fn is_lost(&self) -> bool {
        self.shared.lost.load(Ordering::Acquire)
    }

    fn shutdown(&self) -> Result<(), RhiError> {
        self.shared.teardown()
    }
}
