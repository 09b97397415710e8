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

//! Batches: ordered, append-only command lists recorded against passes.
//!
//! A batch is recorded on any thread and handed to
//! [`Device::submit`](crate::renderer::Device::submit) afterwards. Recording validates
//! every command against the states the batch itself has established through inserted
//! barriers, so a finished batch is known to be well-formed before the backend ever
//! sees it.

use super::pass::Pass;
use crate::math::{Extent3D, Origin3D};
use crate::renderer::api::core::{DeviceId, Entity, ResourceId};
use crate::renderer::api::pipeline::{Mesh, TechniqueKind};
use crate::renderer::api::resource::{BarrierCommand, Resource, ResourceState};
use crate::renderer::error::{RhiError, StateConflictError, ValidationError};
use crate::renderer::validation;
use rustc_hash::{FxHashMap, FxHashSet};
use std::ops::Range;
use std::sync::Arc;

/// A buffer-to-buffer copy.
#[derive(Debug, Clone)]
pub struct BufferCopy {
    /// The buffer read from.
    pub src: Resource,
    /// Byte offset into the source.
    pub src_offset: u64,
    /// The buffer written to.
    pub dst: Resource,
    /// Byte offset into the destination.
    pub dst_offset: u64,
    /// Number of bytes to copy.
    pub size: u64,
}

/// A texel region of one subresource.
#[derive(Debug, Clone)]
pub struct TextureRegion {
    /// The texture.
    pub resource: Resource,
    /// The mip level.
    pub mip_level: u32,
    /// The array layer.
    pub array_layer: u32,
    /// The first texel of the region.
    pub origin: Origin3D,
}

impl TextureRegion {
    /// The region starting at the origin of mip 0, layer 0.
    pub fn whole(resource: &Resource) -> Self {
        Self {
            resource: resource.clone(),
            mip_level: 0,
            array_layer: 0,
            origin: Origin3D::ZERO,
        }
    }
}

/// A texture-to-texture copy.
#[derive(Debug, Clone)]
pub struct TextureCopy {
    /// Where texels are read.
    pub src: TextureRegion,
    /// Where texels are written.
    pub dst: TextureRegion,
    /// Size of the copied region.
    pub extent: Extent3D,
}

/// One recorded command.
#[derive(Debug, Clone)]
pub enum Command {
    /// Begins executing a pass: binds its technique, targets and inputs, and performs
    /// the target load operations.
    BindPass(Pass),
    /// A resource state transition.
    Barrier(BarrierCommand),
    /// A non-indexed draw without vertex buffers.
    Draw {
        /// Vertices to draw.
        vertices: Range<u32>,
        /// Instances to draw.
        instances: Range<u32>,
    },
    /// A draw of a mesh, indexed when the mesh has an index buffer.
    DrawMesh {
        /// The drawn mesh.
        mesh: Mesh,
        /// Instances to draw.
        instances: Range<u32>,
    },
    /// A compute dispatch.
    Dispatch {
        /// Number of work groups along each axis.
        groups: [u32; 3],
    },
    /// A buffer-to-buffer copy.
    CopyBuffer(BufferCopy),
    /// A texture-to-texture copy.
    CopyTexture(TextureCopy),
    /// An inline buffer update.
    UpdateBuffer {
        /// The written buffer.
        resource: Resource,
        /// Byte offset of the write.
        offset: u64,
        /// The bytes written.
        data: Arc<[u8]>,
    },
}

impl Command {
    /// A short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::BindPass(_) => "bind_pass",
            Command::Barrier(_) => "barrier",
            Command::Draw { .. } => "draw",
            Command::DrawMesh { .. } => "draw_mesh",
            Command::Dispatch { .. } => "dispatch",
            Command::CopyBuffer(_) => "copy_buffer",
            Command::CopyTexture(_) => "copy_texture",
            Command::UpdateBuffer { .. } => "update_buffer",
        }
    }
}

/// An ordered command sequence recorded against a pass.
///
/// Batches are append-only. Each command is validated as it is appended:
///
/// - every referenced entity must come from the batch's device;
/// - a command that needs a resource in some state succeeds only if a barrier inserted
///   earlier into *this* batch established that state (see [`Resource::observe`] to
///   carry over a state established by a previous submission);
/// - after [`finish`](Self::finish) every append fails with
///   [`RhiError::AppendAfterFinish`].
///
/// The pass given at creation is bound lazily by the first draw or dispatch, so
/// barriers recorded before it still precede the pass's load operations.
#[derive(Debug)]
pub struct Batch {
    device: DeviceId,
    label: Option<String>,
    commands: Vec<Command>,
    current: Option<Pass>,
    pass_open: bool,
    established: FxHashMap<ResourceId, ResourceState>,
    finished: bool,
}

impl Batch {
    /// Starts a batch for `pass`. Called by devices.
    pub fn new(device: DeviceId, pass: Option<&Pass>) -> Self {
        Self {
            device,
            label: pass.and_then(|p| p.label()).map(str::to_owned),
            commands: Vec::new(),
            current: pass.cloned(),
            pass_open: false,
            established: FxHashMap::default(),
            finished: false,
        }
    }

    /// The device the batch will be submitted to.
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// The label of the pass the batch was created for.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The pass draws and dispatches currently execute.
    pub fn current_pass(&self) -> Option<&Pass> {
        self.current.as_ref()
    }

    /// The recorded commands in insertion order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The state this batch has established for `resource`, if any.
    pub fn established_state(&self, resource: ResourceId) -> Option<ResourceState> {
        self.established.get(&resource).copied()
    }

    /// Appends a barrier.
    ///
    /// # Errors
    ///
    /// Fails with a [`StateConflictError`] if the batch already established a state for
    /// the resource and the barrier's `before` state differs from it.
    pub fn insert(&mut self, barrier: BarrierCommand) -> Result<(), RhiError> {
        self.ensure_recording()?;
        let resource = barrier.resource();
        validation::ensure_device(self.device, resource.id())?;
        if resource.is_released() {
            return Err(ValidationError::ReleasedResource(resource.id()).into());
        }
        if let Some(&established) = self.established.get(&resource.id()) {
            if established != barrier.before() {
                return Err(StateConflictError {
                    resource: resource.id(),
                    required: barrier.before(),
                    established: Some(established),
                }
                .into());
            }
        }
        self.established.insert(resource.id(), barrier.after());
        self.commands.push(Command::Barrier(barrier));
        Ok(())
    }

    /// Binds `pass`: subsequent draws or dispatches execute its technique against its
    /// targets and inputs. Load operations of the targets happen here.
    ///
    /// # Errors
    ///
    /// Fails if a target is not in its required state.
    pub fn bind(&mut self, pass: &Pass) -> Result<(), RhiError> {
        self.ensure_recording()?;
        validation::ensure_device(self.device, pass.id())?;
        for requirement in pass.target_requirements() {
            self.require(&requirement.resource, requirement.state)?;
        }
        self.record_bind(pass);
        Ok(())
    }

    /// Draws `vertices` for each of `instances` without vertex buffers.
    pub fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) -> Result<(), RhiError> {
        self.ensure_recording()?;
        let pass = self.prepare_pass(TechniqueKind::Render)?;
        if !pass.technique().descriptor().vertex_buffers.is_empty() {
            return Err(ValidationError::MissingVertexBuffers.into());
        }
        self.open_pass(&pass);
        self.commands.push(Command::Draw {
            vertices,
            instances,
        });
        Ok(())
    }

    /// Draws every element of `mesh` for each of `instances`.
    ///
    /// # Errors
    ///
    /// Fails if the mesh's vertex streams differ from the technique's vertex buffer
    /// layouts, or if its buffers are not in the vertex/index buffer states.
    pub fn draw_mesh(&mut self, mesh: &Mesh, instances: Range<u32>) -> Result<(), RhiError> {
        self.ensure_recording()?;
        validation::ensure_device(self.device, mesh.id())?;
        let pass = self.prepare_pass(TechniqueKind::Render)?;
        if !mesh.matches_layouts(&pass.technique().descriptor().vertex_buffers) {
            return Err(ValidationError::MeshLayoutMismatch.into());
        }
        for buffer in mesh.vertex_buffers() {
            self.require(&buffer.resource, ResourceState::VertexBuffer)?;
        }
        if let Some(index) = mesh.index_buffer() {
            self.require(&index.resource, ResourceState::IndexBuffer)?;
        }
        self.open_pass(&pass);
        self.commands.push(Command::DrawMesh {
            mesh: mesh.clone(),
            instances,
        });
        Ok(())
    }

    /// Dispatches `x * y * z` work groups of the bound compute technique.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), RhiError> {
        self.ensure_recording()?;
        let pass = self.prepare_pass(TechniqueKind::Compute)?;
        self.open_pass(&pass);
        self.commands.push(Command::Dispatch { groups: [x, y, z] });
        Ok(())
    }

    /// Copies bytes between two buffers.
    pub fn copy_buffer(&mut self, copy: BufferCopy) -> Result<(), RhiError> {
        self.ensure_recording()?;
        validation::ensure_device(self.device, copy.src.id())?;
        validation::ensure_device(self.device, copy.dst.id())?;
        validation::validate_buffer_copy(&copy)?;
        self.require(&copy.src, ResourceState::CopySrc)?;
        self.require(&copy.dst, ResourceState::CopyDst)?;
        self.commands.push(Command::CopyBuffer(copy));
        Ok(())
    }

    /// Copies a texel region between two textures.
    pub fn copy_texture(&mut self, copy: TextureCopy) -> Result<(), RhiError> {
        self.ensure_recording()?;
        validation::ensure_device(self.device, copy.src.resource.id())?;
        validation::ensure_device(self.device, copy.dst.resource.id())?;
        validation::validate_texture_copy(&copy)?;
        self.require(&copy.src.resource, ResourceState::CopySrc)?;
        self.require(&copy.dst.resource, ResourceState::CopyDst)?;
        self.commands.push(Command::CopyTexture(copy));
        Ok(())
    }

    /// Writes `data` into `resource` at `offset` when the batch executes.
    pub fn update_buffer(
        &mut self,
        resource: &Resource,
        offset: u64,
        data: impl Into<Arc<[u8]>>,
    ) -> Result<(), RhiError> {
        self.ensure_recording()?;
        validation::ensure_device(self.device, resource.id())?;
        let data = data.into();
        validation::validate_buffer_update(resource, offset, data.len() as u64)?;
        self.require(resource, ResourceState::CopyDst)?;
        self.commands.push(Command::UpdateBuffer {
            resource: resource.clone(),
            offset,
            data,
        });
        Ok(())
    }

    /// Ends recording. The batch becomes immutable and can be submitted.
    pub fn finish(&mut self) -> Result<(), RhiError> {
        self.ensure_recording()?;
        self.finished = true;
        log::debug!(
            "{}: finished batch {:?} with {} commands",
            self.device,
            self.label().unwrap_or_default(),
            self.commands.len()
        );
        Ok(())
    }

    /// Every entity the recorded commands reference, each listed once.
    pub fn referenced_entities(&self) -> Vec<Entity> {
        let mut seen = FxHashSet::default();
        let mut entities = Vec::new();
        let mut push = |entity: Entity| {
            if seen.insert(entity) {
                entities.push(entity);
            }
        };
        for command in &self.commands {
            match command {
                Command::BindPass(pass) => {
                    push(pass.id().into());
                    push(pass.technique().id().into());
                    push(pass.technique().layout().id().into());
                    for requirement in pass.requirements() {
                        push(requirement.resource.id().into());
                    }
                }
                Command::Barrier(barrier) => push(barrier.resource().id().into()),
                Command::DrawMesh { mesh, .. } => {
                    push(mesh.id().into());
                    for resource in mesh.resources() {
                        push(resource.id().into());
                    }
                }
                Command::CopyBuffer(copy) => {
                    push(copy.src.id().into());
                    push(copy.dst.id().into());
                }
                Command::CopyTexture(copy) => {
                    push(copy.src.resource.id().into());
                    push(copy.dst.resource.id().into());
                }
                Command::UpdateBuffer { resource, .. } => push(resource.id().into()),
                Command::Draw { .. } | Command::Dispatch { .. } => {}
            }
        }
        entities
    }

    fn ensure_recording(&self) -> Result<(), RhiError> {
        if self.finished {
            Err(RhiError::AppendAfterFinish)
        } else {
            Ok(())
        }
    }

    fn require(&self, resource: &Resource, state: ResourceState) -> Result<(), RhiError> {
        if resource.is_released() {
            return Err(ValidationError::ReleasedResource(resource.id()).into());
        }
        match self.established.get(&resource.id()) {
            Some(&established) if established == state => Ok(()),
            established => Err(StateConflictError {
                resource: resource.id(),
                required: state,
                established: established.copied(),
            }
            .into()),
        }
    }

    /// Returns the pass a draw or dispatch executes after checking every requirement of
    /// the pass. Nothing is recorded until [`Self::open_pass`].
    fn prepare_pass(&self, kind: TechniqueKind) -> Result<Pass, RhiError> {
        let pass = self
            .current
            .clone()
            .ok_or(ValidationError::NoPassBound)?;
        if pass.kind() != kind {
            return Err(ValidationError::PassKindMismatch {
                bound: pass.kind(),
                required: kind,
            }
            .into());
        }
        for requirement in pass.requirements() {
            self.require(&requirement.resource, requirement.state)?;
        }
        Ok(pass)
    }

    /// Binds `pass` lazily if no bind was recorded yet.
    fn open_pass(&mut self, pass: &Pass) {
        if !self.pass_open {
            self.record_bind(pass);
        }
    }

    fn record_bind(&mut self, pass: &Pass) {
        self.commands.push(Command::BindPass(pass.clone()));
        self.current = Some(pass.clone());
        self.pass_open = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::api::command::{PassDescriptor, PassInput, PassTargets};
    use crate::renderer::api::core::{LayoutId, PassId, TechniqueId};
    use crate::renderer::api::pipeline::{
        Layout, LayoutDescriptor, ShaderStage, ShaderStageFlags, SlotDescriptor, SlotKind,
        SlotRequirement, StageInterface, StageProgram, Technique, TechniqueDescriptor,
    };
    use crate::renderer::api::resource::{
        Format, ResourceDescriptor, ResourceUsage, View, ViewKind,
    };

    const DEVICE: DeviceId = DeviceId(11);

    fn storage_texture(index: u32) -> Resource {
        let desc = ResourceDescriptor::texture_2d(
            Some("storage"),
            16,
            16,
            Format::Rgba8Unorm,
            ResourceUsage::SHADER_WRITE | ResourceUsage::COPY_SRC,
        );
        validation::validate_resource(&desc).unwrap();
        Resource::new(ResourceId::new(DEVICE, index), &desc)
    }

    fn staging_buffer(index: u32) -> Resource {
        let desc = ResourceDescriptor::buffer(
            None,
            64,
            ResourceUsage::COPY_SRC | ResourceUsage::COPY_DST,
        );
        Resource::new(ResourceId::new(DEVICE, index), &desc)
    }

    fn compute_pass(target: &Resource) -> Pass {
        let slots = validation::validate_layout(&LayoutDescriptor {
            label: None,
            slots: vec![SlotDescriptor::new(
                0,
                SlotKind::StorageTexture,
                ShaderStageFlags::COMPUTE,
            )],
        })
        .unwrap();
        let layout = Layout::new(LayoutId::new(DEVICE, 0), None, slots);
        let desc = TechniqueDescriptor {
            label: Some("fill".into()),
            stages: vec![StageProgram {
                stage: ShaderStage::Compute,
                entry_point: "main".into(),
                bytecode: Arc::from(&[7u8][..]),
                interface: StageInterface {
                    slots: vec![SlotRequirement {
                        index: 0,
                        kind: SlotKind::StorageTexture,
                    }],
                    ..Default::default()
                },
            }],
            ..Default::default()
        };
        let technique = Technique::new(TechniqueId::new(DEVICE, 0), desc, &layout);
        let pass_desc = PassDescriptor::new(Some("fill"), &technique);
        let inputs = vec![PassInput::view(
            0,
            View::whole(target, ViewKind::UnorderedAccess).unwrap(),
        )];
        let targets = PassTargets::default();
        let requirements = validation::validate_pass(&pass_desc, &targets, &inputs).unwrap();
        Pass::new(PassId::new(DEVICE, 0), pass_desc, targets, inputs, requirements)
    }

    #[test]
    fn dispatch_without_barrier_is_a_state_conflict() {
        // --- ARRANGE ---
        let target = storage_texture(1);
        let pass = compute_pass(&target);
        let mut batch = Batch::new(DEVICE, Some(&pass));

        // --- ACT ---
        let result = batch.dispatch(4, 4, 1);

        // --- ASSERT ---
        assert_eq!(
            result.unwrap_err(),
            RhiError::StateConflict(StateConflictError {
                resource: target.id(),
                required: ResourceState::ShaderWrite,
                established: None,
            })
        );
        assert!(batch.is_empty());
    }

    #[test]
    fn pass_is_bound_lazily_after_leading_barriers() {
        // --- ARRANGE ---
        let target = storage_texture(1);
        let pass = compute_pass(&target);
        let mut batch = Batch::new(DEVICE, Some(&pass));

        // --- ACT ---
        batch
            .insert(target.transition(ResourceState::ShaderWrite).unwrap())
            .unwrap();
        batch.dispatch(4, 4, 1).unwrap();
        batch.dispatch(2, 2, 1).unwrap();
        batch.finish().unwrap();

        // --- ASSERT ---
        let names: Vec<_> = batch.commands().iter().map(Command::name).collect();
        assert_eq!(names, ["barrier", "bind_pass", "dispatch", "dispatch"]);
        assert_eq!(
            batch.established_state(target.id()),
            Some(ResourceState::ShaderWrite)
        );
    }

    #[test]
    fn a_rejected_dispatch_binds_nothing() {
        // --- ARRANGE ---
        let target = storage_texture(1);
        let pass = compute_pass(&target);
        let mut batch = Batch::new(DEVICE, Some(&pass));
        assert!(batch.dispatch(1, 1, 1).is_err());

        // --- ACT ---
        batch
            .insert(target.transition(ResourceState::ShaderWrite).unwrap())
            .unwrap();
        batch.dispatch(1, 1, 1).unwrap();

        // --- ASSERT ---
        let names: Vec<_> = batch.commands().iter().map(Command::name).collect();
        assert_eq!(names, ["barrier", "bind_pass", "dispatch"]);
    }

    #[test]
    fn barrier_before_state_must_match_established_state() {
        // --- ARRANGE ---
        let buffer = staging_buffer(2);
        let mut batch = Batch::new(DEVICE, None);
        batch
            .insert(buffer.transition(ResourceState::CopyDst).unwrap())
            .unwrap();
        // Declared outside the batch, so the batch never sees CopySrc.
        buffer.transition(ResourceState::CopySrc).unwrap();

        // --- ACT ---
        let result = batch.insert(buffer.transition(ResourceState::CopyDst).unwrap());

        // --- ASSERT ---
        assert!(matches!(result, Err(RhiError::StateConflict(_))));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn finished_batches_reject_appends() {
        let buffer = staging_buffer(2);
        let mut batch = Batch::new(DEVICE, None);
        batch.finish().unwrap();

        assert_eq!(
            batch.insert(buffer.observe()).unwrap_err(),
            RhiError::AppendAfterFinish
        );
        assert_eq!(batch.finish().unwrap_err(), RhiError::AppendAfterFinish);
    }

    #[test]
    fn transfer_batches_cannot_dispatch() {
        let mut batch = Batch::new(DEVICE, None);
        assert_eq!(
            batch.dispatch(1, 1, 1).unwrap_err(),
            RhiError::Validation(ValidationError::NoPassBound)
        );
    }

    #[test]
    fn buffer_copies_need_copy_states() {
        // --- ARRANGE ---
        let src = staging_buffer(2);
        let dst = staging_buffer(3);
        let mut batch = Batch::new(DEVICE, None);
        let copy = BufferCopy {
            src: src.clone(),
            src_offset: 0,
            dst: dst.clone(),
            dst_offset: 16,
            size: 32,
        };

        // --- ACT ---
        let early = batch.copy_buffer(copy.clone());
        batch
            .insert(src.transition(ResourceState::CopySrc).unwrap())
            .unwrap();
        batch
            .insert(dst.transition(ResourceState::CopyDst).unwrap())
            .unwrap();
        let late = batch.copy_buffer(copy);

        // --- ASSERT ---
        assert!(matches!(early, Err(RhiError::StateConflict(_))));
        assert!(late.is_ok());
        let referenced = batch.referenced_entities();
        assert_eq!(referenced, vec![Entity::from(src.id()), Entity::from(dst.id())]);
    }
}
