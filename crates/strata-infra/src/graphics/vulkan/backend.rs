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

//! The Vulkan translation of the Strata model.
//!
//! Layouts become one descriptor set layout each, techniques become pipelines for
//! dynamic rendering, and passes become image views, a descriptor set and the
//! rendering info their bind opens. Barriers become pipeline barriers computed from the
//! state the GPU will actually see each resource in, which the backend tracks per
//! resource in submission order. Completion is a timeline semaphore.

use super::command::*;
use super::conversions::{IntoVulkan, VkAccessScope};
use super::descriptor::DescriptorAllocator;
use super::driver::*;
use super::memory::{Allocation, MemoryAllocator};
use crate::graphics::common::{NativeBackend, PipelineKey, Retired, SubmitReport};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use strata_core::math::{Extent3D, LinearRgba, Origin3D};
use strata_core::renderer::*;
use strata_core::RhiError;

/// How long a read-back waits for its copy before giving up.
const READBACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
enum NativeObject {
    Buffer(VkHandle),
    Image { image: VkHandle, aspect: VkImageAspect },
}

impl NativeObject {
    fn handle(self) -> VkHandle {
        match self {
            NativeObject::Buffer(buffer) => buffer,
            NativeObject::Image { image, .. } => image,
        }
    }
}

#[derive(Debug)]
struct ResourceEntry {
    object: NativeObject,
    allocation: Allocation,
    kind: ResourceKind,
    format: Format,
    /// The state the resource is in once everything submitted so far has executed.
    native_state: ResourceState,
}

/// Initial data waiting in a staging buffer for the next submission.
#[derive(Debug)]
struct Upload {
    resource: ResourceId,
    buffer: VkHandle,
    allocation: Allocation,
}

#[derive(Debug)]
struct LayoutEntry {
    set_layout: VkHandle,
    pipeline_layout: VkHandle,
    /// `None` for layouts without slots, which need no descriptor set.
    descriptors: Option<DescriptorAllocator>,
}

#[derive(Debug)]
struct PipelineEntry {
    pipeline: VkHandle,
    modules: Vec<VkHandle>,
    bind_point: VkPipelineBindPoint,
    layout: VkHandle,
    blend_constants: [f32; 4],
}

#[derive(Debug)]
struct PassEntry {
    pipeline: PipelineKey,
    layout: LayoutId,
    descriptor_set: Option<(VkHandle, VkHandle)>,
    rendering: Option<VkRenderingInfo>,
    /// Image views created for the pass, destroyed with it.
    views: Vec<VkHandle>,
}

/// Native objects owned by the backend, guarded together.
#[derive(Debug, Default)]
struct Objects {
    resources: FxHashMap<ResourceId, ResourceEntry>,
    layouts: FxHashMap<LayoutId, LayoutEntry>,
    pipelines: FxHashMap<PipelineKey, PipelineEntry>,
    passes: FxHashMap<PassId, PassEntry>,
    uploads: Vec<Upload>,
    /// Staging buffers of submitted work, freed once their submission completed.
    staging: Vec<(u64, VkHandle, Allocation)>,
    memory: MemoryAllocator,
}

/// Resource states as a submission being recorded leaves them. Committed to the
/// resource entries once the submission reached the queue.
type PendingStates = FxHashMap<ResourceId, ResourceState>;

/// The Vulkan implementation of [`NativeBackend`].
pub struct VulkanBackend {
    driver: Arc<dyn VulkanDriver>,
    debug: bool,
    objects: Mutex<Objects>,
}

impl fmt::Debug for VulkanBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBackend")
            .field("driver", &self.driver)
            .field("debug", &self.debug)
            .finish_non_exhaustive()
    }
}

impl VulkanBackend {
    /// Creates a backend driving `driver`. With `debug` set, validation messages are
    /// collected after every submission and logged.
    pub fn new(driver: Arc<dyn VulkanDriver>, debug: bool) -> Self {
        Self {
            driver,
            debug,
            objects: Mutex::new(Objects::default()),
        }
    }

    /// The driver the backend records into.
    pub fn driver(&self) -> &Arc<dyn VulkanDriver> {
        &self.driver
    }

    /// Bytes of device local memory held by resources.
    pub fn device_memory(&self) -> u64 {
        self.objects
            .lock()
            .memory
            .allocated(VkMemoryLocation::DeviceLocal)
    }

    fn missing(what: impl fmt::Display) -> RhiError {
        RhiError::Backend(format!("no native object for {what}"))
    }

    fn report_validation(&self) {
        if !self.debug {
            return;
        }
        for message in self.driver.drain_validation_messages() {
            log::warn!("Vulkan validation: {}", message);
        }
    }

    fn subresource_range(aspect: VkImageAspect, range: SubresourceRange) -> VkImageSubresourceRange {
        VkImageSubresourceRange {
            aspect,
            base_mip_level: range.base_mip_level,
            level_count: range.mip_level_count,
            base_array_layer: range.base_array_layer,
            layer_count: range.array_layer_count,
        }
    }

    fn layers(aspect: VkImageAspect, mip_level: u32, array_layer: u32) -> VkImageSubresourceLayers {
        VkImageSubresourceLayers {
            aspect,
            mip_level,
            base_array_layer: array_layer,
            layer_count: 1,
        }
    }

    fn state_of(objects: &Objects, states: &PendingStates, id: ResourceId) -> Result<ResourceState, RhiError> {
        match states.get(&id) {
            Some(state) => Ok(*state),
            None => objects
                .resources
                .get(&id)
                .map(|entry| entry.native_state)
                .ok_or_else(|| Self::missing(id)),
        }
    }

    /// Records the barrier moving `id` into `after`.
    /// ## Returns
    /// `false` if the resource already is in `after` and no write has to be made
    /// visible, in which case nothing is recorded.
    fn barrier(
        objects: &Objects,
        states: &mut PendingStates,
        recorder: &mut CommandRecorder,
        id: ResourceId,
        after: ResourceState,
    ) -> Result<bool, RhiError> {
        let entry = objects.resources.get(&id).ok_or_else(|| Self::missing(id))?;
        let before = Self::state_of(objects, states, id)?;
        if before == after && !after.is_write() {
            return Ok(false);
        }
        let src: VkAccessScope = before.into_vk();
        let dst: VkAccessScope = after.into_vk();
        let target = match entry.object {
            NativeObject::Buffer(buffer) => VkBarrierTarget::Buffer { buffer },
            NativeObject::Image { image, aspect } => VkBarrierTarget::Image {
                image,
                old_layout: src.layout,
                new_layout: dst.layout,
                range: VkImageSubresourceRange {
                    aspect,
                    base_mip_level: 0,
                    level_count: entry.kind.mip_level_count(),
                    base_array_layer: 0,
                    layer_count: entry.kind.array_layer_count(),
                },
            },
        };
        recorder.suspend();
        recorder.record(VkCommand::PipelineBarrier(VkBarrier {
            src_stage: src.stage,
            src_access: src.access,
            dst_stage: dst.stage,
            dst_access: dst.access,
            target,
        }));
        states.insert(id, after);
        Ok(true)
    }

    /// Every (mip level, array layer, packed offset, extent) of a texture.
    fn subresources(kind: &ResourceKind, format: Format) -> Vec<(u32, u32, u64, Extent3D)> {
        let mut out = Vec::new();
        for layer in 0..kind.array_layer_count() {
            for mip in 0..kind.mip_level_count() {
                if let Some(footprint) = kind.footprint(format, mip, layer) {
                    out.push((mip, layer, footprint.offset, footprint.extent));
                }
            }
        }
        out
    }

    fn extent3(extent: Extent3D) -> [u32; 3] {
        [extent.width, extent.height, extent.depth_or_array_layers]
    }

    /// Records the copies of pending initial data in front of everything else.
    fn record_uploads(
        objects: &Objects,
        states: &mut PendingStates,
        recorder: &mut CommandRecorder,
    ) -> Result<(), RhiError> {
        for upload in &objects.uploads {
            let entry = objects
                .resources
                .get(&upload.resource)
                .ok_or_else(|| Self::missing(upload.resource))?;
            Self::barrier(objects, states, recorder, upload.resource, ResourceState::CopyDst)?;
            match entry.object {
                NativeObject::Buffer(buffer) => recorder.record(VkCommand::CopyBuffer {
                    src: upload.buffer,
                    dst: buffer,
                    region: VkBufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: entry.kind.byte_size(entry.format),
                    },
                }),
                NativeObject::Image { image, aspect } => {
                    for (mip, layer, offset, extent) in Self::subresources(&entry.kind, entry.format) {
                        recorder.record(VkCommand::CopyBufferToImage {
                            buffer: upload.buffer,
                            image,
                            layout: VkImageLayout::TRANSFER_DST_OPTIMAL,
                            region: VkBufferImageCopy {
                                buffer_offset: offset,
                                image_subresource: Self::layers(aspect, mip, layer),
                                image_offset: [0; 3],
                                image_extent: Self::extent3(extent),
                            },
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Applies what a submission that reached the queue did to the tracked state.
    fn commit(objects: &mut Objects, states: PendingStates, value: u64) {
        for (id, state) in states {
            if let Some(entry) = objects.resources.get_mut(&id) {
                entry.native_state = state;
            }
        }
        let uploads = std::mem::take(&mut objects.uploads);
        objects.staging.extend(
            uploads
                .into_iter()
                .map(|upload| (value, upload.buffer, upload.allocation)),
        );
    }

    fn build_pipeline(
        &self,
        objects: &Objects,
        technique: &Technique,
        created: &mut Vec<VkHandle>,
    ) -> Result<PipelineEntry, RhiError> {
        let descriptor = technique.descriptor();
        let layout = objects
            .layouts
            .get(&technique.layout().id())
            .ok_or_else(|| Self::missing(technique.layout().id()))?
            .pipeline_layout;

        let mut stages = Vec::with_capacity(descriptor.stages.len());
        for program in &descriptor.stages {
            let module = self.driver.create_shader_module(&program.bytecode)?;
            created.push(module);
            stages.push(VkPipelineShaderStage {
                stage: program.stage.into_vk(),
                module,
                entry_point: program.entry_point.clone(),
            });
        }
        let modules = stages.iter().map(|s| s.module).collect();

        let (pipeline, bind_point) = match technique.kind() {
            TechniqueKind::Compute => {
                let stage = stages
                    .into_iter()
                    .next()
                    .ok_or_else(|| Self::missing("compute stage"))?;
                let info = VkComputePipelineCreateInfo { stage, layout };
                (
                    self.driver.create_compute_pipeline(&info)?,
                    VkPipelineBindPoint::COMPUTE,
                )
            }
            TechniqueKind::Render => {
                let info = VkGraphicsPipelineCreateInfo {
                    stages,
                    vertex_bindings: descriptor
                        .vertex_buffers
                        .iter()
                        .enumerate()
                        .map(|(binding, buffer)| VkVertexInputBinding {
                            binding: binding as u32,
                            stride: buffer.stride,
                            per_instance: buffer.step_mode == VertexStepMode::Instance,
                        })
                        .collect(),
                    vertex_attributes: descriptor
                        .vertex_buffers
                        .iter()
                        .enumerate()
                        .flat_map(|(binding, buffer)| {
                            buffer.attributes.iter().map(move |attribute| VkVertexInputAttribute {
                                location: attribute.location,
                                binding: binding as u32,
                                format: attribute.format.into_vk(),
                                offset: attribute.offset,
                            })
                        })
                        .collect(),
                    topology: descriptor.raster.topology.into_vk(),
                    rasterization: descriptor.raster.into_vk(),
                    samples: descriptor.sample_count,
                    alpha_to_coverage_enable: descriptor.blend.alpha_to_coverage,
                    depth_stencil: descriptor.depth_stencil.map(IntoVulkan::into_vk),
                    color_blend: descriptor.blend.into_vk(),
                    color_formats: descriptor
                        .color_formats
                        .iter()
                        .map(|&f| f.into_vk())
                        .collect(),
                    depth_format: descriptor.depth_format.map(|f| f.into_vk()),
                    layout,
                };
                (
                    self.driver.create_graphics_pipeline(&info)?,
                    VkPipelineBindPoint::GRAPHICS,
                )
            }
        };

        Ok(PipelineEntry {
            pipeline,
            modules,
            bind_point,
            layout,
            blend_constants: descriptor.blend.constant.to_array(),
        })
    }

    fn create_view(
        &self,
        objects: &Objects,
        view: &View,
        created: &mut Vec<VkHandle>,
    ) -> Result<VkHandle, RhiError> {
        let entry = objects
            .resources
            .get(&view.resource_id())
            .ok_or_else(|| Self::missing(view.resource_id()))?;
        let NativeObject::Image { image, .. } = entry.object else {
            return Err(Self::missing(format!("image of {}", view.resource_id())));
        };
        let aspect: VkImageAspect = view.format().into_vk();
        let handle = self.driver.create_image_view(&VkImageViewCreateInfo {
            image,
            format: view.format().into_vk(),
            range: Self::subresource_range(aspect, view.range()),
        })?;
        created.push(handle);
        Ok(handle)
    }

    fn load_op<V: Copy>(load: LoadOp<V>) -> (VkLoadOp, Option<V>) {
        match load {
            LoadOp::Load => (VkLoadOp::Load, None),
            LoadOp::Clear(value) => (VkLoadOp::Clear, Some(value)),
        }
    }

    fn build_rendering(
        &self,
        objects: &Objects,
        pass: &Pass,
        created: &mut Vec<VkHandle>,
    ) -> Result<VkRenderingInfo, RhiError> {
        let targets = pass.targets();
        let mut colors = Vec::with_capacity(targets.colors.len());
        for color in &targets.colors {
            let view = self.create_view(objects, &color.view, created)?;
            let (load_op, clear) = Self::load_op(color.load);
            colors.push(VkColorAttachment {
                view,
                layout: VkImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load_op,
                clear: clear.map(LinearRgba::to_array).unwrap_or_default(),
                store: color.store == StoreOp::Store,
            });
        }
        let depth = match &targets.depth {
            Some(target) => {
                let view = self.create_view(objects, &target.view, created)?;
                let read_only = target.view.kind() == ViewKind::ReadOnlyDepth;
                let (depth_load_op, clear_depth) = if read_only {
                    (VkLoadOp::Load, None)
                } else {
                    Self::load_op(target.depth_load)
                };
                let (stencil_load_op, clear_stencil) =
                    if read_only || !target.view.format().has_stencil() {
                        (VkLoadOp::Load, None)
                    } else {
                        Self::load_op(target.stencil_load)
                    };
                Some(VkDepthAttachment {
                    view,
                    layout: if read_only {
                        VkImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
                    } else {
                        VkImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                    },
                    depth_load_op,
                    clear_depth: clear_depth.unwrap_or(1.0),
                    stencil_load_op,
                    clear_stencil: clear_stencil.unwrap_or(0),
                    store: target.store == StoreOp::Store && !read_only,
                })
            }
            None => None,
        };
        let extent = pass.extent().unwrap_or_default();
        Ok(VkRenderingInfo {
            extent: [extent.width, extent.height],
            colors,
            depth,
        })
    }

    fn build_descriptor_writes(
        &self,
        objects: &Objects,
        pass: &Pass,
        created: &mut Vec<VkHandle>,
    ) -> Result<Vec<VkDescriptorWrite>, RhiError> {
        let layout = pass.technique().layout();
        let mut writes = Vec::with_capacity(pass.inputs().len());
        for input in pass.inputs() {
            let slot = layout
                .slot_at(input.slot)
                .ok_or_else(|| Self::missing(format!("slot {}", input.slot)))?;
            let info = match &input.binding {
                InputBinding::View(view) => VkDescriptorInfo::Image {
                    view: self.create_view(objects, view, created)?,
                    layout: match slot.kind {
                        SlotKind::StorageTexture => VkImageLayout::GENERAL,
                        _ => VkImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                },
                InputBinding::Buffer {
                    resource,
                    offset,
                    size,
                } => {
                    let entry = objects
                        .resources
                        .get(&resource.id())
                        .ok_or_else(|| Self::missing(resource.id()))?;
                    VkDescriptorInfo::Buffer {
                        buffer: entry.object.handle(),
                        offset: *offset,
                        range: size.unwrap_or(resource.byte_size().saturating_sub(*offset)),
                    }
                }
            };
            writes.push(VkDescriptorWrite {
                binding: slot.index,
                descriptor_type: slot.kind.into_vk(),
                info,
            });
        }
        Ok(writes)
    }

    /// Records the pipeline, dynamic state and descriptor set of `pass`.
    fn bind_pass(recorder: &mut CommandRecorder, pass: &PassEntry, pipeline: &PipelineEntry) {
        recorder.end_rendering();
        if let Some(rendering) = &pass.rendering {
            recorder.begin_rendering(rendering.clone());
        }
        recorder.record(VkCommand::BindPipeline {
            bind_point: pipeline.bind_point,
            pipeline: pipeline.pipeline,
        });
        if let Some(rendering) = &pass.rendering {
            let [width, height] = rendering.extent;
            recorder.record(VkCommand::SetViewport {
                width: width as f32,
                height: height as f32,
            });
            recorder.record(VkCommand::SetScissor { width, height });
            recorder.record(VkCommand::SetBlendConstants(pipeline.blend_constants));
        }
        if let Some((_, set)) = pass.descriptor_set {
            recorder.record(VkCommand::BindDescriptorSets {
                bind_point: pipeline.bind_point,
                layout: pipeline.layout,
                sets: vec![set],
            });
        }
    }

    fn translate(
        objects: &Objects,
        batch: &Batch,
        states: &mut PendingStates,
        recorder: &mut CommandRecorder,
    ) -> Result<SubmitReport, RhiError> {
        let buffer_of = |id: ResourceId| match objects.resources.get(&id) {
            Some(ResourceEntry {
                object: NativeObject::Buffer(buffer),
                ..
            }) => Ok(*buffer),
            _ => Err(Self::missing(id)),
        };
        let image_of = |id: ResourceId| match objects.resources.get(&id) {
            Some(ResourceEntry {
                object: NativeObject::Image { image, aspect },
                ..
            }) => Ok((*image, *aspect)),
            _ => Err(Self::missing(id)),
        };
        let mut report = SubmitReport::default();

        for command in batch.commands() {
            match command {
                Command::BindPass(pass) => {
                    let entry = objects
                        .passes
                        .get(&pass.id())
                        .ok_or_else(|| Self::missing(pass.id()))?;
                    let pipeline = objects
                        .pipelines
                        .get(&entry.pipeline)
                        .ok_or_else(|| Self::missing(pass.technique().id()))?;
                    Self::bind_pass(recorder, entry, pipeline);
                }
                Command::Barrier(barrier) => {
                    let id = barrier.resource().id();
                    if Self::barrier(objects, states, recorder, id, barrier.after())? {
                        report.barriers_emitted += 1;
                    } else {
                        report.barriers_elided += 1;
                    }
                }
                Command::Draw {
                    vertices,
                    instances,
                } => {
                    recorder.resume();
                    recorder.record(VkCommand::Draw {
                        vertex_count: vertices.len() as u32,
                        instance_count: instances.len() as u32,
                        first_vertex: vertices.start,
                        first_instance: instances.start,
                    });
                }
                Command::DrawMesh { mesh, instances } => {
                    recorder.resume();
                    let mut buffers = Vec::with_capacity(mesh.vertex_buffers().len());
                    for stream in mesh.vertex_buffers() {
                        buffers.push((buffer_of(stream.resource.id())?, stream.offset));
                    }
                    recorder.record(VkCommand::BindVertexBuffers {
                        first_binding: 0,
                        buffers,
                    });
                    match mesh.index_buffer() {
                        Some(index) => {
                            recorder.record(VkCommand::BindIndexBuffer {
                                buffer: buffer_of(index.resource.id())?,
                                offset: index.offset,
                                index_type: index.format.into_vk(),
                            });
                            recorder.record(VkCommand::DrawIndexed {
                                index_count: index.count,
                                instance_count: instances.len() as u32,
                                first_index: 0,
                                vertex_offset: 0,
                                first_instance: instances.start,
                            });
                        }
                        None => recorder.record(VkCommand::Draw {
                            vertex_count: mesh.vertex_count(),
                            instance_count: instances.len() as u32,
                            first_vertex: 0,
                            first_instance: instances.start,
                        }),
                    }
                }
                Command::Dispatch { groups } => recorder.record(VkCommand::Dispatch {
                    x: groups[0],
                    y: groups[1],
                    z: groups[2],
                }),
                Command::CopyBuffer(copy) => {
                    recorder.suspend();
                    recorder.record(VkCommand::CopyBuffer {
                        src: buffer_of(copy.src.id())?,
                        dst: buffer_of(copy.dst.id())?,
                        region: VkBufferCopy {
                            src_offset: copy.src_offset,
                            dst_offset: copy.dst_offset,
                            size: copy.size,
                        },
                    });
                }
                Command::CopyTexture(copy) => {
                    recorder.suspend();
                    let (src, src_aspect) = image_of(copy.src.resource.id())?;
                    let (dst, dst_aspect) = image_of(copy.dst.resource.id())?;
                    let layout_of = |id: ResourceId| -> Result<VkImageLayout, RhiError> {
                        let scope: VkAccessScope = Self::state_of(objects, states, id)?.into_vk();
                        Ok(scope.layout)
                    };
                    let origin = |o: Origin3D| [o.x, o.y, o.z];
                    recorder.record(VkCommand::CopyImage {
                        src,
                        src_layout: layout_of(copy.src.resource.id())?,
                        dst,
                        dst_layout: layout_of(copy.dst.resource.id())?,
                        region: VkImageCopy {
                            src_subresource: Self::layers(
                                src_aspect,
                                copy.src.mip_level,
                                copy.src.array_layer,
                            ),
                            src_offset: origin(copy.src.origin),
                            dst_subresource: Self::layers(
                                dst_aspect,
                                copy.dst.mip_level,
                                copy.dst.array_layer,
                            ),
                            dst_offset: origin(copy.dst.origin),
                            extent: Self::extent3(copy.extent),
                        },
                    });
                }
                Command::UpdateBuffer {
                    resource,
                    offset,
                    data,
                } => {
                    recorder.suspend();
                    recorder.record(VkCommand::UpdateBuffer {
                        buffer: buffer_of(resource.id())?,
                        offset: *offset,
                        data: Arc::clone(data),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Creates a host visible buffer of `size` bytes.
    fn create_staging(
        &self,
        objects: &mut Objects,
        size: u64,
        usage: VkBufferUsage,
    ) -> Result<(VkHandle, Allocation), RhiError> {
        let buffer = self
            .driver
            .create_buffer(&VkBufferCreateInfo { size, usage })?;
        match objects
            .memory
            .allocate_for(self.driver.as_ref(), buffer, VkMemoryLocation::HostVisible)
        {
            Ok(allocation) => Ok((buffer, allocation)),
            Err(e) => {
                self.driver.destroy(buffer);
                Err(e.into())
            }
        }
    }

    fn destroy_staging(&self, objects: &mut Objects, buffer: VkHandle, allocation: Allocation) {
        self.driver.destroy(buffer);
        objects.memory.free(self.driver.as_ref(), allocation);
    }

    /// Records and submits the copy of `id` into a new staging buffer.
    fn submit_read_back(
        &self,
        objects: &mut Objects,
        id: ResourceId,
        value: u64,
    ) -> Result<(VkHandle, Allocation, u64), RhiError> {
        let (object, kind, format, previous) = {
            let entry = objects.resources.get(&id).ok_or_else(|| Self::missing(id))?;
            (entry.object, entry.kind, entry.format, entry.native_state)
        };
        let size = kind.byte_size(format);
        let (staging, allocation) = self.create_staging(objects, size, VkBufferUsage::TRANSFER_DST)?;

        let mut states = PendingStates::default();
        let mut recorder = CommandRecorder::new();
        let recorded = Self::record_uploads(objects, &mut states, &mut recorder).and_then(|()| {
            let previous = Self::state_of(objects, &states, id).unwrap_or(previous);
            Self::barrier(objects, &mut states, &mut recorder, id, ResourceState::CopySrc)?;
            match object {
                NativeObject::Buffer(buffer) => recorder.record(VkCommand::CopyBuffer {
                    src: buffer,
                    dst: staging,
                    region: VkBufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size,
                    },
                }),
                NativeObject::Image { image, aspect } => {
                    for (mip, layer, offset, extent) in Self::subresources(&kind, format) {
                        recorder.record(VkCommand::CopyImageToBuffer {
                            image,
                            layout: VkImageLayout::TRANSFER_SRC_OPTIMAL,
                            buffer: staging,
                            region: VkBufferImageCopy {
                                buffer_offset: offset,
                                image_subresource: Self::layers(aspect, mip, layer),
                                image_offset: [0; 3],
                                image_extent: Self::extent3(extent),
                            },
                        });
                    }
                }
            }
            if previous != ResourceState::Undefined {
                Self::barrier(objects, &mut states, &mut recorder, id, previous)?;
            }
            Ok(())
        });
        let submitted = recorded.and_then(|()| {
            let label = format!("read back {id}");
            Ok(self
                .driver
                .queue_submit(recorder.finish(Some(&label)), value)?)
        });
        match submitted {
            Ok(()) => {
                Self::commit(objects, states, value);
                Ok((staging, allocation, size))
            }
            Err(e) => {
                self.destroy_staging(objects, staging, allocation);
                Err(e)
            }
        }
    }
}

impl NativeBackend for VulkanBackend {
    const KIND: BackendType = BackendType::Vulkan;

    fn create_resource(
        &self,
        resource: &Resource,
        descriptor: &ResourceDescriptor,
    ) -> Result<u64, RhiError> {
        let mut objects = self.objects.lock();
        let object = match descriptor.kind {
            ResourceKind::Buffer { size } => {
                let mut usage: VkBufferUsage = descriptor.usage.into_vk();
                if descriptor.initial_data.is_some() {
                    usage |= VkBufferUsage::TRANSFER_DST;
                }
                NativeObject::Buffer(self.driver.create_buffer(&VkBufferCreateInfo { size, usage })?)
            }
            ResourceKind::Texture {
                dimension,
                extent,
                mip_level_count,
                sample_count,
            } => {
                let mut usage: VkImageUsage = descriptor.usage.into_vk();
                if descriptor.initial_data.is_some() {
                    usage |= VkImageUsage::TRANSFER_DST;
                }
                let volumetric = dimension == TextureDimension::D3;
                let info = VkImageCreateInfo {
                    image_type: dimension.into_vk(),
                    format: descriptor.format.into_vk(),
                    extent: [
                        extent.width,
                        extent.height,
                        if volumetric { extent.depth_or_array_layers } else { 1 },
                    ],
                    mip_levels: mip_level_count,
                    array_layers: if volumetric { 1 } else { extent.depth_or_array_layers },
                    samples: sample_count,
                    usage,
                };
                NativeObject::Image {
                    image: self.driver.create_image(&info)?,
                    aspect: descriptor.format.into_vk(),
                }
            }
        };
        let allocation = match objects.memory.allocate_for(
            self.driver.as_ref(),
            object.handle(),
            VkMemoryLocation::DeviceLocal,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.driver.destroy(object.handle());
                return Err(e.into());
            }
        };

        if let Some(data) = &descriptor.initial_data {
            let staged = self
                .create_staging(&mut objects, data.len() as u64, VkBufferUsage::TRANSFER_SRC)
                .and_then(|(buffer, staging)| {
                    match self.driver.write_memory(staging.memory, staging.offset, data) {
                        Ok(()) => Ok((buffer, staging)),
                        Err(e) => {
                            self.destroy_staging(&mut objects, buffer, staging);
                            Err(e.into())
                        }
                    }
                });
            match staged {
                Ok((buffer, staging)) => objects.uploads.push(Upload {
                    resource: resource.id(),
                    buffer,
                    allocation: staging,
                }),
                Err(e) => {
                    self.driver.destroy(object.handle());
                    objects.memory.free(self.driver.as_ref(), allocation);
                    return Err(e);
                }
            }
        }

        objects.resources.insert(
            resource.id(),
            ResourceEntry {
                object,
                allocation,
                kind: descriptor.kind,
                format: descriptor.format,
                native_state: ResourceState::Undefined,
            },
        );
        Ok(allocation.size)
    }

    fn create_layout(&self, layout: &Layout) -> Result<(), RhiError> {
        let bindings: Vec<VkDescriptorSetLayoutBinding> = layout
            .slots()
            .iter()
            .map(|slot| VkDescriptorSetLayoutBinding {
                binding: slot.index,
                descriptor_type: slot.kind.into_vk(),
                stage_flags: slot.visibility.into_vk(),
            })
            .collect();
        let set_layout = self.driver.create_descriptor_set_layout(&bindings)?;
        let pipeline_layout = match self.driver.create_pipeline_layout(&[set_layout]) {
            Ok(pipeline_layout) => pipeline_layout,
            Err(e) => {
                self.driver.destroy(set_layout);
                return Err(e.into());
            }
        };
        let descriptors = (!bindings.is_empty()).then(|| DescriptorAllocator::new(&bindings));
        self.objects.lock().layouts.insert(
            layout.id(),
            LayoutEntry {
                set_layout,
                pipeline_layout,
                descriptors,
            },
        );
        Ok(())
    }

    fn create_pipeline(&self, key: PipelineKey, technique: &Technique) -> Result<(), RhiError> {
        let mut objects = self.objects.lock();
        let mut created = Vec::new();
        match self.build_pipeline(&objects, technique, &mut created) {
            Ok(entry) => {
                log::debug!(
                    "Vulkan: created pipeline {:?} ({} modules) for {:#018x}",
                    entry.pipeline,
                    entry.modules.len(),
                    key.fingerprint
                );
                objects.pipelines.insert(key, entry);
                Ok(())
            }
            Err(e) => {
                for object in created {
                    self.driver.destroy(object);
                }
                Err(e)
            }
        }
    }

    fn create_pass(&self, pass: &Pass) -> Result<(), RhiError> {
        let mut objects = self.objects.lock();
        let mut created = Vec::new();
        let built = (|| {
            let rendering = match pass.kind() {
                TechniqueKind::Render => Some(self.build_rendering(&objects, pass, &mut created)?),
                TechniqueKind::Compute => None,
            };
            let writes = self.build_descriptor_writes(&objects, pass, &mut created)?;
            Ok::<_, RhiError>((rendering, writes))
        })();
        let (rendering, writes) = match built {
            Ok(built) => built,
            Err(e) => {
                for view in created {
                    self.driver.destroy(view);
                }
                return Err(e);
            }
        };

        let layout_id = pass.technique().layout().id();
        let descriptor_set = {
            let driver = self.driver.as_ref();
            let layout = objects
                .layouts
                .get_mut(&layout_id)
                .ok_or_else(|| Self::missing(layout_id));
            let allocated = layout.and_then(|layout| {
                let set_layout = layout.set_layout;
                match layout.descriptors.as_mut() {
                    Some(descriptors) => {
                        let (pool, set) = descriptors.allocate(driver, set_layout)?;
                        if let Err(e) = driver.update_descriptor_set(set, &writes) {
                            descriptors.free(driver, pool, set);
                            return Err(e.into());
                        }
                        Ok(Some((pool, set)))
                    }
                    None => Ok(None),
                }
            });
            match allocated {
                Ok(set) => set,
                Err(e) => {
                    for view in created {
                        self.driver.destroy(view);
                    }
                    return Err(e);
                }
            }
        };

        objects.passes.insert(
            pass.id(),
            PassEntry {
                pipeline: PipelineKey::of(pass.technique()),
                layout: layout_id,
                descriptor_set,
                rendering,
                views: created,
            },
        );
        Ok(())
    }

    fn submit(&self, batch: &Batch, value: u64) -> Result<SubmitReport, RhiError> {
        let mut objects = self.objects.lock();
        let mut states = PendingStates::default();
        let mut recorder = CommandRecorder::new();
        Self::record_uploads(&objects, &mut states, &mut recorder)?;
        let mut report = Self::translate(&objects, batch, &mut states, &mut recorder)?;
        report.commands = recorder.len() as u64;

        let buffer = recorder.finish(batch.label());
        if self.debug {
            let names: Vec<&str> = buffer.commands.iter().map(VkCommand::name).collect();
            log::debug!("Vulkan: submission #{} records {:?}", value, names);
        }
        self.driver.queue_submit(buffer, value)?;
        Self::commit(&mut objects, states, value);
        drop(objects);
        self.report_validation();
        Ok(report)
    }

    fn read_back(&self, resource: &Resource, value: u64) -> Result<Vec<u8>, RhiError> {
        let (staging, allocation, size) = {
            let mut objects = self.objects.lock();
            self.submit_read_back(&mut objects, resource.id(), value)?
        };
        self.report_validation();
        let landed = self.driver.wait_semaphore(value, READBACK_TIMEOUT);
        if !matches!(landed, Ok(true)) {
            // The copy may still land; free the buffer once it has.
            self.objects.lock().staging.push((value, staging, allocation));
            landed?;
            return Err(RhiError::Backend(format!(
                "read back of {} timed out",
                resource.id()
            )));
        }
        let bytes = self
            .driver
            .read_memory(allocation.memory, allocation.offset, size);
        let mut objects = self.objects.lock();
        self.destroy_staging(&mut objects, staging, allocation);
        Ok(bytes?)
    }

    fn completed_value(&self) -> Result<u64, RhiError> {
        let completed = self.driver.semaphore_value()?;
        let mut objects = self.objects.lock();
        let (done, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut objects.staging)
            .into_iter()
            .partition(|(value, _, _)| *value <= completed);
        objects.staging = pending;
        for (_, buffer, allocation) in done {
            self.destroy_staging(&mut objects, buffer, allocation);
        }
        drop(objects);
        self.report_validation();
        Ok(completed)
    }

    fn wait_for(&self, value: u64, timeout: Duration) -> Result<bool, RhiError> {
        Ok(self.driver.wait_semaphore(value, timeout)?)
    }

    fn release(&self, retired: Retired) {
        let mut objects = self.objects.lock();
        let driver = self.driver.as_ref();
        match retired {
            Retired::Resource(id) => {
                if let Some(at) = objects.uploads.iter().position(|u| u.resource == id) {
                    let upload = objects.uploads.remove(at);
                    self.destroy_staging(&mut objects, upload.buffer, upload.allocation);
                }
                if let Some(entry) = objects.resources.remove(&id) {
                    driver.destroy(entry.object.handle());
                    objects.memory.free(driver, entry.allocation);
                }
            }
            Retired::Layout(id) => {
                if let Some(entry) = objects.layouts.remove(&id) {
                    if let Some(descriptors) = entry.descriptors {
                        descriptors.destroy(driver);
                    }
                    driver.destroy(entry.pipeline_layout);
                    driver.destroy(entry.set_layout);
                }
            }
            Retired::Pipeline(key) => {
                if let Some(entry) = objects.pipelines.remove(&key) {
                    driver.destroy(entry.pipeline);
                    for module in entry.modules {
                        driver.destroy(module);
                    }
                }
            }
            Retired::Pass(id) => {
                if let Some(entry) = objects.passes.remove(&id) {
                    // A destroyed layout already took its pools and their sets along.
                    if let (Some((pool, set)), Some(descriptors)) = (
                        entry.descriptor_set,
                        objects
                            .layouts
                            .get_mut(&entry.layout)
                            .and_then(|layout| layout.descriptors.as_mut()),
                    ) {
                        descriptors.free(driver, pool, set);
                    }
                    for view in entry.views {
                        driver.destroy(view);
                    }
                }
            }
        }
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let objects = self.objects.get_mut();
        let leftover = objects.resources.len() + objects.pipelines.len() + objects.passes.len();
        if leftover > 0 {
            log::warn!("Vulkan: dropping backend with {} live objects", leftover);
        }
        let driver = self.driver.as_ref();
        let uploads = std::mem::take(&mut objects.uploads);
        let staging = std::mem::take(&mut objects.staging);
        let buffers = uploads
            .into_iter()
            .map(|u| (u.buffer, u.allocation))
            .chain(staging.into_iter().map(|(_, b, a)| (b, a)));
        for (buffer, allocation) in buffers {
            driver.destroy(buffer);
            objects.memory.free(driver, allocation);
        }
    }
}
