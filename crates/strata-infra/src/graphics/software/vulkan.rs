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

//! [`VulkanDriver`] on the software GPU.
//!
//! Buffers and images live inside memory objects at their bound offsets. Image layouts
//! are tracked per subresource, and every mismatch between the layout a command claims
//! and the tracked one is reported the way a validation layer would. Command buffers
//! execute on the GPU queue and signal the timeline semaphore afterwards.

use super::executor::{self, BlendParams, Factor, ImageShape, Operation, TexelCoord};
use super::gpu::SoftwareGpu;
use crate::graphics::common::DriverError;
use crate::graphics::vulkan::command::*;
use crate::graphics::vulkan::conversions::from_vk;
use crate::graphics::vulkan::driver::*;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strata_core::math::Extent3D;
use strata_core::renderer::{Format, ResourceKind, SubresourceRange, TextureDimension};

const BUFFER_ALIGNMENT: u64 = 16;
const IMAGE_ALIGNMENT: u64 = 256;

#[derive(Debug, Clone, Copy)]
struct Binding {
    memory: VkHandle,
    offset: u64,
}

#[derive(Debug)]
enum Object {
    Buffer {
        size: u64,
        binding: Option<Binding>,
    },
    Image {
        shape: ImageShape,
        mip_levels: u32,
        binding: Option<Binding>,
        /// One entry per subresource, layer major.
        layouts: Vec<VkImageLayout>,
    },
    Memory {
        location: VkMemoryLocation,
        data: Vec<u8>,
    },
    View {
        image: VkHandle,
        format: VkFormat,
        range: VkImageSubresourceRange,
    },
    ShaderModule,
    SetLayout,
    PipelineLayout,
    Pipeline {
        /// `None` for compute pipelines.
        blend: Option<VkColorBlendAttachment>,
    },
    Pool {
        max_sets: u32,
        sets: FxHashSet<VkHandle>,
    },
    Set {
        /// Image descriptors by binding, with the layout they were written with.
        images: FxHashMap<u32, (VkHandle, VkImageLayout)>,
    },
}

fn range_of(range: &VkImageSubresourceRange) -> SubresourceRange {
    SubresourceRange {
        base_mip_level: range.base_mip_level,
        mip_level_count: range.level_count,
        base_array_layer: range.base_array_layer,
        array_layer_count: range.layer_count,
    }
}

fn layers_range(layers: &VkImageSubresourceLayers) -> SubresourceRange {
    SubresourceRange {
        base_mip_level: layers.mip_level,
        mip_level_count: 1,
        base_array_layer: layers.base_array_layer,
        array_layer_count: layers.layer_count,
    }
}

fn format_of(format: VkFormat) -> Result<Format, DriverError> {
    from_vk(format).ok_or_else(|| DriverError::Unsupported(format!("format {:?}", format)))
}

#[derive(Debug, Default)]
struct Tables {
    next_handle: u64,
    objects: FxHashMap<VkHandle, Object>,
    submitted: Vec<VkCommandBuffer>,
    messages: Vec<String>,
    drained: usize,
    last_signal: u64,
}

impl Tables {
    fn insert(&mut self, object: Object) -> VkHandle {
        self.next_handle += 1;
        let handle = VkHandle(self.next_handle);
        self.objects.insert(handle, object);
        handle
    }

    fn get(&self, handle: VkHandle) -> Result<&Object, DriverError> {
        self.objects
            .get(&handle)
            .ok_or(DriverError::InvalidHandle(handle.0))
    }

    fn get_mut(&mut self, handle: VkHandle) -> Result<&mut Object, DriverError> {
        self.objects
            .get_mut(&handle)
            .ok_or(DriverError::InvalidHandle(handle.0))
    }

    fn report(&mut self, message: String) {
        log::debug!("software Vulkan validation: {}", message);
        self.messages.push(message);
    }

    // --- Memory access ---

    fn binding(&self, object: VkHandle) -> Result<(Binding, u64, Option<ImageShape>), DriverError> {
        let (binding, size, shape) = match self.get(object)? {
            Object::Buffer { size, binding } => (*binding, *size, None),
            Object::Image { shape, binding, .. } => (*binding, shape.byte_size(), Some(*shape)),
            _ => return Err(DriverError::InvalidHandle(object.0)),
        };
        let binding = binding
            .ok_or_else(|| DriverError::Unsupported(format!("{:?} has no memory bound", object)))?;
        Ok((binding, size, shape))
    }

    fn bytes(&self, object: VkHandle) -> Result<&[u8], DriverError> {
        let (binding, size, _) = self.binding(object)?;
        let Object::Memory { data, .. } = self.get(binding.memory)? else {
            return Err(DriverError::InvalidHandle(binding.memory.0));
        };
        let start = binding.offset as usize;
        data.get(start..start + size as usize)
            .ok_or_else(|| DriverError::Unsupported(format!("{:?} exceeds its memory", object)))
    }

    fn bytes_mut(
        &mut self,
        object: VkHandle,
    ) -> Result<(&mut [u8], Option<ImageShape>), DriverError> {
        let (binding, size, shape) = self.binding(object)?;
        let Object::Memory { data, .. } = self.get_mut(binding.memory)? else {
            return Err(DriverError::InvalidHandle(binding.memory.0));
        };
        let start = binding.offset as usize;
        let bytes = data
            .get_mut(start..start + size as usize)
            .ok_or_else(|| DriverError::Unsupported(format!("{:?} exceeds its memory", object)))?;
        Ok((bytes, shape))
    }

    fn image_mut(&mut self, image: VkHandle) -> Result<(&mut [u8], ImageShape), DriverError> {
        match self.bytes_mut(image)? {
            (bytes, Some(shape)) => Ok((bytes, shape)),
            _ => Err(DriverError::InvalidHandle(image.0)),
        }
    }

    fn image_shape(&self, image: VkHandle) -> Result<ImageShape, DriverError> {
        match self.get(image)? {
            Object::Image { shape, .. } => Ok(*shape),
            _ => Err(DriverError::InvalidHandle(image.0)),
        }
    }

    fn view(&self, view: VkHandle) -> Result<(VkHandle, Format, SubresourceRange), DriverError> {
        match self.get(view)? {
            Object::View {
                image,
                format,
                range,
            } => Ok((*image, format_of(*format)?, range_of(range))),
            _ => Err(DriverError::InvalidHandle(view.0)),
        }
    }

    // --- Layout tracking ---

    fn layouts_mut(
        &mut self,
        image: VkHandle,
    ) -> Result<(&mut Vec<VkImageLayout>, u32), DriverError> {
        match self.get_mut(image)? {
            Object::Image {
                layouts,
                mip_levels,
                ..
            } => Ok((layouts, *mip_levels)),
            _ => Err(DriverError::InvalidHandle(image.0)),
        }
    }

    /// Indices into the layout table of every subresource in `range`.
    fn subresource_indices(
        mip_levels: u32,
        total: usize,
        range: SubresourceRange,
    ) -> Result<Vec<usize>, DriverError> {
        let mut indices = Vec::new();
        for layer in range.base_array_layer..range.base_array_layer + range.array_layer_count {
            for mip in range.base_mip_level..range.base_mip_level + range.mip_level_count {
                let index = (layer * mip_levels + mip) as usize;
                if mip >= mip_levels || index >= total {
                    return Err(DriverError::Unsupported(format!(
                        "subresource mip {} layer {} out of range",
                        mip, layer
                    )));
                }
                indices.push(index);
            }
        }
        Ok(indices)
    }

    /// Reports every subresource of `range` whose tracked layout is not `expected`.
    fn expect_layout(
        &mut self,
        command: &str,
        image: VkHandle,
        range: SubresourceRange,
        expected: VkImageLayout,
    ) -> Result<(), DriverError> {
        let (layouts, mip_levels) = self.layouts_mut(image)?;
        let mismatched: Vec<VkImageLayout> =
            Self::subresource_indices(mip_levels, layouts.len(), range)?
                .into_iter()
                .map(|i| layouts[i])
                .filter(|actual| *actual != expected)
                .collect();
        if let Some(actual) = mismatched.first() {
            let message = format!(
                "{}: image {:?} used in {:?} but {} subresource(s) are in {:?}",
                command,
                image,
                expected,
                mismatched.len(),
                actual
            );
            self.report(message);
        }
        Ok(())
    }

    fn set_layout(
        &mut self,
        image: VkHandle,
        range: SubresourceRange,
        layout: VkImageLayout,
    ) -> Result<(), DriverError> {
        let (layouts, mip_levels) = self.layouts_mut(image)?;
        for index in Self::subresource_indices(mip_levels, layouts.len(), range)? {
            layouts[index] = layout;
        }
        Ok(())
    }

    fn pipeline_blend(&self, pipeline: VkHandle) -> Result<BlendParams, DriverError> {
        match self.get(pipeline)? {
            Object::Pipeline { blend: Some(blend) } => Ok(blend_params(blend)),
            Object::Pipeline { blend: None } => Err(DriverError::Unsupported(
                "compute pipeline bound for a draw".into(),
            )),
            _ => Err(DriverError::InvalidHandle(pipeline.0)),
        }
    }
}

fn factor(blend: VkBlendFactor) -> Factor {
    match blend {
        VkBlendFactor::ZERO => Factor::Zero,
        VkBlendFactor::ONE => Factor::One,
        VkBlendFactor::SRC_COLOR => Factor::SrcColor,
        VkBlendFactor::ONE_MINUS_SRC_COLOR => Factor::OneMinusSrcColor,
        VkBlendFactor::DST_COLOR => Factor::DstColor,
        VkBlendFactor::ONE_MINUS_DST_COLOR => Factor::OneMinusDstColor,
        VkBlendFactor::SRC_ALPHA => Factor::SrcAlpha,
        VkBlendFactor::ONE_MINUS_SRC_ALPHA => Factor::OneMinusSrcAlpha,
        VkBlendFactor::DST_ALPHA => Factor::DstAlpha,
        VkBlendFactor::ONE_MINUS_DST_ALPHA => Factor::OneMinusDstAlpha,
        VkBlendFactor::CONSTANT_COLOR => Factor::Constant,
        VkBlendFactor::ONE_MINUS_CONSTANT_COLOR => Factor::OneMinusConstant,
    }
}

fn operation(op: VkBlendOp) -> Operation {
    match op {
        VkBlendOp::ADD => Operation::Add,
        VkBlendOp::SUBTRACT => Operation::Subtract,
        VkBlendOp::REVERSE_SUBTRACT => Operation::ReverseSubtract,
        VkBlendOp::MIN => Operation::Min,
        VkBlendOp::MAX => Operation::Max,
    }
}

fn blend_params(blend: &VkColorBlendAttachment) -> BlendParams {
    BlendParams {
        enabled: blend.blend_enable,
        src_color: factor(blend.src_color_blend_factor),
        dst_color: factor(blend.dst_color_blend_factor),
        color_op: operation(blend.color_blend_op),
        src_alpha: factor(blend.src_alpha_blend_factor),
        dst_alpha: factor(blend.dst_alpha_blend_factor),
        alpha_op: operation(blend.alpha_blend_op),
        write_mask: blend.color_write_mask,
    }
}

/// Command buffer state while it executes.
#[derive(Debug, Default)]
struct QueueState {
    rendering: Option<VkRenderingInfo>,
    graphics_pipeline: Option<VkHandle>,
    graphics_sets: Vec<VkHandle>,
    compute_sets: Vec<VkHandle>,
    blend_constants: [f32; 4],
}

fn outside_rendering(tables: &mut Tables, state: &QueueState, command: &VkCommand) {
    if state.rendering.is_some() {
        let message = format!("{}: recorded inside a rendering scope", command.name());
        tables.report(message);
    }
}

/// Checks the layout of every image descriptor in `sets` against the tracked layouts.
fn check_descriptors(tables: &mut Tables, command: &str, sets: &[VkHandle]) -> Result<(), DriverError> {
    let mut images = Vec::new();
    for set in sets {
        match tables.get(*set)? {
            Object::Set { images: bound } => images.extend(bound.values().copied()),
            _ => return Err(DriverError::InvalidHandle(set.0)),
        }
    }
    for (view, layout) in images {
        let (image, _, range) = tables.view(view)?;
        tables.expect_layout(command, image, range, layout)?;
    }
    Ok(())
}

fn begin_rendering(tables: &mut Tables, info: &VkRenderingInfo) -> Result<(), DriverError> {
    for color in &info.colors {
        let (image, format, range) = tables.view(color.view)?;
        tables.expect_layout("vkCmdBeginRendering", image, range, color.layout)?;
        if color.load_op == VkLoadOp::Clear {
            let (data, shape) = tables.image_mut(image)?;
            executor::clear_color(data, &shape.viewed_as(format), range, color.clear)?;
        }
    }
    if let Some(depth) = &info.depth {
        let (image, format, range) = tables.view(depth.view)?;
        tables.expect_layout("vkCmdBeginRendering", image, range, depth.layout)?;
        let clear_depth = (depth.depth_load_op == VkLoadOp::Clear).then_some(depth.clear_depth);
        let clear_stencil =
            (depth.stencil_load_op == VkLoadOp::Clear).then_some(depth.clear_stencil as u8);
        if clear_depth.is_some() || clear_stencil.is_some() {
            let (data, shape) = tables.image_mut(image)?;
            executor::clear_depth_stencil(
                data,
                &shape.viewed_as(format),
                range,
                clear_depth,
                clear_stencil,
            )?;
        }
    }
    Ok(())
}

fn execute(tables: &mut Tables, buffer: &VkCommandBuffer) -> Result<(), DriverError> {
    let mut state = QueueState::default();
    for command in &buffer.commands {
        match command {
            VkCommand::PipelineBarrier(barrier) => {
                outside_rendering(tables, &state, command);
                if let VkBarrierTarget::Image {
                    image,
                    old_layout,
                    new_layout,
                    range,
                } = barrier.target
                {
                    let range = range_of(&range);
                    if old_layout != VkImageLayout::UNDEFINED {
                        tables.expect_layout(command.name(), image, range, old_layout)?;
                    }
                    tables.set_layout(image, range, new_layout)?;
                }
            }
            VkCommand::BeginRendering(info) => {
                if state.rendering.is_some() {
                    tables.report("vkCmdBeginRendering: a rendering scope is already open".into());
                }
                begin_rendering(tables, info)?;
                state.rendering = Some(info.clone());
            }
            VkCommand::EndRendering => {
                if state.rendering.take().is_none() {
                    tables.report("vkCmdEndRendering: no rendering scope is open".into());
                }
            }
            VkCommand::BindPipeline {
                bind_point,
                pipeline,
            } => {
                if *bind_point == VkPipelineBindPoint::GRAPHICS {
                    state.graphics_pipeline = Some(*pipeline);
                }
            }
            VkCommand::BindDescriptorSets {
                bind_point, sets, ..
            } => match bind_point {
                VkPipelineBindPoint::GRAPHICS => state.graphics_sets = sets.clone(),
                VkPipelineBindPoint::COMPUTE => state.compute_sets = sets.clone(),
            },
            VkCommand::SetBlendConstants(constants) => state.blend_constants = *constants,
            VkCommand::Draw { .. } | VkCommand::DrawIndexed { .. } => {
                let Some(info) = state.rendering.clone() else {
                    let message = format!("{}: recorded outside a rendering scope", command.name());
                    tables.report(message);
                    continue;
                };
                let Some(pipeline) = state.graphics_pipeline else {
                    let message = format!("{}: no graphics pipeline bound", command.name());
                    tables.report(message);
                    continue;
                };
                check_descriptors(tables, command.name(), &state.graphics_sets)?;
                let blend = tables.pipeline_blend(pipeline)?;
                for color in &info.colors {
                    let (image, format, range) = tables.view(color.view)?;
                    let (data, shape) = tables.image_mut(image)?;
                    executor::draw_constant(
                        data,
                        &shape.viewed_as(format),
                        range,
                        state.blend_constants,
                        &blend,
                    )?;
                }
            }
            VkCommand::Dispatch { .. } => {
                outside_rendering(tables, &state, command);
                check_descriptors(tables, command.name(), &state.compute_sets)?;
            }
            VkCommand::CopyBuffer { src, dst, region } => {
                outside_rendering(tables, &state, command);
                let copy = tables.bytes(*src)?.to_vec();
                let (dst_data, _) = tables.bytes_mut(*dst)?;
                executor::copy_bytes(&copy, region.src_offset, dst_data, region.dst_offset, region.size)?;
            }
            VkCommand::CopyImage {
                src,
                src_layout,
                dst,
                dst_layout,
                region,
            } => {
                outside_rendering(tables, &state, command);
                tables.expect_layout(command.name(), *src, layers_range(&region.src_subresource), *src_layout)?;
                tables.expect_layout(command.name(), *dst, layers_range(&region.dst_subresource), *dst_layout)?;
                let src_shape = tables.image_shape(*src)?;
                let copy = tables.bytes(*src)?.to_vec();
                let (dst_data, dst_shape) = tables.image_mut(*dst)?;
                for layer in 0..region.src_subresource.layer_count {
                    executor::copy_texture(
                        &copy,
                        &src_shape,
                        TexelCoord {
                            mip_level: region.src_subresource.mip_level,
                            array_layer: region.src_subresource.base_array_layer + layer,
                            origin: region.src_offset,
                        },
                        dst_data,
                        &dst_shape,
                        TexelCoord {
                            mip_level: region.dst_subresource.mip_level,
                            array_layer: region.dst_subresource.base_array_layer + layer,
                            origin: region.dst_offset,
                        },
                        region.extent,
                    )?;
                }
            }
            VkCommand::CopyBufferToImage {
                buffer,
                image,
                layout,
                region,
            } => {
                outside_rendering(tables, &state, command);
                tables.expect_layout(command.name(), *image, layers_range(&region.image_subresource), *layout)?;
                let source = tables.bytes(*buffer)?.to_vec();
                let (data, shape) = tables.image_mut(*image)?;
                executor::copy_buffer_to_texture(
                    &source,
                    region.buffer_offset,
                    data,
                    &shape,
                    TexelCoord {
                        mip_level: region.image_subresource.mip_level,
                        array_layer: region.image_subresource.base_array_layer,
                        origin: region.image_offset,
                    },
                    region.image_extent,
                )?;
            }
            VkCommand::CopyImageToBuffer {
                image,
                layout,
                buffer,
                region,
            } => {
                outside_rendering(tables, &state, command);
                tables.expect_layout(command.name(), *image, layers_range(&region.image_subresource), *layout)?;
                let shape = tables.image_shape(*image)?;
                let source = tables.bytes(*image)?.to_vec();
                let (data, _) = tables.bytes_mut(*buffer)?;
                executor::copy_texture_to_buffer(
                    &source,
                    &shape,
                    TexelCoord {
                        mip_level: region.image_subresource.mip_level,
                        array_layer: region.image_subresource.base_array_layer,
                        origin: region.image_offset,
                    },
                    region.image_extent,
                    data,
                    region.buffer_offset,
                )?;
            }
            VkCommand::UpdateBuffer {
                buffer,
                offset,
                data,
            } => {
                outside_rendering(tables, &state, command);
                let (dst, _) = tables.bytes_mut(*buffer)?;
                executor::copy_bytes(data, 0, dst, *offset, data.len() as u64)?;
            }
            // Viewports, scissors and vertex input only shape rasterization.
            VkCommand::SetViewport { .. }
            | VkCommand::SetScissor { .. }
            | VkCommand::BindVertexBuffers { .. }
            | VkCommand::BindIndexBuffer { .. } => {}
        }
    }
    if state.rendering.is_some() {
        tables.report("vkEndCommandBuffer: a rendering scope is still open".into());
    }
    Ok(())
}

/// A [`VulkanDriver`] backed by a [`SoftwareGpu`].
#[derive(Debug)]
pub struct SoftwareVulkan {
    gpu: SoftwareGpu,
    tables: Arc<Mutex<Tables>>,
    timeline: Arc<AtomicU64>,
}

impl SoftwareVulkan {
    pub fn new(gpu: SoftwareGpu) -> Self {
        Self {
            gpu,
            tables: Arc::new(Mutex::new(Tables::default())),
            timeline: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn gpu(&self) -> &SoftwareGpu {
        &self.gpu
    }

    /// Every command buffer submitted to the queue, in submission order.
    pub fn submitted_buffers(&self) -> Vec<VkCommandBuffer> {
        self.tables.lock().submitted.clone()
    }

    /// Every validation message reported so far, drained or not.
    pub fn validation_messages(&self) -> Vec<String> {
        self.tables.lock().messages.clone()
    }

    /// The tracked layout of one image subresource.
    pub fn image_layout(&self, image: VkHandle, mip_level: u32, array_layer: u32) -> Option<VkImageLayout> {
        match self.tables.lock().objects.get(&image)? {
            Object::Image {
                layouts,
                mip_levels,
                ..
            } => layouts.get((array_layer * mip_levels + mip_level) as usize).copied(),
            _ => None,
        }
    }

    /// Number of native objects not yet destroyed.
    pub fn live_objects(&self) -> usize {
        self.tables.lock().objects.len()
    }

    fn create(&self, object: Object) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        Ok(self.tables.lock().insert(object))
    }
}

impl VulkanDriver for SoftwareVulkan {
    fn create_buffer(&self, info: &VkBufferCreateInfo) -> Result<VkHandle, DriverError> {
        self.create(Object::Buffer {
            size: info.size,
            binding: None,
        })
    }

    fn create_image(&self, info: &VkImageCreateInfo) -> Result<VkHandle, DriverError> {
        let format = format_of(info.format)?;
        let (dimension, depth_or_array_layers, layers) = match info.image_type {
            VkImageType::TYPE_1D => (TextureDimension::D1, info.array_layers, info.array_layers),
            VkImageType::TYPE_2D => (TextureDimension::D2, info.array_layers, info.array_layers),
            VkImageType::TYPE_3D => (TextureDimension::D3, info.extent[2], 1),
        };
        let shape = ImageShape::new(
            ResourceKind::Texture {
                dimension,
                extent: Extent3D {
                    width: info.extent[0],
                    height: info.extent[1],
                    depth_or_array_layers,
                },
                mip_level_count: info.mip_levels,
                sample_count: info.samples,
            },
            format,
        );
        self.create(Object::Image {
            shape,
            mip_levels: info.mip_levels,
            binding: None,
            layouts: vec![VkImageLayout::UNDEFINED; (info.mip_levels * layers) as usize],
        })
    }

    fn memory_requirements(&self, object: VkHandle) -> Result<VkMemoryRequirements, DriverError> {
        self.gpu.check_alive()?;
        match self.tables.lock().get(object)? {
            Object::Buffer { size, .. } => Ok(VkMemoryRequirements {
                size: *size,
                alignment: BUFFER_ALIGNMENT,
            }),
            Object::Image { shape, .. } => Ok(VkMemoryRequirements {
                size: shape.byte_size(),
                alignment: IMAGE_ALIGNMENT,
            }),
            _ => Err(DriverError::InvalidHandle(object.0)),
        }
    }

    fn allocate_memory(
        &self,
        size: u64,
        location: VkMemoryLocation,
    ) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        self.gpu.allocate(size)?;
        Ok(self.tables.lock().insert(Object::Memory {
            location,
            data: vec![0u8; size as usize],
        }))
    }

    fn bind_memory(&self, object: VkHandle, memory: VkHandle, offset: u64) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        let capacity = match tables.get(memory)? {
            Object::Memory { data, .. } => data.len() as u64,
            _ => return Err(DriverError::InvalidHandle(memory.0)),
        };
        let (size, binding) = match tables.get_mut(object)? {
            Object::Buffer { size, binding } => (*size, binding),
            Object::Image { shape, binding, .. } => (shape.byte_size(), binding),
            _ => return Err(DriverError::InvalidHandle(object.0)),
        };
        if binding.is_some() {
            return Err(DriverError::Unsupported(format!("{:?} is already bound", object)));
        }
        if offset + size > capacity {
            return Err(DriverError::Unsupported(format!(
                "{} bytes at offset {} exceed a {} byte allocation",
                size, offset, capacity
            )));
        }
        *binding = Some(Binding { memory, offset });
        Ok(())
    }

    fn write_memory(&self, memory: VkHandle, offset: u64, data: &[u8]) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        match self.tables.lock().get_mut(memory)? {
            Object::Memory {
                location: VkMemoryLocation::HostVisible,
                data: bytes,
            } => executor::copy_bytes(data, 0, bytes, offset, data.len() as u64),
            Object::Memory { .. } => Err(DriverError::Unsupported(
                "mapping device local memory".into(),
            )),
            _ => Err(DriverError::InvalidHandle(memory.0)),
        }
    }

    fn read_memory(&self, memory: VkHandle, offset: u64, size: u64) -> Result<Vec<u8>, DriverError> {
        self.gpu.check_alive()?;
        match self.tables.lock().get(memory)? {
            Object::Memory {
                location: VkMemoryLocation::HostVisible,
                data,
            } => {
                let mut out = vec![0u8; size as usize];
                executor::copy_bytes(data, offset, &mut out, 0, size)?;
                Ok(out)
            }
            Object::Memory { .. } => Err(DriverError::Unsupported(
                "mapping device local memory".into(),
            )),
            _ => Err(DriverError::InvalidHandle(memory.0)),
        }
    }

    fn create_image_view(&self, info: &VkImageViewCreateInfo) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        tables.image_shape(info.image)?;
        Ok(tables.insert(Object::View {
            image: info.image,
            format: info.format,
            range: info.range,
        }))
    }

    fn create_shader_module(&self, code: &[u8]) -> Result<VkHandle, DriverError> {
        if code.is_empty() || code.len() % 4 != 0 {
            return Err(DriverError::Unsupported(format!(
                "SPIR-V of {} bytes",
                code.len()
            )));
        }
        self.create(Object::ShaderModule)
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[VkDescriptorSetLayoutBinding],
    ) -> Result<VkHandle, DriverError> {
        self.create(Object::SetLayout)
    }

    fn create_pipeline_layout(&self, set_layouts: &[VkHandle]) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        for layout in set_layouts {
            if !matches!(tables.get(*layout)?, Object::SetLayout) {
                return Err(DriverError::InvalidHandle(layout.0));
            }
        }
        Ok(tables.insert(Object::PipelineLayout))
    }

    fn create_graphics_pipeline(
        &self,
        info: &VkGraphicsPipelineCreateInfo,
    ) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        for stage in &info.stages {
            if !matches!(tables.get(stage.module)?, Object::ShaderModule) {
                return Err(DriverError::InvalidHandle(stage.module.0));
            }
        }
        Ok(tables.insert(Object::Pipeline {
            blend: Some(info.color_blend),
        }))
    }

    fn create_compute_pipeline(
        &self,
        info: &VkComputePipelineCreateInfo,
    ) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        if !matches!(tables.get(info.stage.module)?, Object::ShaderModule) {
            return Err(DriverError::InvalidHandle(info.stage.module.0));
        }
        Ok(tables.insert(Object::Pipeline { blend: None }))
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        _sizes: &[(VkDescriptorType, u32)],
    ) -> Result<VkHandle, DriverError> {
        self.create(Object::Pool {
            max_sets,
            sets: FxHashSet::default(),
        })
    }

    fn allocate_descriptor_set(
        &self,
        pool: VkHandle,
        layout: VkHandle,
    ) -> Result<VkHandle, DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        if !matches!(tables.get(layout)?, Object::SetLayout) {
            return Err(DriverError::InvalidHandle(layout.0));
        }
        match tables.get(pool)? {
            Object::Pool { max_sets, sets } if sets.len() as u32 >= *max_sets => {
                return Err(DriverError::Unsupported(format!(
                    "descriptor pool {:?} is exhausted",
                    pool
                )))
            }
            Object::Pool { .. } => {}
            _ => return Err(DriverError::InvalidHandle(pool.0)),
        }
        let set = tables.insert(Object::Set {
            images: FxHashMap::default(),
        });
        if let Object::Pool { sets, .. } = tables.get_mut(pool)? {
            sets.insert(set);
        }
        Ok(set)
    }

    fn update_descriptor_set(
        &self,
        set: VkHandle,
        writes: &[VkDescriptorWrite],
    ) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        let mut tables = self.tables.lock();
        for write in writes {
            match write.info {
                VkDescriptorInfo::Buffer { buffer, .. } => {
                    if !matches!(tables.get(buffer)?, Object::Buffer { .. }) {
                        return Err(DriverError::InvalidHandle(buffer.0));
                    }
                }
                VkDescriptorInfo::Image { view, .. } => {
                    tables.view(view)?;
                }
            }
        }
        let Object::Set { images } = tables.get_mut(set)? else {
            return Err(DriverError::InvalidHandle(set.0));
        };
        for write in writes {
            match write.info {
                VkDescriptorInfo::Image { view, layout } => {
                    images.insert(write.binding, (view, layout));
                }
                VkDescriptorInfo::Buffer { .. } => {
                    images.remove(&write.binding);
                }
            }
        }
        Ok(())
    }

    fn free_descriptor_set(&self, pool: VkHandle, set: VkHandle) {
        let mut tables = self.tables.lock();
        let owned = match tables.objects.get_mut(&pool) {
            Some(Object::Pool { sets, .. }) => sets.remove(&set),
            _ => false,
        };
        if owned {
            tables.objects.remove(&set);
        } else {
            log::warn!(
                "software Vulkan: set {:?} does not belong to pool {:?}",
                set,
                pool
            );
        }
    }

    fn queue_submit(&self, commands: VkCommandBuffer, signal_value: u64) -> Result<(), DriverError> {
        self.gpu.check_alive()?;
        let label = commands
            .label
            .clone()
            .unwrap_or_else(|| "command buffer".into());
        {
            let mut tables = self.tables.lock();
            if signal_value <= tables.last_signal {
                let message = format!(
                    "vkQueueSubmit2: timeline value {} does not increase past {}",
                    signal_value, tables.last_signal
                );
                tables.report(message);
            }
            tables.last_signal = tables.last_signal.max(signal_value);
            tables.submitted.push(commands.clone());
        }
        let tables = Arc::clone(&self.tables);
        let timeline = Arc::clone(&self.timeline);
        self.gpu.enqueue(label, move || {
            execute(&mut tables.lock(), &commands)?;
            timeline.fetch_max(signal_value, Ordering::AcqRel);
            Ok(())
        })?;
        Ok(())
    }

    fn semaphore_value(&self) -> Result<u64, DriverError> {
        self.gpu.check_alive()?;
        Ok(self.timeline.load(Ordering::Acquire))
    }

    fn wait_semaphore(&self, value: u64, timeout: Duration) -> Result<bool, DriverError> {
        self.gpu
            .wait_until(timeout, || self.timeline.load(Ordering::Acquire) >= value)
    }

    fn drain_validation_messages(&self) -> Vec<String> {
        let mut tables = self.tables.lock();
        let fresh = tables.messages[tables.drained..].to_vec();
        let total = tables.messages.len();
        tables.drained = total;
        fresh
    }

    fn destroy(&self, object: VkHandle) {
        let mut tables = self.tables.lock();
        match tables.objects.remove(&object) {
            Some(Object::Memory { data, .. }) => self.gpu.free(data.len() as u64),
            Some(Object::Pool { sets, .. }) => {
                for set in sets {
                    tables.objects.remove(&set);
                }
            }
            Some(_) => {}
            None => log::warn!("software Vulkan: destroy of unknown object {:?}", object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::software::{texel, SoftwareConfig};

    fn color_target(driver: &SoftwareVulkan) -> (VkHandle, VkHandle, VkHandle) {
        let image = driver
            .create_image(&VkImageCreateInfo {
                image_type: VkImageType::TYPE_2D,
                format: VkFormat::R8G8B8A8_UNORM,
                extent: [2, 2, 1],
                mip_levels: 1,
                array_layers: 1,
                samples: 1,
                usage: VkImageUsage::COLOR_ATTACHMENT | VkImageUsage::TRANSFER_SRC,
            })
            .expect("image");
        let requirements = driver.memory_requirements(image).expect("requirements");
        let memory = driver
            .allocate_memory(requirements.size, VkMemoryLocation::DeviceLocal)
            .expect("memory");
        driver.bind_memory(image, memory, 0).expect("bind");
        let view = driver
            .create_image_view(&VkImageViewCreateInfo {
                image,
                format: VkFormat::R8G8B8A8_UNORM,
                range: whole(),
            })
            .expect("view");
        (image, memory, view)
    }

    fn whole() -> VkImageSubresourceRange {
        VkImageSubresourceRange {
            aspect: VkImageAspect::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    fn transition(image: VkHandle, old_layout: VkImageLayout, new_layout: VkImageLayout) -> VkCommand {
        VkCommand::PipelineBarrier(VkBarrier {
            src_stage: VkPipelineStage::TOP_OF_PIPE,
            src_access: VkAccess::empty(),
            dst_stage: VkPipelineStage::ALL_COMMANDS,
            dst_access: VkAccess::MEMORY_READ | VkAccess::MEMORY_WRITE,
            target: VkBarrierTarget::Image {
                image,
                old_layout,
                new_layout,
                range: whole(),
            },
        })
    }

    fn clearing(view: VkHandle, layout: VkImageLayout) -> VkCommand {
        VkCommand::BeginRendering(VkRenderingInfo {
            extent: [2, 2],
            colors: vec![VkColorAttachment {
                view,
                layout,
                load_op: VkLoadOp::Clear,
                clear: [1.0, 0.0, 0.0, 1.0],
                store: true,
            }],
            depth: None,
        })
    }

    fn staging(driver: &SoftwareVulkan, size: u64) -> (VkHandle, VkHandle) {
        let buffer = driver
            .create_buffer(&VkBufferCreateInfo {
                size,
                usage: VkBufferUsage::TRANSFER_DST,
            })
            .expect("buffer");
        let memory = driver
            .allocate_memory(size, VkMemoryLocation::HostVisible)
            .expect("memory");
        driver.bind_memory(buffer, memory, 0).expect("bind");
        (buffer, memory)
    }

    #[test]
    fn clear_then_copy_reads_back_the_color_and_signals() {
        // --- ARRANGE ---
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let (image, _, view) = color_target(&driver);
        let (buffer, memory) = staging(&driver, 16);
        let commands = VkCommandBuffer {
            label: Some("clear".into()),
            commands: vec![
                transition(image, VkImageLayout::UNDEFINED, VkImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                clearing(view, VkImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                VkCommand::EndRendering,
                transition(
                    image,
                    VkImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    VkImageLayout::TRANSFER_SRC_OPTIMAL,
                ),
                VkCommand::CopyImageToBuffer {
                    image,
                    layout: VkImageLayout::TRANSFER_SRC_OPTIMAL,
                    buffer,
                    region: VkBufferImageCopy {
                        buffer_offset: 0,
                        image_subresource: VkImageSubresourceLayers {
                            aspect: VkImageAspect::COLOR,
                            mip_level: 0,
                            base_array_layer: 0,
                            layer_count: 1,
                        },
                        image_offset: [0; 3],
                        image_extent: [2, 2, 1],
                    },
                },
            ],
        };

        // --- ACT ---
        driver.queue_submit(commands, 1).expect("submit");
        let bytes = driver.read_memory(memory, 0, 16).expect("read");

        // --- ASSERT ---
        assert_eq!(driver.semaphore_value().expect("value"), 1);
        for chunk in bytes.chunks_exact(4) {
            assert_eq!(chunk, texel::encode(Format::Rgba8Unorm, [1.0, 0.0, 0.0, 1.0]));
        }
        assert!(driver.validation_messages().is_empty());
        assert_eq!(
            driver.image_layout(image, 0, 0),
            Some(VkImageLayout::TRANSFER_SRC_OPTIMAL)
        );
        assert_eq!(driver.submitted_buffers().len(), 1);
    }

    #[test]
    fn a_stale_layout_is_reported_once_and_drained() {
        // --- ARRANGE ---
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let (_, _, view) = color_target(&driver);
        let commands = VkCommandBuffer {
            label: None,
            commands: vec![
                clearing(view, VkImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                VkCommand::EndRendering,
            ],
        };

        // --- ACT ---
        driver.queue_submit(commands, 1).expect("submit");

        // --- ASSERT ---
        let drained = driver.drain_validation_messages();
        assert_eq!(drained.len(), 1);
        assert!(drained[0].starts_with("vkCmdBeginRendering"));
        assert!(driver.drain_validation_messages().is_empty());
        assert_eq!(driver.validation_messages().len(), 1);
    }

    #[test]
    fn draws_outside_rendering_are_reported() {
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let commands = VkCommandBuffer {
            label: None,
            commands: vec![VkCommand::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }],
        };

        driver.queue_submit(commands, 1).expect("submit");

        let messages = driver.validation_messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("outside a rendering scope"));
    }

    #[test]
    fn the_timeline_waits_for_manual_completion() {
        // --- ARRANGE ---
        let gpu = SoftwareGpu::new(SoftwareConfig::manual());
        let driver = SoftwareVulkan::new(gpu.clone());
        let empty = VkCommandBuffer {
            label: None,
            commands: Vec::new(),
        };

        // --- ACT ---
        driver.queue_submit(empty.clone(), 1).expect("first");
        driver.queue_submit(empty, 2).expect("second");

        // --- ASSERT ---
        assert_eq!(driver.semaphore_value().expect("value"), 0);
        assert!(!driver
            .wait_semaphore(1, Duration::from_millis(1))
            .expect("wait"));
        assert_eq!(gpu.advance(1), 1);
        assert_eq!(driver.semaphore_value().expect("value"), 1);
        gpu.complete_all();
        assert!(driver.wait_semaphore(2, Duration::ZERO).expect("wait"));
    }

    #[test]
    fn device_local_memory_cannot_be_mapped() {
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let (_, memory, _) = color_target(&driver);

        assert!(matches!(
            driver.read_memory(memory, 0, 4),
            Err(DriverError::Unsupported(_))
        ));
    }

    #[test]
    fn destroying_a_pool_frees_its_sets() {
        // --- ARRANGE ---
        let driver = SoftwareVulkan::new(SoftwareGpu::new(SoftwareConfig::default()));
        let layout = driver.create_descriptor_set_layout(&[]).expect("layout");
        let pool = driver.create_descriptor_pool(1, &[]).expect("pool");
        driver.allocate_descriptor_set(pool, layout).expect("set");

        // --- ACT ---
        let exhausted = driver.allocate_descriptor_set(pool, layout);
        driver.destroy(pool);

        // --- ASSERT ---
        assert!(exhausted.is_err());
        assert_eq!(driver.live_objects(), 1);
    }
}
