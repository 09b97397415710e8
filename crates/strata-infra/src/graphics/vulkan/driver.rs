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

//! The Vulkan driver seam: the subset of `VkDevice` and its queue the backend calls,
//! expressed with plain Rust types.

use super::command::VkCommandBuffer;
use crate::graphics::common::DriverError;
use std::fmt::Debug;
use std::time::Duration;

/// An opaque non-dispatchable Vulkan handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VkHandle(pub u64);

/// `VkFormat`, restricted to the formats the backend produces.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkFormat {
    UNDEFINED,
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R8G8B8A8_UINT,
    R16_SFLOAT,
    R16G16_SFLOAT,
    R16G16B16A16_SFLOAT,
    R32_SFLOAT,
    R32G32_SFLOAT,
    R32G32B32_SFLOAT,
    R32G32B32A32_SFLOAT,
    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
    R32_SINT,
    D16_UNORM,
    D24_UNORM_S8_UINT,
    D32_SFLOAT,
}

/// `VkIndexType`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkIndexType {
    UINT16,
    UINT32,
}

bitflags::bitflags! {
    /// `VkBufferUsageFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkBufferUsage: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const UNIFORM_BUFFER = 0x10;
        const STORAGE_BUFFER = 0x20;
        const INDEX_BUFFER = 0x40;
        const VERTEX_BUFFER = 0x80;
    }
}

bitflags::bitflags! {
    /// `VkImageUsageFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkImageUsage: u32 {
        const TRANSFER_SRC = 0x1;
        const TRANSFER_DST = 0x2;
        const SAMPLED = 0x4;
        const STORAGE = 0x8;
        const COLOR_ATTACHMENT = 0x10;
        const DEPTH_STENCIL_ATTACHMENT = 0x20;
    }
}

bitflags::bitflags! {
    /// `VkImageAspectFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkImageAspect: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

bitflags::bitflags! {
    /// `VkAccessFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkAccess: u32 {
        const INDEX_READ = 0x2;
        const VERTEX_ATTRIBUTE_READ = 0x4;
        const UNIFORM_READ = 0x8;
        const SHADER_READ = 0x20;
        const SHADER_WRITE = 0x40;
        const COLOR_ATTACHMENT_READ = 0x80;
        const COLOR_ATTACHMENT_WRITE = 0x100;
        const DEPTH_STENCIL_ATTACHMENT_READ = 0x200;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 0x400;
        const TRANSFER_READ = 0x800;
        const TRANSFER_WRITE = 0x1000;
        const HOST_READ = 0x2000;
        const MEMORY_READ = 0x8000;
        const MEMORY_WRITE = 0x10000;
    }
}

bitflags::bitflags! {
    /// `VkPipelineStageFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkPipelineStage: u32 {
        const TOP_OF_PIPE = 0x1;
        const VERTEX_INPUT = 0x4;
        const VERTEX_SHADER = 0x8;
        const FRAGMENT_SHADER = 0x80;
        const EARLY_FRAGMENT_TESTS = 0x100;
        const LATE_FRAGMENT_TESTS = 0x200;
        const COLOR_ATTACHMENT_OUTPUT = 0x400;
        const COMPUTE_SHADER = 0x800;
        const TRANSFER = 0x1000;
        const BOTTOM_OF_PIPE = 0x2000;
        const HOST = 0x4000;
        const ALL_COMMANDS = 0x10000;
    }
}

bitflags::bitflags! {
    /// `VkShaderStageFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VkShaderStage: u32 {
        const VERTEX = 0x1;
        const FRAGMENT = 0x10;
        const COMPUTE = 0x20;
    }
}

/// `VkImageLayout`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkImageLayout {
    UNDEFINED,
    GENERAL,
    COLOR_ATTACHMENT_OPTIMAL,
    DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    SHADER_READ_ONLY_OPTIMAL,
    TRANSFER_SRC_OPTIMAL,
    TRANSFER_DST_OPTIMAL,
    PRESENT_SRC_KHR,
}

/// Where a memory allocation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkMemoryLocation {
    /// `DEVICE_LOCAL`, not mappable.
    DeviceLocal,
    /// `HOST_VISIBLE | HOST_COHERENT`, used for staging.
    HostVisible,
}

/// `VkMemoryRequirements`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkMemoryRequirements {
    pub size: u64,
    pub alignment: u64,
}

/// `VkBufferCreateInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkBufferCreateInfo {
    pub size: u64,
    pub usage: VkBufferUsage,
}

/// `VkImageType`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkImageType {
    TYPE_1D,
    TYPE_2D,
    TYPE_3D,
}

/// `VkImageCreateInfo` with optimal tiling and an undefined initial layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkImageCreateInfo {
    pub image_type: VkImageType,
    pub format: VkFormat,
    /// Width, height and depth. Depth is 1 unless the image is 3D.
    pub extent: [u32; 3],
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: u32,
    pub usage: VkImageUsage,
}

/// `VkImageSubresourceRange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkImageSubresourceRange {
    pub aspect: VkImageAspect,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// `VkImageSubresourceLayers`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkImageSubresourceLayers {
    pub aspect: VkImageAspect,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// `VkImageViewCreateInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkImageViewCreateInfo {
    pub image: VkHandle,
    pub format: VkFormat,
    pub range: VkImageSubresourceRange,
}

/// `VkDescriptorType`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkDescriptorType {
    UNIFORM_BUFFER,
    STORAGE_BUFFER,
    SAMPLED_IMAGE,
    STORAGE_IMAGE,
}

/// `VkDescriptorSetLayoutBinding` with a descriptor count of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkDescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: VkDescriptorType,
    pub stage_flags: VkShaderStage,
}

/// The payload of one `VkWriteDescriptorSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkDescriptorInfo {
    /// `VkDescriptorBufferInfo`.
    Buffer {
        buffer: VkHandle,
        offset: u64,
        range: u64,
    },
    /// `VkDescriptorImageInfo` without a sampler.
    Image {
        view: VkHandle,
        layout: VkImageLayout,
    },
}

/// `VkWriteDescriptorSet` of a single descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkDescriptorWrite {
    pub binding: u32,
    pub descriptor_type: VkDescriptorType,
    pub info: VkDescriptorInfo,
}

/// `VkPrimitiveTopology`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkPrimitiveTopology {
    POINT_LIST,
    LINE_LIST,
    LINE_STRIP,
    TRIANGLE_LIST,
    TRIANGLE_STRIP,
}

/// `VkPolygonMode`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkPolygonMode {
    FILL,
    LINE,
}

/// `VkCullModeFlags`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkCullMode {
    NONE,
    FRONT,
    BACK,
}

/// `VkFrontFace`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkFrontFace {
    COUNTER_CLOCKWISE,
    CLOCKWISE,
}

/// `VkPipelineRasterizationStateCreateInfo`. The slope factor is stored as raw bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkRasterizationState {
    pub polygon_mode: VkPolygonMode,
    pub cull_mode: VkCullMode,
    pub front_face: VkFrontFace,
    pub depth_clamp_enable: bool,
    pub depth_bias_enable: bool,
    pub depth_bias_constant: i32,
    pub depth_bias_slope_bits: u32,
}

/// `VkBlendFactor`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkBlendFactor {
    ZERO,
    ONE,
    SRC_COLOR,
    ONE_MINUS_SRC_COLOR,
    DST_COLOR,
    ONE_MINUS_DST_COLOR,
    SRC_ALPHA,
    ONE_MINUS_SRC_ALPHA,
    DST_ALPHA,
    ONE_MINUS_DST_ALPHA,
    CONSTANT_COLOR,
    ONE_MINUS_CONSTANT_COLOR,
}

/// `VkBlendOp`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkBlendOp {
    ADD,
    SUBTRACT,
    REVERSE_SUBTRACT,
    MIN,
    MAX,
}

/// `VkPipelineColorBlendAttachmentState`, shared by every color attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: VkBlendFactor,
    pub dst_color_blend_factor: VkBlendFactor,
    pub color_blend_op: VkBlendOp,
    pub src_alpha_blend_factor: VkBlendFactor,
    pub dst_alpha_blend_factor: VkBlendFactor,
    pub alpha_blend_op: VkBlendOp,
    /// `VkColorComponentFlags`: R 1, G 2, B 4, A 8.
    pub color_write_mask: u8,
}

/// `VkCompareOp`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkCompareOp {
    NEVER,
    LESS,
    EQUAL,
    LESS_OR_EQUAL,
    GREATER,
    NOT_EQUAL,
    GREATER_OR_EQUAL,
    ALWAYS,
}

/// `VkStencilOp`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VkStencilOp {
    KEEP,
    ZERO,
    REPLACE,
    INCREMENT_AND_CLAMP,
    DECREMENT_AND_CLAMP,
    INVERT,
    INCREMENT_AND_WRAP,
    DECREMENT_AND_WRAP,
}

/// `VkStencilOpState` without the dynamic reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkStencilOpState {
    pub fail_op: VkStencilOp,
    pub pass_op: VkStencilOp,
    pub depth_fail_op: VkStencilOp,
    pub compare_op: VkCompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
}

/// `VkPipelineDepthStencilStateCreateInfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkDepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: VkCompareOp,
    pub stencil_test_enable: bool,
    pub front: VkStencilOpState,
    pub back: VkStencilOpState,
}

/// `VkPipelineShaderStageCreateInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VkPipelineShaderStage {
    pub stage: VkShaderStage,
    pub module: VkHandle,
    pub entry_point: String,
}

/// `VkVertexInputBindingDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkVertexInputBinding {
    pub binding: u32,
    pub stride: u64,
    pub per_instance: bool,
}

/// `VkVertexInputAttributeDescription`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VkVertexInputAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: VkFormat,
    pub offset: u64,
}

/// `VkGraphicsPipelineCreateInfo` for dynamic rendering.
///
/// Viewport, scissor and blend constants are always dynamic state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VkGraphicsPipelineCreateInfo {
    pub stages: Vec<VkPipelineShaderStage>,
    pub vertex_bindings: Vec<VkVertexInputBinding>,
    pub vertex_attributes: Vec<VkVertexInputAttribute>,
    pub topology: VkPrimitiveTopology,
    pub rasterization: VkRasterizationState,
    pub samples: u32,
    pub alpha_to_coverage_enable: bool,
    pub depth_stencil: Option<VkDepthStencilState>,
    pub color_blend: VkColorBlendAttachment,
    /// `VkPipelineRenderingCreateInfo`.
    pub color_formats: Vec<VkFormat>,
    pub depth_format: Option<VkFormat>,
    pub layout: VkHandle,
}

/// `VkComputePipelineCreateInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VkComputePipelineCreateInfo {
    pub stage: VkPipelineShaderStage,
    pub layout: VkHandle,
}

/// A Vulkan style device with one queue and one timeline semaphore.
///
/// Every method may fail with [`DriverError::DeviceLost`] once the device is lost.
/// Memory mapping is folded into [`write_memory`](Self::write_memory) and
/// [`read_memory`](Self::read_memory), which only accept host visible memory.
pub trait VulkanDriver: Send + Sync + Debug {
    /// `vkCreateBuffer`.
    fn create_buffer(&self, info: &VkBufferCreateInfo) -> Result<VkHandle, DriverError>;

    /// `vkCreateImage`.
    fn create_image(&self, info: &VkImageCreateInfo) -> Result<VkHandle, DriverError>;

    /// `vkGet{Buffer,Image}MemoryRequirements`.
    fn memory_requirements(&self, object: VkHandle) -> Result<VkMemoryRequirements, DriverError>;

    /// `vkAllocateMemory`.
    fn allocate_memory(
        &self,
        size: u64,
        location: VkMemoryLocation,
    ) -> Result<VkHandle, DriverError>;

    /// `vkBind{Buffer,Image}Memory`.
    fn bind_memory(&self, object: VkHandle, memory: VkHandle, offset: u64)
        -> Result<(), DriverError>;

    /// Maps host visible `memory`, copies `data` at `offset` and unmaps it.
    fn write_memory(&self, memory: VkHandle, offset: u64, data: &[u8]) -> Result<(), DriverError>;

    /// Maps host visible `memory` and copies `size` bytes from `offset` out of it.
    fn read_memory(&self, memory: VkHandle, offset: u64, size: u64)
        -> Result<Vec<u8>, DriverError>;

    /// `vkCreateImageView`.
    fn create_image_view(&self, info: &VkImageViewCreateInfo) -> Result<VkHandle, DriverError>;

    /// `vkCreateShaderModule`.
    fn create_shader_module(&self, code: &[u8]) -> Result<VkHandle, DriverError>;

    /// `vkCreateDescriptorSetLayout`.
    fn create_descriptor_set_layout(
        &self,
        bindings: &[VkDescriptorSetLayoutBinding],
    ) -> Result<VkHandle, DriverError>;

    /// `vkCreatePipelineLayout` without push constants.
    fn create_pipeline_layout(&self, set_layouts: &[VkHandle]) -> Result<VkHandle, DriverError>;

    /// `vkCreateGraphicsPipelines` for one pipeline.
    fn create_graphics_pipeline(
        &self,
        info: &VkGraphicsPipelineCreateInfo,
    ) -> Result<VkHandle, DriverError>;

    /// `vkCreateComputePipelines` for one pipeline.
    fn create_compute_pipeline(
        &self,
        info: &VkComputePipelineCreateInfo,
    ) -> Result<VkHandle, DriverError>;

    /// `vkCreateDescriptorPool` with `FREE_DESCRIPTOR_SET`.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[(VkDescriptorType, u32)],
    ) -> Result<VkHandle, DriverError>;

    /// `vkAllocateDescriptorSets` for one set.
    fn allocate_descriptor_set(
        &self,
        pool: VkHandle,
        layout: VkHandle,
    ) -> Result<VkHandle, DriverError>;

    /// `vkUpdateDescriptorSets`.
    fn update_descriptor_set(
        &self,
        set: VkHandle,
        writes: &[VkDescriptorWrite],
    ) -> Result<(), DriverError>;

    /// `vkFreeDescriptorSets` for one set.
    fn free_descriptor_set(&self, pool: VkHandle, set: VkHandle);

    /// `vkQueueSubmit2` of one recorded command buffer, signaling the timeline
    /// semaphore to `signal_value` once it has executed.
    fn queue_submit(&self, commands: VkCommandBuffer, signal_value: u64)
        -> Result<(), DriverError>;

    /// `vkGetSemaphoreCounterValue` of the timeline semaphore.
    fn semaphore_value(&self) -> Result<u64, DriverError>;

    /// `vkWaitSemaphores`: blocks until the timeline reaches `value` or `timeout`
    /// elapses. Returns `true` if reached.
    fn wait_semaphore(&self, value: u64, timeout: Duration) -> Result<bool, DriverError>;

    /// Messages the validation layer reported since the last call.
    fn drain_validation_messages(&self) -> Vec<String>;

    /// `vkDestroy*` or `vkFreeMemory`, depending on the object.
    fn destroy(&self, object: VkHandle);
}
