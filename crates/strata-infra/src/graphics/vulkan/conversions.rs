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

use super::driver::*;
use strata_core::renderer::{
    BlendComponent, BlendEquation, BlendFactor, BlendOperation, BlendState, CompareFunction,
    CullMode, DepthStencilState, Format, FrontFace, IndexFormat, PolygonMode, PrimitiveTopology,
    RasterState, ResourceState, ResourceUsage, ShaderStage, ShaderStageFlags, SlotKind,
    StencilFaceState, StencilOperation, TextureDimension, VertexFormat,
};

/// A local extension trait to convert Strata types into Vulkan structures.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_vk()` syntax.
pub trait IntoVulkan<T> {
    /// Consumes self and converts it into a Vulkan-compatible type.
    fn into_vk(self) -> T;
}

// --- Formats ---

impl IntoVulkan<VkFormat> for Format {
    fn into_vk(self) -> VkFormat {
        match self {
            Format::Undefined => VkFormat::UNDEFINED,
            Format::R8Unorm => VkFormat::R8_UNORM,
            Format::Rg8Unorm => VkFormat::R8G8_UNORM,
            Format::Rgba8Unorm => VkFormat::R8G8B8A8_UNORM,
            Format::Rgba8UnormSrgb => VkFormat::R8G8B8A8_SRGB,
            Format::Bgra8Unorm => VkFormat::B8G8R8A8_UNORM,
            Format::Bgra8UnormSrgb => VkFormat::B8G8R8A8_SRGB,
            Format::R16Float => VkFormat::R16_SFLOAT,
            Format::Rg16Float => VkFormat::R16G16_SFLOAT,
            Format::Rgba16Float => VkFormat::R16G16B16A16_SFLOAT,
            Format::R32Float => VkFormat::R32_SFLOAT,
            Format::Rg32Float => VkFormat::R32G32_SFLOAT,
            Format::Rgba32Float => VkFormat::R32G32B32A32_SFLOAT,
            Format::R32Uint => VkFormat::R32_UINT,
            Format::Depth16Unorm => VkFormat::D16_UNORM,
            Format::Depth24PlusStencil8 => VkFormat::D24_UNORM_S8_UINT,
            Format::Depth32Float => VkFormat::D32_SFLOAT,
        }
    }
}

/// Maps an image format back to its Strata counterpart.
pub fn from_vk(format: VkFormat) -> Option<Format> {
    let format = match format {
        VkFormat::UNDEFINED => Format::Undefined,
        VkFormat::R8_UNORM => Format::R8Unorm,
        VkFormat::R8G8_UNORM => Format::Rg8Unorm,
        VkFormat::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        VkFormat::R8G8B8A8_SRGB => Format::Rgba8UnormSrgb,
        VkFormat::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        VkFormat::B8G8R8A8_SRGB => Format::Bgra8UnormSrgb,
        VkFormat::R16_SFLOAT => Format::R16Float,
        VkFormat::R16G16_SFLOAT => Format::Rg16Float,
        VkFormat::R16G16B16A16_SFLOAT => Format::Rgba16Float,
        VkFormat::R32_SFLOAT => Format::R32Float,
        VkFormat::R32G32_SFLOAT => Format::Rg32Float,
        VkFormat::R32G32B32A32_SFLOAT => Format::Rgba32Float,
        VkFormat::R32_UINT => Format::R32Uint,
        VkFormat::D16_UNORM => Format::Depth16Unorm,
        VkFormat::D24_UNORM_S8_UINT => Format::Depth24PlusStencil8,
        VkFormat::D32_SFLOAT => Format::Depth32Float,
        _ => return None,
    };
    Some(format)
}

impl IntoVulkan<VkFormat> for VertexFormat {
    fn into_vk(self) -> VkFormat {
        match self {
            VertexFormat::Uint8x4 => VkFormat::R8G8B8A8_UINT,
            VertexFormat::Unorm8x4 => VkFormat::R8G8B8A8_UNORM,
            VertexFormat::Float16x2 => VkFormat::R16G16_SFLOAT,
            VertexFormat::Float16x4 => VkFormat::R16G16B16A16_SFLOAT,
            VertexFormat::Float32 => VkFormat::R32_SFLOAT,
            VertexFormat::Float32x2 => VkFormat::R32G32_SFLOAT,
            VertexFormat::Float32x3 => VkFormat::R32G32B32_SFLOAT,
            VertexFormat::Float32x4 => VkFormat::R32G32B32A32_SFLOAT,
            VertexFormat::Uint32 => VkFormat::R32_UINT,
            VertexFormat::Uint32x2 => VkFormat::R32G32_UINT,
            VertexFormat::Uint32x3 => VkFormat::R32G32B32_UINT,
            VertexFormat::Uint32x4 => VkFormat::R32G32B32A32_UINT,
            VertexFormat::Sint32 => VkFormat::R32_SINT,
        }
    }
}

impl IntoVulkan<VkIndexType> for IndexFormat {
    fn into_vk(self) -> VkIndexType {
        match self {
            IndexFormat::Uint16 => VkIndexType::UINT16,
            IndexFormat::Uint32 => VkIndexType::UINT32,
        }
    }
}

/// The aspects an image of this format has.
impl IntoVulkan<VkImageAspect> for Format {
    fn into_vk(self) -> VkImageAspect {
        if self.has_stencil() {
            VkImageAspect::DEPTH | VkImageAspect::STENCIL
        } else if self.is_depth() {
            VkImageAspect::DEPTH
        } else {
            VkImageAspect::COLOR
        }
    }
}

// --- Resources ---

impl IntoVulkan<VkBufferUsage> for ResourceUsage {
    fn into_vk(self) -> VkBufferUsage {
        let mut flags = VkBufferUsage::empty();
        if self.contains(ResourceUsage::COPY_SRC) {
            flags |= VkBufferUsage::TRANSFER_SRC;
        }
        if self.contains(ResourceUsage::COPY_DST) {
            flags |= VkBufferUsage::TRANSFER_DST;
        }
        if self.contains(ResourceUsage::UNIFORM) {
            flags |= VkBufferUsage::UNIFORM_BUFFER;
        }
        if self.intersects(ResourceUsage::SHADER_READ | ResourceUsage::SHADER_WRITE) {
            flags |= VkBufferUsage::STORAGE_BUFFER;
        }
        if self.contains(ResourceUsage::INDEX) {
            flags |= VkBufferUsage::INDEX_BUFFER;
        }
        if self.contains(ResourceUsage::VERTEX) {
            flags |= VkBufferUsage::VERTEX_BUFFER;
        }
        flags
    }
}

impl IntoVulkan<VkImageUsage> for ResourceUsage {
    fn into_vk(self) -> VkImageUsage {
        let mut flags = VkImageUsage::empty();
        if self.contains(ResourceUsage::COPY_SRC) {
            flags |= VkImageUsage::TRANSFER_SRC;
        }
        if self.contains(ResourceUsage::COPY_DST) {
            flags |= VkImageUsage::TRANSFER_DST;
        }
        if self.contains(ResourceUsage::SHADER_READ) {
            flags |= VkImageUsage::SAMPLED;
        }
        if self.contains(ResourceUsage::SHADER_WRITE) {
            flags |= VkImageUsage::STORAGE;
        }
        if self.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::PRESENT) {
            flags |= VkImageUsage::COLOR_ATTACHMENT;
        }
        if self.contains(ResourceUsage::DEPTH_STENCIL) {
            flags |= VkImageUsage::DEPTH_STENCIL_ATTACHMENT;
        }
        flags
    }
}

impl IntoVulkan<VkImageType> for TextureDimension {
    fn into_vk(self) -> VkImageType {
        match self {
            TextureDimension::D1 => VkImageType::TYPE_1D,
            TextureDimension::D2 => VkImageType::TYPE_2D,
            TextureDimension::D3 => VkImageType::TYPE_3D,
        }
    }
}

/// Layout, access mask and pipeline stages a resource has in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VkAccessScope {
    pub layout: VkImageLayout,
    pub access: VkAccess,
    pub stage: VkPipelineStage,
}

impl IntoVulkan<VkAccessScope> for ResourceState {
    fn into_vk(self) -> VkAccessScope {
        let shaders = VkPipelineStage::VERTEX_SHADER
            | VkPipelineStage::FRAGMENT_SHADER
            | VkPipelineStage::COMPUTE_SHADER;
        let fragment_tests =
            VkPipelineStage::EARLY_FRAGMENT_TESTS | VkPipelineStage::LATE_FRAGMENT_TESTS;
        let (layout, access, stage) = match self {
            ResourceState::Undefined => (
                VkImageLayout::UNDEFINED,
                VkAccess::empty(),
                VkPipelineStage::TOP_OF_PIPE,
            ),
            ResourceState::Common => (
                VkImageLayout::GENERAL,
                VkAccess::MEMORY_READ | VkAccess::MEMORY_WRITE,
                VkPipelineStage::ALL_COMMANDS,
            ),
            ResourceState::VertexBuffer => (
                VkImageLayout::GENERAL,
                VkAccess::VERTEX_ATTRIBUTE_READ,
                VkPipelineStage::VERTEX_INPUT,
            ),
            ResourceState::IndexBuffer => (
                VkImageLayout::GENERAL,
                VkAccess::INDEX_READ,
                VkPipelineStage::VERTEX_INPUT,
            ),
            ResourceState::UniformBuffer => {
                (VkImageLayout::GENERAL, VkAccess::UNIFORM_READ, shaders)
            }
            ResourceState::ShaderRead => (
                VkImageLayout::SHADER_READ_ONLY_OPTIMAL,
                VkAccess::SHADER_READ,
                shaders,
            ),
            ResourceState::ShaderWrite => (
                VkImageLayout::GENERAL,
                VkAccess::SHADER_READ | VkAccess::SHADER_WRITE,
                shaders,
            ),
            ResourceState::RenderTarget => (
                VkImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                VkAccess::COLOR_ATTACHMENT_READ | VkAccess::COLOR_ATTACHMENT_WRITE,
                VkPipelineStage::COLOR_ATTACHMENT_OUTPUT,
            ),
            ResourceState::DepthWrite => (
                VkImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                VkAccess::DEPTH_STENCIL_ATTACHMENT_READ | VkAccess::DEPTH_STENCIL_ATTACHMENT_WRITE,
                fragment_tests,
            ),
            ResourceState::DepthRead => (
                VkImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
                VkAccess::DEPTH_STENCIL_ATTACHMENT_READ | VkAccess::SHADER_READ,
                fragment_tests | VkPipelineStage::FRAGMENT_SHADER,
            ),
            ResourceState::CopySrc => (
                VkImageLayout::TRANSFER_SRC_OPTIMAL,
                VkAccess::TRANSFER_READ,
                VkPipelineStage::TRANSFER,
            ),
            ResourceState::CopyDst => (
                VkImageLayout::TRANSFER_DST_OPTIMAL,
                VkAccess::TRANSFER_WRITE,
                VkPipelineStage::TRANSFER,
            ),
            ResourceState::Present => (
                VkImageLayout::PRESENT_SRC_KHR,
                VkAccess::empty(),
                VkPipelineStage::BOTTOM_OF_PIPE,
            ),
        };
        VkAccessScope {
            layout,
            access,
            stage,
        }
    }
}

// --- Bindings ---

impl IntoVulkan<VkShaderStage> for ShaderStage {
    fn into_vk(self) -> VkShaderStage {
        match self {
            ShaderStage::Vertex => VkShaderStage::VERTEX,
            ShaderStage::Fragment => VkShaderStage::FRAGMENT,
            ShaderStage::Compute => VkShaderStage::COMPUTE,
        }
    }
}

impl IntoVulkan<VkShaderStage> for ShaderStageFlags {
    fn into_vk(self) -> VkShaderStage {
        let mut flags = VkShaderStage::empty();
        if self.contains(ShaderStageFlags::VERTEX) {
            flags |= VkShaderStage::VERTEX;
        }
        if self.contains(ShaderStageFlags::FRAGMENT) {
            flags |= VkShaderStage::FRAGMENT;
        }
        if self.contains(ShaderStageFlags::COMPUTE) {
            flags |= VkShaderStage::COMPUTE;
        }
        flags
    }
}

impl IntoVulkan<VkDescriptorType> for SlotKind {
    fn into_vk(self) -> VkDescriptorType {
        match self {
            SlotKind::UniformBuffer => VkDescriptorType::UNIFORM_BUFFER,
            SlotKind::StorageBuffer { .. } => VkDescriptorType::STORAGE_BUFFER,
            SlotKind::SampledTexture => VkDescriptorType::SAMPLED_IMAGE,
            SlotKind::StorageTexture => VkDescriptorType::STORAGE_IMAGE,
        }
    }
}

// --- Rasterizer ---

impl IntoVulkan<VkPrimitiveTopology> for PrimitiveTopology {
    fn into_vk(self) -> VkPrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => VkPrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => VkPrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => VkPrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => VkPrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => VkPrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

impl IntoVulkan<VkRasterizationState> for RasterState {
    fn into_vk(self) -> VkRasterizationState {
        VkRasterizationState {
            polygon_mode: match self.polygon_mode {
                PolygonMode::Fill => VkPolygonMode::FILL,
                PolygonMode::Line => VkPolygonMode::LINE,
            },
            cull_mode: match self.cull_mode {
                CullMode::None => VkCullMode::NONE,
                CullMode::Front => VkCullMode::FRONT,
                CullMode::Back => VkCullMode::BACK,
            },
            front_face: match self.front_face {
                FrontFace::Ccw => VkFrontFace::COUNTER_CLOCKWISE,
                FrontFace::Cw => VkFrontFace::CLOCKWISE,
            },
            // Vulkan clips by default; clamping is the opt-out.
            depth_clamp_enable: !self.depth_clip,
            depth_bias_enable: self.depth_bias != 0 || self.depth_bias_slope_scale != 0.0,
            depth_bias_constant: self.depth_bias,
            depth_bias_slope_bits: self.depth_bias_slope_scale.to_bits(),
        }
    }
}

// --- Color blending ---

impl IntoVulkan<VkBlendFactor> for BlendFactor {
    fn into_vk(self) -> VkBlendFactor {
        match self {
            BlendFactor::Zero => VkBlendFactor::ZERO,
            BlendFactor::One => VkBlendFactor::ONE,
            BlendFactor::Src => VkBlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrc => VkBlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => VkBlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => VkBlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::Dst => VkBlendFactor::DST_COLOR,
            BlendFactor::OneMinusDst => VkBlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => VkBlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => VkBlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::Constant => VkBlendFactor::CONSTANT_COLOR,
            BlendFactor::OneMinusConstant => VkBlendFactor::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

impl IntoVulkan<VkBlendOp> for BlendOperation {
    fn into_vk(self) -> VkBlendOp {
        match self {
            BlendOperation::Add => VkBlendOp::ADD,
            BlendOperation::Subtract => VkBlendOp::SUBTRACT,
            BlendOperation::ReverseSubtract => VkBlendOp::REVERSE_SUBTRACT,
            BlendOperation::Min => VkBlendOp::MIN,
            BlendOperation::Max => VkBlendOp::MAX,
        }
    }
}

impl IntoVulkan<VkColorBlendAttachment> for BlendState {
    fn into_vk(self) -> VkColorBlendAttachment {
        let BlendEquation { color, alpha } = self.equation.unwrap_or(BlendEquation {
            color: BlendComponent::REPLACE,
            alpha: BlendComponent::REPLACE,
        });
        VkColorBlendAttachment {
            blend_enable: self.equation.is_some(),
            src_color_blend_factor: color.src_factor.into_vk(),
            dst_color_blend_factor: color.dst_factor.into_vk(),
            color_blend_op: color.operation.into_vk(),
            src_alpha_blend_factor: alpha.src_factor.into_vk(),
            dst_alpha_blend_factor: alpha.dst_factor.into_vk(),
            alpha_blend_op: alpha.operation.into_vk(),
            color_write_mask: self.write_mask.bits() as u8,
        }
    }
}

// --- Depth/stencil ---

impl IntoVulkan<VkCompareOp> for CompareFunction {
    fn into_vk(self) -> VkCompareOp {
        match self {
            CompareFunction::Never => VkCompareOp::NEVER,
            CompareFunction::Less => VkCompareOp::LESS,
            CompareFunction::Equal => VkCompareOp::EQUAL,
            CompareFunction::LessEqual => VkCompareOp::LESS_OR_EQUAL,
            CompareFunction::Greater => VkCompareOp::GREATER,
            CompareFunction::NotEqual => VkCompareOp::NOT_EQUAL,
            CompareFunction::GreaterEqual => VkCompareOp::GREATER_OR_EQUAL,
            CompareFunction::Always => VkCompareOp::ALWAYS,
        }
    }
}

impl IntoVulkan<VkStencilOp> for StencilOperation {
    fn into_vk(self) -> VkStencilOp {
        match self {
            StencilOperation::Keep => VkStencilOp::KEEP,
            StencilOperation::Zero => VkStencilOp::ZERO,
            StencilOperation::Replace => VkStencilOp::REPLACE,
            StencilOperation::Invert => VkStencilOp::INVERT,
            StencilOperation::IncrementClamp => VkStencilOp::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementClamp => VkStencilOp::DECREMENT_AND_CLAMP,
            StencilOperation::IncrementWrap => VkStencilOp::INCREMENT_AND_WRAP,
            StencilOperation::DecrementWrap => VkStencilOp::DECREMENT_AND_WRAP,
        }
    }
}

/// A stencil face with the compare and write masks of its depth/stencil state.
impl IntoVulkan<VkStencilOpState> for (StencilFaceState, u32, u32) {
    fn into_vk(self) -> VkStencilOpState {
        let (face, compare_mask, write_mask) = self;
        VkStencilOpState {
            fail_op: face.fail_op.into_vk(),
            pass_op: face.pass_op.into_vk(),
            depth_fail_op: face.depth_fail_op.into_vk(),
            compare_op: face.compare.into_vk(),
            compare_mask,
            write_mask,
        }
    }
}

impl IntoVulkan<VkDepthStencilState> for DepthStencilState {
    fn into_vk(self) -> VkDepthStencilState {
        let masks = |face: StencilFaceState| {
            (face, self.stencil_read_mask, self.stencil_write_mask).into_vk()
        };
        VkDepthStencilState {
            depth_test_enable: true,
            depth_write_enable: self.depth_write_enabled,
            depth_compare_op: self.depth_compare.into_vk(),
            stencil_test_enable: self.stencil_front != StencilFaceState::default()
                || self.stencil_back != StencilFaceState::default(),
            front: masks(self.stencil_front),
            back: masks(self.stencil_back),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::ColorWrites;

    #[test]
    fn formats_round_trip_through_vk() {
        for format in [
            Format::R8Unorm,
            Format::Rgba8UnormSrgb,
            Format::Rg16Float,
            Format::Depth32Float,
        ] {
            assert_eq!(from_vk(format.into_vk()), Some(format));
        }
        assert_eq!(from_vk(VkFormat::R32G32B32_UINT), None);
    }

    #[test]
    fn depth_stencil_formats_carry_both_aspects() {
        let aspect: VkImageAspect = Format::Depth24PlusStencil8.into_vk();
        assert_eq!(aspect, VkImageAspect::DEPTH | VkImageAspect::STENCIL);
        let aspect: VkImageAspect = Format::Bgra8Unorm.into_vk();
        assert_eq!(aspect, VkImageAspect::COLOR);
    }

    #[test]
    fn states_map_to_their_layouts() {
        let cases = [
            (ResourceState::Undefined, VkImageLayout::UNDEFINED),
            (ResourceState::RenderTarget, VkImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            (ResourceState::ShaderRead, VkImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (ResourceState::ShaderWrite, VkImageLayout::GENERAL),
            (ResourceState::CopySrc, VkImageLayout::TRANSFER_SRC_OPTIMAL),
            (ResourceState::Present, VkImageLayout::PRESENT_SRC_KHR),
        ];
        for (state, layout) in cases {
            let scope: VkAccessScope = state.into_vk();
            assert_eq!(scope.layout, layout, "{state:?}");
        }
        let write: VkAccessScope = ResourceState::CopyDst.into_vk();
        assert_eq!(write.access, VkAccess::TRANSFER_WRITE);
        assert_eq!(write.stage, VkPipelineStage::TRANSFER);
    }

    #[test]
    fn storage_usage_maps_to_storage_buffers() {
        let usage: VkBufferUsage = (ResourceUsage::SHADER_READ | ResourceUsage::COPY_SRC).into_vk();
        assert_eq!(usage, VkBufferUsage::STORAGE_BUFFER | VkBufferUsage::TRANSFER_SRC);
        let usage: VkImageUsage = (ResourceUsage::PRESENT | ResourceUsage::RENDER_TARGET).into_vk();
        assert_eq!(usage, VkImageUsage::COLOR_ATTACHMENT);
    }

    #[test]
    fn disabled_blending_writes_the_masked_source() {
        let state = BlendState {
            write_mask: ColorWrites::GREEN,
            ..Default::default()
        };
        let attachment: VkColorBlendAttachment = state.into_vk();
        assert!(!attachment.blend_enable);
        assert_eq!(attachment.color_write_mask, 0b0010);
        assert_eq!(attachment.src_color_blend_factor, VkBlendFactor::ONE);
        assert_eq!(attachment.dst_color_blend_factor, VkBlendFactor::ZERO);
    }

    #[test]
    fn rasterizer_clamps_when_clipping_is_off() {
        let state = RasterState {
            depth_clip: false,
            ..Default::default()
        };
        let rasterization: VkRasterizationState = state.into_vk();
        assert!(rasterization.depth_clamp_enable);
        assert!(!rasterization.depth_bias_enable);
    }
}
