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
    RasterState, ResourceUsage, ShaderStage, StencilFaceState, StencilOperation,
    TextureDimension, VertexFormat,
};

/// A local extension trait to convert Strata types into D3D11 descriptions.
/// This avoids Rust's orphan rules while keeping an idiomatic `.into_d3d11()` syntax.
pub trait IntoD3D11<T> {
    /// Consumes self and converts it into a D3D11-compatible type.
    fn into_d3d11(self) -> T;
}

// --- Formats ---

impl IntoD3D11<DxgiFormat> for Format {
    fn into_d3d11(self) -> DxgiFormat {
        match self {
            Format::Undefined => DxgiFormat::UNKNOWN,
            Format::R8Unorm => DxgiFormat::R8_UNORM,
            Format::Rg8Unorm => DxgiFormat::R8G8_UNORM,
            Format::Rgba8Unorm => DxgiFormat::R8G8B8A8_UNORM,
            Format::Rgba8UnormSrgb => DxgiFormat::R8G8B8A8_UNORM_SRGB,
            Format::Bgra8Unorm => DxgiFormat::B8G8R8A8_UNORM,
            Format::Bgra8UnormSrgb => DxgiFormat::B8G8R8A8_UNORM_SRGB,
            Format::R16Float => DxgiFormat::R16_FLOAT,
            Format::Rg16Float => DxgiFormat::R16G16_FLOAT,
            Format::Rgba16Float => DxgiFormat::R16G16B16A16_FLOAT,
            Format::R32Float => DxgiFormat::R32_FLOAT,
            Format::Rg32Float => DxgiFormat::R32G32_FLOAT,
            Format::Rgba32Float => DxgiFormat::R32G32B32A32_FLOAT,
            Format::R32Uint => DxgiFormat::R32_UINT,
            Format::Depth16Unorm => DxgiFormat::D16_UNORM,
            Format::Depth24PlusStencil8 => DxgiFormat::D24_UNORM_S8_UINT,
            Format::Depth32Float => DxgiFormat::D32_FLOAT,
        }
    }
}

/// Maps a texture format back to its Strata counterpart.
pub fn from_dxgi(format: DxgiFormat) -> Option<Format> {
    let format = match format {
        DxgiFormat::UNKNOWN => Format::Undefined,
        DxgiFormat::R8_UNORM => Format::R8Unorm,
        DxgiFormat::R8G8_UNORM => Format::Rg8Unorm,
        DxgiFormat::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        DxgiFormat::R8G8B8A8_UNORM_SRGB => Format::Rgba8UnormSrgb,
        DxgiFormat::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        DxgiFormat::B8G8R8A8_UNORM_SRGB => Format::Bgra8UnormSrgb,
        DxgiFormat::R16_FLOAT => Format::R16Float,
        DxgiFormat::R16G16_FLOAT => Format::Rg16Float,
        DxgiFormat::R16G16B16A16_FLOAT => Format::Rgba16Float,
        DxgiFormat::R32_FLOAT => Format::R32Float,
        DxgiFormat::R32G32_FLOAT => Format::Rg32Float,
        DxgiFormat::R32G32B32A32_FLOAT => Format::Rgba32Float,
        DxgiFormat::R32_UINT => Format::R32Uint,
        DxgiFormat::D16_UNORM => Format::Depth16Unorm,
        DxgiFormat::D24_UNORM_S8_UINT => Format::Depth24PlusStencil8,
        DxgiFormat::D32_FLOAT => Format::Depth32Float,
        _ => return None,
    };
    Some(format)
}

impl IntoD3D11<DxgiFormat> for VertexFormat {
    fn into_d3d11(self) -> DxgiFormat {
        match self {
            VertexFormat::Uint8x4 => DxgiFormat::R8G8B8A8_UINT,
            VertexFormat::Unorm8x4 => DxgiFormat::R8G8B8A8_UNORM,
            VertexFormat::Float16x2 => DxgiFormat::R16G16_FLOAT,
            VertexFormat::Float16x4 => DxgiFormat::R16G16B16A16_FLOAT,
            VertexFormat::Float32 => DxgiFormat::R32_FLOAT,
            VertexFormat::Float32x2 => DxgiFormat::R32G32_FLOAT,
            VertexFormat::Float32x3 => DxgiFormat::R32G32B32_FLOAT,
            VertexFormat::Float32x4 => DxgiFormat::R32G32B32A32_FLOAT,
            VertexFormat::Uint32 => DxgiFormat::R32_UINT,
            VertexFormat::Uint32x2 => DxgiFormat::R32G32_UINT,
            VertexFormat::Uint32x3 => DxgiFormat::R32G32B32_UINT,
            VertexFormat::Uint32x4 => DxgiFormat::R32G32B32A32_UINT,
            VertexFormat::Sint32 => DxgiFormat::R32_SINT,
        }
    }
}

impl IntoD3D11<DxgiFormat> for IndexFormat {
    fn into_d3d11(self) -> DxgiFormat {
        match self {
            IndexFormat::Uint16 => DxgiFormat::R16_UINT,
            IndexFormat::Uint32 => DxgiFormat::R32_UINT,
        }
    }
}

// --- Resources ---

impl IntoD3D11<D3D11BindFlags> for ResourceUsage {
    fn into_d3d11(self) -> D3D11BindFlags {
        let mut flags = D3D11BindFlags::empty();
        if self.contains(ResourceUsage::VERTEX) {
            flags |= D3D11BindFlags::VERTEX_BUFFER;
        }
        if self.contains(ResourceUsage::INDEX) {
            flags |= D3D11BindFlags::INDEX_BUFFER;
        }
        if self.contains(ResourceUsage::UNIFORM) {
            flags |= D3D11BindFlags::CONSTANT_BUFFER;
        }
        if self.contains(ResourceUsage::SHADER_READ) {
            flags |= D3D11BindFlags::SHADER_RESOURCE;
        }
        if self.contains(ResourceUsage::SHADER_WRITE) {
            flags |= D3D11BindFlags::UNORDERED_ACCESS;
        }
        if self.intersects(ResourceUsage::RENDER_TARGET | ResourceUsage::PRESENT) {
            flags |= D3D11BindFlags::RENDER_TARGET;
        }
        if self.contains(ResourceUsage::DEPTH_STENCIL) {
            flags |= D3D11BindFlags::DEPTH_STENCIL;
        }
        flags
    }
}

impl IntoD3D11<D3D11TextureKind> for TextureDimension {
    fn into_d3d11(self) -> D3D11TextureKind {
        match self {
            TextureDimension::D1 => D3D11TextureKind::Texture1D,
            TextureDimension::D2 => D3D11TextureKind::Texture2D,
            TextureDimension::D3 => D3D11TextureKind::Texture3D,
        }
    }
}

impl IntoD3D11<D3D11Stage> for ShaderStage {
    fn into_d3d11(self) -> D3D11Stage {
        match self {
            ShaderStage::Vertex => D3D11Stage::Vertex,
            ShaderStage::Fragment => D3D11Stage::Pixel,
            ShaderStage::Compute => D3D11Stage::Compute,
        }
    }
}

// --- Rasterizer ---

impl IntoD3D11<D3D11Topology> for PrimitiveTopology {
    fn into_d3d11(self) -> D3D11Topology {
        match self {
            PrimitiveTopology::PointList => D3D11Topology::PointList,
            PrimitiveTopology::LineList => D3D11Topology::LineList,
            PrimitiveTopology::LineStrip => D3D11Topology::LineStrip,
            PrimitiveTopology::TriangleList => D3D11Topology::TriangleList,
            PrimitiveTopology::TriangleStrip => D3D11Topology::TriangleStrip,
        }
    }
}

impl IntoD3D11<D3D11Cull> for CullMode {
    fn into_d3d11(self) -> D3D11Cull {
        match self {
            CullMode::None => D3D11Cull::None,
            CullMode::Front => D3D11Cull::Front,
            CullMode::Back => D3D11Cull::Back,
        }
    }
}

impl IntoD3D11<D3D11Fill> for PolygonMode {
    fn into_d3d11(self) -> D3D11Fill {
        match self {
            PolygonMode::Fill => D3D11Fill::Solid,
            PolygonMode::Line => D3D11Fill::Wireframe,
        }
    }
}

/// The rasterizer state of a technique rendering `sample_count` samples per texel.
impl IntoD3D11<D3D11RasterizerDesc> for (RasterState, u32) {
    fn into_d3d11(self) -> D3D11RasterizerDesc {
        let (raster, sample_count) = self;
        D3D11RasterizerDesc {
            fill_mode: raster.polygon_mode.into_d3d11(),
            cull_mode: raster.cull_mode.into_d3d11(),
            front_counter_clockwise: raster.front_face == FrontFace::Ccw,
            depth_bias: raster.depth_bias,
            slope_scaled_depth_bias_bits: raster.depth_bias_slope_scale.to_bits(),
            depth_clip_enable: raster.depth_clip,
            multisample_enable: sample_count > 1,
        }
    }
}

// --- Output merger ---

impl IntoD3D11<D3D11Blend> for BlendFactor {
    fn into_d3d11(self) -> D3D11Blend {
        match self {
            BlendFactor::Zero => D3D11Blend::ZERO,
            BlendFactor::One => D3D11Blend::ONE,
            BlendFactor::Src => D3D11Blend::SRC_COLOR,
            BlendFactor::OneMinusSrc => D3D11Blend::INV_SRC_COLOR,
            BlendFactor::SrcAlpha => D3D11Blend::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => D3D11Blend::INV_SRC_ALPHA,
            BlendFactor::Dst => D3D11Blend::DEST_COLOR,
            BlendFactor::OneMinusDst => D3D11Blend::INV_DEST_COLOR,
            BlendFactor::DstAlpha => D3D11Blend::DEST_ALPHA,
            BlendFactor::OneMinusDstAlpha => D3D11Blend::INV_DEST_ALPHA,
            BlendFactor::Constant => D3D11Blend::BLEND_FACTOR,
            BlendFactor::OneMinusConstant => D3D11Blend::INV_BLEND_FACTOR,
        }
    }
}

impl IntoD3D11<D3D11BlendOp> for BlendOperation {
    fn into_d3d11(self) -> D3D11BlendOp {
        match self {
            BlendOperation::Add => D3D11BlendOp::ADD,
            BlendOperation::Subtract => D3D11BlendOp::SUBTRACT,
            BlendOperation::ReverseSubtract => D3D11BlendOp::REV_SUBTRACT,
            BlendOperation::Min => D3D11BlendOp::MIN,
            BlendOperation::Max => D3D11BlendOp::MAX,
        }
    }
}

impl IntoD3D11<D3D11BlendDesc> for BlendState {
    fn into_d3d11(self) -> D3D11BlendDesc {
        let BlendEquation { color, alpha } = self.equation.unwrap_or(BlendEquation {
            color: BlendComponent::REPLACE,
            alpha: BlendComponent::REPLACE,
        });
        D3D11BlendDesc {
            alpha_to_coverage_enable: self.alpha_to_coverage,
            target: D3D11TargetBlendDesc {
                blend_enable: self.equation.is_some(),
                src_blend: color.src_factor.into_d3d11(),
                dest_blend: color.dst_factor.into_d3d11(),
                blend_op: color.operation.into_d3d11(),
                src_blend_alpha: alpha.src_factor.into_d3d11(),
                dest_blend_alpha: alpha.dst_factor.into_d3d11(),
                blend_op_alpha: alpha.operation.into_d3d11(),
                render_target_write_mask: self.write_mask.bits() as u8,
            },
        }
    }
}

// --- Depth/stencil ---

impl IntoD3D11<D3D11Comparison> for CompareFunction {
    fn into_d3d11(self) -> D3D11Comparison {
        match self {
            CompareFunction::Never => D3D11Comparison::Never,
            CompareFunction::Less => D3D11Comparison::Less,
            CompareFunction::Equal => D3D11Comparison::Equal,
            CompareFunction::LessEqual => D3D11Comparison::LessEqual,
            CompareFunction::Greater => D3D11Comparison::Greater,
            CompareFunction::NotEqual => D3D11Comparison::NotEqual,
            CompareFunction::GreaterEqual => D3D11Comparison::GreaterEqual,
            CompareFunction::Always => D3D11Comparison::Always,
        }
    }
}

impl IntoD3D11<D3D11StencilOp> for StencilOperation {
    fn into_d3d11(self) -> D3D11StencilOp {
        match self {
            StencilOperation::Keep => D3D11StencilOp::Keep,
            StencilOperation::Zero => D3D11StencilOp::Zero,
            StencilOperation::Replace => D3D11StencilOp::Replace,
            StencilOperation::Invert => D3D11StencilOp::Invert,
            StencilOperation::IncrementClamp => D3D11StencilOp::IncrSat,
            StencilOperation::DecrementClamp => D3D11StencilOp::DecrSat,
            StencilOperation::IncrementWrap => D3D11StencilOp::Incr,
            StencilOperation::DecrementWrap => D3D11StencilOp::Decr,
        }
    }
}

impl IntoD3D11<D3D11StencilFace> for StencilFaceState {
    fn into_d3d11(self) -> D3D11StencilFace {
        D3D11StencilFace {
            fail_op: self.fail_op.into_d3d11(),
            depth_fail_op: self.depth_fail_op.into_d3d11(),
            pass_op: self.pass_op.into_d3d11(),
            func: self.compare.into_d3d11(),
        }
    }
}

impl IntoD3D11<D3D11DepthStencilDesc> for DepthStencilState {
    fn into_d3d11(self) -> D3D11DepthStencilDesc {
        D3D11DepthStencilDesc {
            depth_enable: true,
            depth_write: self.depth_write_enabled,
            depth_func: self.depth_compare.into_d3d11(),
            stencil_enable: self.stencil_front != StencilFaceState::default()
                || self.stencil_back != StencilFaceState::default(),
            stencil_read_mask: self.stencil_read_mask as u8,
            stencil_write_mask: self.stencil_write_mask as u8,
            front_face: self.stencil_front.into_d3d11(),
            back_face: self.stencil_back.into_d3d11(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::renderer::ColorWrites;

    #[test]
    fn color_formats_round_trip_through_dxgi() {
        for format in [
            Format::Rgba8Unorm,
            Format::Bgra8UnormSrgb,
            Format::Rgba16Float,
            Format::Depth24PlusStencil8,
        ] {
            assert_eq!(from_dxgi(format.into_d3d11()), Some(format));
        }
        assert_eq!(from_dxgi(DxgiFormat::R16_UINT), None);
    }

    #[test]
    fn present_usage_binds_as_render_target() {
        let flags: D3D11BindFlags =
            (ResourceUsage::PRESENT | ResourceUsage::COPY_SRC).into_d3d11();
        assert_eq!(flags, D3D11BindFlags::RENDER_TARGET);
        let flags: D3D11BindFlags =
            (ResourceUsage::SHADER_READ | ResourceUsage::SHADER_WRITE).into_d3d11();
        assert!(flags
            .contains(D3D11BindFlags::SHADER_RESOURCE | D3D11BindFlags::UNORDERED_ACCESS));
    }

    #[test]
    fn disabled_blending_keeps_write_mask() {
        let state = BlendState {
            write_mask: ColorWrites::RED | ColorWrites::ALPHA,
            ..Default::default()
        };
        let desc: D3D11BlendDesc = state.into_d3d11();
        assert!(!desc.target.blend_enable);
        assert_eq!(desc.target.render_target_write_mask, 0b1001);
        assert_eq!(desc.target.src_blend, D3D11Blend::ONE);
    }

    #[test]
    fn alpha_blending_maps_factors() {
        let state = BlendState {
            equation: Some(BlendEquation {
                color: BlendComponent::OVER,
                alpha: BlendComponent::REPLACE,
            }),
            ..Default::default()
        };
        let desc: D3D11BlendDesc = state.into_d3d11();
        assert!(desc.target.blend_enable);
        assert_eq!(desc.target.src_blend, D3D11Blend::SRC_ALPHA);
        assert_eq!(desc.target.dest_blend, D3D11Blend::INV_SRC_ALPHA);
        assert_eq!(desc.target.dest_blend_alpha, D3D11Blend::ZERO);
    }

    #[test]
    fn raster_state_enables_multisampling_with_samples() {
        let desc: D3D11RasterizerDesc = (RasterState::default(), 4).into_d3d11();
        assert!(desc.multisample_enable);
        assert!(desc.front_counter_clockwise);
        assert_eq!(desc.fill_mode, D3D11Fill::Solid);
    }
}
