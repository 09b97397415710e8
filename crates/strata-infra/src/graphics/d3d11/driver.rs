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

//! The D3D11 driver seam: the subset of `ID3D11Device` and the immediate context the
//! backend calls, expressed with plain Rust types.

use super::context::D3D11CommandList;
use crate::graphics::common::DriverError;
use std::fmt::Debug;
use std::time::Duration;

/// An opaque native object (a COM pointer on a real driver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct D3D11Handle(pub u64);

/// `DXGI_FORMAT`, restricted to the formats the backend produces.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DxgiFormat {
    UNKNOWN,
    R8_UNORM,
    R8G8_UNORM,
    R8G8B8A8_UNORM,
    R8G8B8A8_UNORM_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_UNORM_SRGB,
    R8G8B8A8_UINT,
    R16_FLOAT,
    R16G16_FLOAT,
    R16G16B16A16_FLOAT,
    R32_FLOAT,
    R32G32_FLOAT,
    R32G32B32_FLOAT,
    R32G32B32A32_FLOAT,
    R32_UINT,
    R32G32_UINT,
    R32G32B32_UINT,
    R32G32B32A32_UINT,
    R32_SINT,
    R16_UINT,
    D16_UNORM,
    D24_UNORM_S8_UINT,
    D32_FLOAT,
}

bitflags::bitflags! {
    /// `D3D11_BIND_FLAG`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct D3D11BindFlags: u32 {
        const VERTEX_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const CONSTANT_BUFFER = 0x4;
        const SHADER_RESOURCE = 0x8;
        const RENDER_TARGET = 0x20;
        const DEPTH_STENCIL = 0x40;
        const UNORDERED_ACCESS = 0x80;
    }
}

/// `D3D11_USAGE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Usage {
    /// GPU read/write.
    Default,
    /// CPU readable copy destination.
    Staging,
}

/// `D3D11_BUFFER_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11BufferDesc {
    pub byte_width: u64,
    pub usage: D3D11Usage,
    pub bind_flags: D3D11BindFlags,
    /// Set for structured buffers bound through shader resource or unordered access
    /// views.
    pub structured: bool,
}

/// The dimensionality of a texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11TextureKind {
    Texture1D,
    Texture2D,
    Texture3D,
}

/// `D3D11_TEXTURE{1,2,3}D_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11TextureDesc {
    pub kind: D3D11TextureKind,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, array size otherwise.
    pub depth_or_array_size: u32,
    pub mip_levels: u32,
    pub format: DxgiFormat,
    pub sample_count: u32,
    pub usage: D3D11Usage,
    pub bind_flags: D3D11BindFlags,
}

/// A range of texture subresources addressed by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11TextureSubresources {
    pub most_detailed_mip: u32,
    pub mip_levels: u32,
    pub first_array_slice: u32,
    pub array_size: u32,
}

/// Creation parameters of the four view types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11ViewDesc {
    /// `D3D11_SHADER_RESOURCE_VIEW_DESC` of a texture.
    ShaderResource {
        format: DxgiFormat,
        subresources: D3D11TextureSubresources,
    },
    /// `D3D11_SHADER_RESOURCE_VIEW_DESC` of a structured buffer range.
    BufferShaderResource { first_byte: u64, byte_count: u64 },
    /// `D3D11_RENDER_TARGET_VIEW_DESC`.
    RenderTarget {
        format: DxgiFormat,
        subresources: D3D11TextureSubresources,
    },
    /// `D3D11_DEPTH_STENCIL_VIEW_DESC`; `read_only` sets both read-only flags.
    DepthStencil {
        format: DxgiFormat,
        subresources: D3D11TextureSubresources,
        read_only: bool,
    },
    /// `D3D11_UNORDERED_ACCESS_VIEW_DESC` of a texture.
    UnorderedAccess {
        format: DxgiFormat,
        subresources: D3D11TextureSubresources,
    },
    /// `D3D11_UNORDERED_ACCESS_VIEW_DESC` of a structured buffer range.
    BufferUnorderedAccess { first_byte: u64, byte_count: u64 },
}

/// A programmable stage of the D3D11 pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Stage {
    Vertex,
    Pixel,
    Compute,
}

/// `D3D11_INPUT_ELEMENT_DESC`. Every element uses the `ATTRIBUTE` semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11InputElement {
    pub semantic_index: u32,
    pub format: DxgiFormat,
    pub input_slot: u32,
    pub aligned_byte_offset: u64,
    pub per_instance: bool,
}

/// `D3D11_PRIMITIVE_TOPOLOGY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Topology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// `D3D11_FILL_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Fill {
    Wireframe,
    Solid,
}

/// `D3D11_CULL_MODE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Cull {
    None,
    Front,
    Back,
}

/// `D3D11_RASTERIZER_DESC`. The depth bias slope is stored as raw bits so the
/// description can key a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11RasterizerDesc {
    pub fill_mode: D3D11Fill,
    pub cull_mode: D3D11Cull,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub slope_scaled_depth_bias_bits: u32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
}

/// `D3D11_BLEND`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Blend {
    ZERO,
    ONE,
    SRC_COLOR,
    INV_SRC_COLOR,
    SRC_ALPHA,
    INV_SRC_ALPHA,
    DEST_COLOR,
    INV_DEST_COLOR,
    DEST_ALPHA,
    INV_DEST_ALPHA,
    BLEND_FACTOR,
    INV_BLEND_FACTOR,
}

/// `D3D11_BLEND_OP`.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11BlendOp {
    ADD,
    SUBTRACT,
    REV_SUBTRACT,
    MIN,
    MAX,
}

/// `D3D11_RENDER_TARGET_BLEND_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11TargetBlendDesc {
    pub blend_enable: bool,
    pub src_blend: D3D11Blend,
    pub dest_blend: D3D11Blend,
    pub blend_op: D3D11BlendOp,
    pub src_blend_alpha: D3D11Blend,
    pub dest_blend_alpha: D3D11Blend,
    pub blend_op_alpha: D3D11BlendOp,
    /// `D3D11_COLOR_WRITE_ENABLE` bits: red 1, green 2, blue 4, alpha 8.
    pub render_target_write_mask: u8,
}

/// `D3D11_BLEND_DESC` with one shared target description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11BlendDesc {
    pub alpha_to_coverage_enable: bool,
    pub target: D3D11TargetBlendDesc,
}

/// `D3D11_COMPARISON_FUNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11Comparison {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// `D3D11_STENCIL_OP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11StencilOp {
    Keep,
    Zero,
    Replace,
    Invert,
    IncrSat,
    DecrSat,
    Incr,
    Decr,
}

/// `D3D11_DEPTH_STENCILOP_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11StencilFace {
    pub fail_op: D3D11StencilOp,
    pub depth_fail_op: D3D11StencilOp,
    pub pass_op: D3D11StencilOp,
    pub func: D3D11Comparison,
}

/// `D3D11_DEPTH_STENCIL_DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct D3D11DepthStencilDesc {
    pub depth_enable: bool,
    pub depth_write: bool,
    pub depth_func: D3D11Comparison,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: D3D11StencilFace,
    pub back_face: D3D11StencilFace,
}

/// The immutable state objects of the output merger and rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum D3D11StateDesc {
    Rasterizer(D3D11RasterizerDesc),
    Blend(D3D11BlendDesc),
    DepthStencil(D3D11DepthStencilDesc),
}

/// A D3D11 style device with its immediate context.
///
/// Every method may fail with [`DriverError::DeviceLost`] once the device has been
/// removed. Objects are reference counted natively; [`release`](Self::release) drops
/// the backend's reference.
pub trait D3D11Driver: Send + Sync + Debug {
    /// `CreateBuffer`. `initial` fills the buffer at creation.
    fn create_buffer(
        &self,
        desc: &D3D11BufferDesc,
        initial: Option<&[u8]>,
    ) -> Result<D3D11Handle, DriverError>;

    /// `CreateTexture{1,2,3}D`. `initial` holds every subresource, packed layer-major.
    fn create_texture(
        &self,
        desc: &D3D11TextureDesc,
        initial: Option<&[u8]>,
    ) -> Result<D3D11Handle, DriverError>;

    /// `Create{ShaderResource,RenderTarget,DepthStencil,UnorderedAccess}View`.
    fn create_view(
        &self,
        resource: D3D11Handle,
        desc: &D3D11ViewDesc,
    ) -> Result<D3D11Handle, DriverError>;

    /// `Create{Vertex,Pixel,Compute}Shader`.
    fn create_shader(&self, stage: D3D11Stage, bytecode: &[u8])
        -> Result<D3D11Handle, DriverError>;

    /// `CreateInputLayout`, validated against the vertex shader bytecode.
    fn create_input_layout(
        &self,
        elements: &[D3D11InputElement],
        vertex_bytecode: &[u8],
    ) -> Result<D3D11Handle, DriverError>;

    /// `Create{Rasterizer,Blend,DepthStencil}State`.
    fn create_state(&self, desc: &D3D11StateDesc) -> Result<D3D11Handle, DriverError>;

    /// `ExecuteCommandList` on the immediate context.
    fn execute_command_list(&self, list: D3D11CommandList) -> Result<(), DriverError>;

    /// `CreateQuery(D3D11_QUERY_EVENT)`.
    fn create_event_query(&self) -> Result<D3D11Handle, DriverError>;

    /// `End` on the immediate context: the query signals once every command executed
    /// before it has completed.
    fn end_query(&self, query: D3D11Handle) -> Result<(), DriverError>;

    /// `GetData` with `D3D11_ASYNC_GETDATA_DONOTFLUSH`: `true` once signaled.
    fn query_signaled(&self, query: D3D11Handle) -> Result<bool, DriverError>;

    /// Blocks until `query` signals or `timeout` elapses. Returns `true` if signaled.
    fn wait_query(&self, query: D3D11Handle, timeout: Duration) -> Result<bool, DriverError>;

    /// `Map(D3D11_MAP_READ)` of a staging resource, returning its packed content.
    fn map_read(&self, staging: D3D11Handle) -> Result<Vec<u8>, DriverError>;

    /// `Release`.
    fn release(&self, object: D3D11Handle);
}
