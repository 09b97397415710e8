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

//! Fixed-function state baked into a technique.

use super::enums::*;
use crate::math::LinearRgba;
use std::hash::{Hash, Hasher};

/// Describes a single vertex attribute within a vertex buffer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexAttribute {
    /// The input location of this attribute in the vertex stage.
    pub location: u32,
    /// The format of the attribute's data.
    pub format: VertexFormat,
    /// The byte offset of this attribute from the start of the vertex.
    pub offset: u64,
}

/// Describes the memory layout of a single vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexBufferLayout {
    /// The byte distance between consecutive elements in the buffer.
    pub stride: u64,
    /// How often the vertex buffer is advanced.
    pub step_mode: VertexStepMode,
    /// The attributes contained within each element of the buffer.
    pub attributes: Vec<VertexAttribute>,
}

/// Describes the state for rasterization.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterState {
    /// The topology of the primitives.
    pub topology: PrimitiveTopology,
    /// The vertex winding order that determines the "front" face of a triangle.
    pub front_face: FrontFace,
    /// The face culling mode.
    pub cull_mode: CullMode,
    /// The rasterization mode for polygons.
    pub polygon_mode: PolygonMode,
    /// If `false`, fragments outside the depth range are clamped instead of clipped.
    pub depth_clip: bool,
    /// A constant depth bias added to each fragment.
    pub depth_bias: i32,
    /// A depth bias that scales with the fragment's slope.
    pub depth_bias_slope_scale: f32,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Fill,
            depth_clip: true,
            depth_bias: 0,
            depth_bias_slope_scale: 0.0,
        }
    }
}

impl Eq for RasterState {}

impl Hash for RasterState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.topology.hash(state);
        self.front_face.hash(state);
        self.cull_mode.hash(state);
        self.polygon_mode.hash(state);
        self.depth_clip.hash(state);
        self.depth_bias.hash(state);
        self.depth_bias_slope_scale.to_bits().hash(state);
    }
}

/// Describes the blend operation for a single color channel group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendComponent {
    /// The multiplier for the source (the fragment output).
    pub src_factor: BlendFactor,
    /// The multiplier for the destination (the target contents).
    pub dst_factor: BlendFactor,
    /// The operation combining the two.
    pub operation: BlendOperation,
}

impl BlendComponent {
    /// Writes the source unchanged.
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };

    /// Standard "over" alpha blending.
    pub const OVER: Self = Self {
        src_factor: BlendFactor::SrcAlpha,
        dst_factor: BlendFactor::OneMinusSrcAlpha,
        operation: BlendOperation::Add,
    };
}

/// Blend equations for the color and alpha channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendEquation {
    /// Applied to the red, green and blue channels.
    pub color: BlendComponent,
    /// Applied to the alpha channel.
    pub alpha: BlendComponent,
}

impl BlendEquation {
    /// Standard alpha blending.
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent::OVER,
        alpha: BlendComponent::OVER,
    };
}

/// Output merger state, applied identically to every color target.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlendState {
    /// The blend equation, or `None` to write fragments unchanged.
    pub equation: Option<BlendEquation>,
    /// The channels written.
    pub write_mask: ColorWrites,
    /// The constant used by [`BlendFactor::Constant`]. Techniques that draw a
    /// constant color can rely on it without binding any input.
    pub constant: LinearRgba,
    /// Derives a coverage mask from the fragment's alpha.
    pub alpha_to_coverage: bool,
}

impl Default for BlendState {
    fn default() -> Self {
        Self {
            equation: None,
            write_mask: ColorWrites::ALL,
            constant: LinearRgba::BLACK,
            alpha_to_coverage: false,
        }
    }
}

impl Eq for BlendState {}

impl Hash for BlendState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.equation.hash(state);
        self.write_mask.hash(state);
        self.constant.to_bits().hash(state);
        self.alpha_to_coverage.hash(state);
    }
}

/// Describes the stencil test and operations for a single face of a primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StencilFaceState {
    /// The comparison function used for the stencil test.
    pub compare: CompareFunction,
    /// The operation to perform if the stencil test fails.
    pub fail_op: StencilOperation,
    /// The operation to perform if the stencil test passes but the depth test fails.
    pub depth_fail_op: StencilOperation,
    /// The operation to perform if both tests pass.
    pub pass_op: StencilOperation,
}

/// Depth and stencil test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DepthStencilState {
    /// If `true`, passing fragments write their depth.
    pub depth_write_enabled: bool,
    /// The depth test.
    pub depth_compare: CompareFunction,
    /// Stencil state for front faces.
    pub stencil_front: StencilFaceState,
    /// Stencil state for back faces.
    pub stencil_back: StencilFaceState,
    /// Mask applied when reading the stencil buffer.
    pub stencil_read_mask: u32,
    /// Mask applied when writing the stencil buffer.
    pub stencil_write_mask: u32,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_write_enabled: true,
            depth_compare: CompareFunction::Less,
            stencil_front: StencilFaceState::default(),
            stencil_back: StencilFaceState::default(),
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
        }
    }
}

impl DepthStencilState {
    /// Returns `true` if any stencil operation can modify the stencil buffer.
    pub fn writes_stencil(&self) -> bool {
        let writes = |face: &StencilFaceState| {
            face.fail_op != StencilOperation::Keep
                || face.depth_fail_op != StencilOperation::Keep
                || face.pass_op != StencilOperation::Keep
        };
        self.stencil_write_mask != 0 && (writes(&self.stencil_front) || writes(&self.stencil_back))
    }

    /// Returns `true` if the state writes depth or stencil.
    pub fn writes(&self) -> bool {
        self.depth_write_enabled || self.writes_stencil()
    }
}
