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

//! The abstract usage state of a resource.

use super::usage::ResourceUsage;

/// The state a resource is in from the GPU's point of view.
///
/// Each backend maps a state onto its native concepts: a Vulkan style backend derives
/// an image layout, access mask and pipeline stage from it, a D3D11 style backend uses
/// it to decide which bindings must be cleared before the resource is rebound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ResourceState {
    /// Content is undefined. Only valid as the state of a freshly created resource.
    Undefined = 0,
    /// Generic state accepted by every usage. Slowest on explicit APIs.
    Common,
    /// Read as a vertex buffer.
    VertexBuffer,
    /// Read as an index buffer.
    IndexBuffer,
    /// Read as a uniform buffer.
    UniformBuffer,
    /// Read by shaders.
    ShaderRead,
    /// Read and written by shaders through unordered access.
    ShaderWrite,
    /// Written as a color target.
    RenderTarget,
    /// Written as a depth/stencil target.
    DepthWrite,
    /// Bound as a read-only depth target, may also be sampled.
    DepthRead,
    /// Source of a copy.
    CopySrc,
    /// Destination of a copy or buffer update.
    CopyDst,
    /// Handed to the presentation engine.
    Present,
}

impl ResourceState {
    /// Every state, in declaration order.
    pub const ALL: [ResourceState; 13] = [
        ResourceState::Undefined,
        ResourceState::Common,
        ResourceState::VertexBuffer,
        ResourceState::IndexBuffer,
        ResourceState::UniformBuffer,
        ResourceState::ShaderRead,
        ResourceState::ShaderWrite,
        ResourceState::RenderTarget,
        ResourceState::DepthWrite,
        ResourceState::DepthRead,
        ResourceState::CopySrc,
        ResourceState::CopyDst,
        ResourceState::Present,
    ];

    /// Decodes a state stored with `as u8`.
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// The usage a resource must declare to enter this state.
    pub fn required_usage(self) -> ResourceUsage {
        match self {
            ResourceState::Undefined | ResourceState::Common => ResourceUsage::empty(),
            ResourceState::VertexBuffer => ResourceUsage::VERTEX,
            ResourceState::IndexBuffer => ResourceUsage::INDEX,
            ResourceState::UniformBuffer => ResourceUsage::UNIFORM,
            ResourceState::ShaderRead => ResourceUsage::SHADER_READ,
            ResourceState::ShaderWrite => ResourceUsage::SHADER_WRITE,
            ResourceState::RenderTarget => ResourceUsage::RENDER_TARGET,
            ResourceState::DepthWrite | ResourceState::DepthRead => ResourceUsage::DEPTH_STENCIL,
            ResourceState::CopySrc => ResourceUsage::COPY_SRC,
            ResourceState::CopyDst => ResourceUsage::COPY_DST,
            ResourceState::Present => ResourceUsage::PRESENT,
        }
    }

    /// Returns `true` if a resource with `usage` may be transitioned into this state.
    ///
    /// [`ResourceState::Undefined`] is never a valid transition target.
    pub fn is_allowed_by(self, usage: ResourceUsage) -> bool {
        match self {
            ResourceState::Undefined => false,
            ResourceState::Common => true,
            other => usage.contains(other.required_usage()),
        }
    }

    /// Returns `true` if the GPU may write the resource while it is in this state.
    pub const fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::ShaderWrite
                | ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::CopyDst
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip_covers_every_state() {
        for state in ResourceState::ALL {
            assert_eq!(ResourceState::from_raw(state as u8), Some(state));
        }
        assert_eq!(ResourceState::from_raw(200), None);
    }

    #[test]
    fn usage_gates_states() {
        let usage = ResourceUsage::RENDER_TARGET | ResourceUsage::COPY_SRC;
        assert!(ResourceState::RenderTarget.is_allowed_by(usage));
        assert!(ResourceState::CopySrc.is_allowed_by(usage));
        assert!(ResourceState::Common.is_allowed_by(usage));
        assert!(!ResourceState::ShaderRead.is_allowed_by(usage));
        assert!(!ResourceState::Undefined.is_allowed_by(ResourceUsage::all()));
    }
}
