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

//! Declared usages of a resource.

bitflags::bitflags! {
    /// A set of flags describing every way a resource may be used.
    ///
    /// Usage is fixed at creation. A resource may only be transitioned into a
    /// [`ResourceState`](super::ResourceState) its usage permits, and backends use the
    /// flags to pick bind flags and memory placement.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ResourceUsage: u32 {
        /// The resource can be the source of a copy.
        const COPY_SRC = 1 << 0;
        /// The resource can be the destination of a copy or a buffer update.
        const COPY_DST = 1 << 1;
        /// The resource can be read by shaders (sampled texture, read-only storage buffer).
        const SHADER_READ = 1 << 2;
        /// The resource can be written by shaders through unordered access.
        const SHADER_WRITE = 1 << 3;
        /// The texture can be a color target.
        const RENDER_TARGET = 1 << 4;
        /// The texture can be a depth/stencil target.
        const DEPTH_STENCIL = 1 << 5;
        /// The buffer can provide vertices.
        const VERTEX = 1 << 6;
        /// The buffer can provide indices.
        const INDEX = 1 << 7;
        /// The buffer can be bound as a uniform buffer.
        const UNIFORM = 1 << 8;
        /// The texture can be presented.
        const PRESENT = 1 << 9;
    }
}

impl ResourceUsage {
    /// Usages that only make sense on buffers.
    pub const BUFFER_ONLY: Self = Self::VERTEX.union(Self::INDEX).union(Self::UNIFORM);

    /// Usages that only make sense on textures.
    pub const TEXTURE_ONLY: Self = Self::RENDER_TARGET
        .union(Self::DEPTH_STENCIL)
        .union(Self::PRESENT);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_and_texture_usages_are_disjoint() {
        assert!(ResourceUsage::BUFFER_ONLY
            .intersection(ResourceUsage::TEXTURE_ONLY)
            .is_empty());
        assert!(ResourceUsage::BUFFER_ONLY.contains(ResourceUsage::UNIFORM));
    }
}
