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

//! Descriptors used to create resources, and the packed memory layout of textures.

use super::{format::Format, usage::ResourceUsage};
use crate::math::Extent3D;
use std::sync::Arc;

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextureDimension {
    /// A one-dimensional texture, `height` must be 1.
    D1,
    /// A two-dimensional texture, optionally layered.
    D2,
    /// A three-dimensional texture.
    D3,
}

/// Whether a resource is a buffer or a texture, with the geometry of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResourceKind {
    /// A linear range of bytes.
    Buffer {
        /// Size in bytes.
        size: u64,
    },
    /// A texel image.
    Texture {
        /// Dimensionality of the texture.
        dimension: TextureDimension,
        /// Size of mip level zero. The third component counts array layers unless the
        /// dimension is [`TextureDimension::D3`].
        extent: Extent3D,
        /// Number of mip levels, at least 1.
        mip_level_count: u32,
        /// Samples per texel, 1 for single-sampled textures.
        sample_count: u32,
    },
}

/// Placement of one subresource inside the packed texture layout used for initial data
/// and readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceFootprint {
    /// Byte offset of the subresource from the start of the packed data.
    pub offset: u64,
    /// Extent of the subresource.
    pub extent: Extent3D,
    /// Bytes between two rows.
    pub row_pitch: u64,
    /// Bytes between two depth slices.
    pub slice_pitch: u64,
    /// Total bytes of the subresource.
    pub size: u64,
}

impl ResourceKind {
    /// Returns `true` for buffers.
    pub fn is_buffer(&self) -> bool {
        matches!(self, ResourceKind::Buffer { .. })
    }

    /// Returns `true` for three-dimensional textures.
    pub fn is_volumetric(&self) -> bool {
        matches!(
            self,
            ResourceKind::Texture {
                dimension: TextureDimension::D3,
                ..
            }
        )
    }

    /// Number of mip levels, 1 for buffers.
    pub fn mip_level_count(&self) -> u32 {
        match self {
            ResourceKind::Buffer { .. } => 1,
            ResourceKind::Texture {
                mip_level_count, ..
            } => *mip_level_count,
        }
    }

    /// Number of array layers, 1 for buffers and volumetric textures.
    pub fn array_layer_count(&self) -> u32 {
        match self {
            ResourceKind::Texture {
                dimension: TextureDimension::D1 | TextureDimension::D2,
                extent,
                ..
            } => extent.depth_or_array_layers,
            _ => 1,
        }
    }

    /// Samples per texel, 1 for buffers.
    pub fn sample_count(&self) -> u32 {
        match self {
            ResourceKind::Buffer { .. } => 1,
            ResourceKind::Texture { sample_count, .. } => *sample_count,
        }
    }

    /// Extent of the given mip level, or `None` for buffers.
    pub fn mip_extent(&self, mip_level: u32) -> Option<Extent3D> {
        match self {
            ResourceKind::Buffer { .. } => None,
            ResourceKind::Texture { extent, .. } => {
                Some(extent.mip_level_size(mip_level, self.is_volumetric()))
            }
        }
    }

    /// Packed placement of a subresource. Subresources are stored layer-major, and
    /// within a layer by increasing mip level. Returns `None` for buffers or
    /// out-of-range subresources.
    pub fn footprint(
        &self,
        format: Format,
        mip_level: u32,
        array_layer: u32,
    ) -> Option<SubresourceFootprint> {
        if mip_level >= self.mip_level_count() || array_layer >= self.array_layer_count() {
            return None;
        }
        let texel = format.bytes_per_texel() as u64 * self.sample_count() as u64;
        let mip_size = |level: u32| -> Option<u64> {
            self.mip_extent(level)
                .map(|e| e.texel_count() * texel)
        };
        let layer_size: u64 = (0..self.mip_level_count())
            .map(mip_size)
            .sum::<Option<u64>>()?;
        let within_layer: u64 = (0..mip_level).map(mip_size).sum::<Option<u64>>()?;
        let extent = self.mip_extent(mip_level)?;
        let row_pitch = extent.width as u64 * texel;
        let slice_pitch = row_pitch * extent.height as u64;
        Some(SubresourceFootprint {
            offset: array_layer as u64 * layer_size + within_layer,
            extent,
            row_pitch,
            slice_pitch,
            size: slice_pitch * extent.depth_or_array_layers as u64,
        })
    }

    /// Total bytes of the resource in its packed layout.
    pub fn byte_size(&self, format: Format) -> u64 {
        match self {
            ResourceKind::Buffer { size } => *size,
            ResourceKind::Texture { .. } => {
                let layers = self.array_layer_count();
                let mips = self.mip_level_count();
                match self.footprint(format, mips.saturating_sub(1), layers.saturating_sub(1)) {
                    Some(last) => last.offset + last.size,
                    None => 0,
                }
            }
        }
    }
}

/// A descriptor used to create a [`Resource`](super::Resource).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceDescriptor {
    /// An optional debug label.
    pub label: Option<String>,
    /// Buffer or texture geometry.
    pub kind: ResourceKind,
    /// Texel format. Must be [`Format::Undefined`] for buffers.
    pub format: Format,
    /// Every way the resource will be used.
    pub usage: ResourceUsage,
    /// Content uploaded at creation, in the packed layout described by
    /// [`ResourceKind::footprint`]. Requires [`ResourceUsage::COPY_DST`]; the resource
    /// starts in [`ResourceState::CopyDst`](super::ResourceState::CopyDst).
    pub initial_data: Option<Arc<[u8]>>,
}

impl ResourceDescriptor {
    /// Describes a buffer of `size` bytes.
    pub fn buffer(label: Option<&str>, size: u64, usage: ResourceUsage) -> Self {
        Self {
            label: label.map(str::to_owned),
            kind: ResourceKind::Buffer { size },
            format: Format::Undefined,
            usage,
            initial_data: None,
        }
    }

    /// Describes a single-layer, single-mip, single-sample 2D texture.
    pub fn texture_2d(
        label: Option<&str>,
        width: u32,
        height: u32,
        format: Format,
        usage: ResourceUsage,
    ) -> Self {
        Self {
            label: label.map(str::to_owned),
            kind: ResourceKind::Texture {
                dimension: TextureDimension::D2,
                extent: Extent3D::d2(width, height),
                mip_level_count: 1,
                sample_count: 1,
            },
            format,
            usage,
            initial_data: None,
        }
    }

    /// Sets the mip level count of a texture descriptor. No effect on buffers.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        if let ResourceKind::Texture {
            mip_level_count, ..
        } = &mut self.kind
        {
            *mip_level_count = count;
        }
        self
    }

    /// Sets the content uploaded at creation.
    pub fn with_initial_data(mut self, data: impl Into<Arc<[u8]>>) -> Self {
        self.initial_data = Some(data.into());
        self
    }

    /// Total bytes of the resource in its packed layout.
    pub fn byte_size(&self) -> u64 {
        self.kind.byte_size(self.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_is_packed_per_layer() {
        let kind = ResourceKind::Texture {
            dimension: TextureDimension::D2,
            extent: Extent3D {
                width: 4,
                height: 4,
                depth_or_array_layers: 2,
            },
            mip_level_count: 3,
            sample_count: 1,
        };
        // 4x4 + 2x2 + 1x1 texels of 4 bytes = 84 bytes per layer.
        let second_layer_mip1 = kind.footprint(Format::Rgba8Unorm, 1, 1).unwrap();
        assert_eq!(second_layer_mip1.offset, 84 + 64);
        assert_eq!(second_layer_mip1.row_pitch, 8);
        assert_eq!(second_layer_mip1.size, 16);
        assert_eq!(kind.byte_size(Format::Rgba8Unorm), 168);
        assert!(kind.footprint(Format::Rgba8Unorm, 3, 0).is_none());
    }

    #[test]
    fn volumetric_textures_have_one_layer() {
        let kind = ResourceKind::Texture {
            dimension: TextureDimension::D3,
            extent: Extent3D {
                width: 8,
                height: 8,
                depth_or_array_layers: 8,
            },
            mip_level_count: 2,
            sample_count: 1,
        };
        assert_eq!(kind.array_layer_count(), 1);
        assert_eq!(kind.mip_extent(1).unwrap().depth_or_array_layers, 4);
        assert_eq!(kind.byte_size(Format::R8Unorm), 512 + 64);
    }
}
