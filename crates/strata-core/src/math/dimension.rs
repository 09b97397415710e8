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

//! Integer extents and origins used to describe textures and regions within them.

/// A three-dimensional extent, representing width, height, and depth.
///
/// For two-dimensional textures the third component counts array layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extent3D {
    /// The width component of the extent.
    pub width: u32,
    /// The height component of the extent.
    pub height: u32,
    /// The depth or number of array layers.
    pub depth_or_array_layers: u32,
}

impl Extent3D {
    /// Creates a two-dimensional extent with a single layer.
    pub const fn d2(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth_or_array_layers: 1,
        }
    }

    /// Returns `true` if any component is zero.
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth_or_array_layers == 0
    }

    /// Returns the extent of the given mip level for a texture whose third component is
    /// volumetric depth. Every component is clamped to one.
    pub fn mip_level_size(&self, level: u32, volumetric: bool) -> Self {
        let shrink = |v: u32| (v >> level).max(1);
        Self {
            width: shrink(self.width),
            height: shrink(self.height),
            depth_or_array_layers: if volumetric {
                shrink(self.depth_or_array_layers)
            } else {
                1
            },
        }
    }

    /// Returns the maximum number of mip levels a texture of this extent can have.
    pub fn max_mip_levels(&self, volumetric: bool) -> u32 {
        let depth = if volumetric {
            self.depth_or_array_layers
        } else {
            1
        };
        let largest = self.width.max(self.height).max(depth).max(1);
        32 - largest.leading_zeros()
    }

    /// Number of texels in a single layer of this extent.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth_or_array_layers as u64
    }
}

/// A three-dimensional origin, representing an (x, y, z) offset.
///
/// This is often used to specify the corner of a 3D volume or an offset
/// into a texture array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Origin3D {
    /// The x-coordinate of the origin.
    pub x: u32,
    /// The y-coordinate of the origin.
    pub y: u32,
    /// The z-coordinate of the origin.
    pub z: u32,
}

impl Origin3D {
    /// The origin at `(0, 0, 0)`.
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_shrink_to_one() {
        let extent = Extent3D::d2(256, 64);
        assert_eq!(extent.max_mip_levels(false), 9);
        assert_eq!(extent.mip_level_size(3, false), Extent3D::d2(32, 8));
        assert_eq!(extent.mip_level_size(8, false), Extent3D::d2(1, 1));
    }

    #[test]
    fn array_layers_do_not_shrink() {
        let extent = Extent3D {
            width: 16,
            height: 16,
            depth_or_array_layers: 6,
        };
        assert_eq!(extent.mip_level_size(1, false).depth_or_array_layers, 1);
        assert_eq!(extent.mip_level_size(1, true).depth_or_array_layers, 3);
        assert_eq!(extent.max_mip_levels(false), 5);
    }

    #[test]
    fn empty_extent_is_detected() {
        assert!(Extent3D::d2(0, 4).is_empty());
        assert!(!Extent3D::d2(1, 1).is_empty());
    }
}
