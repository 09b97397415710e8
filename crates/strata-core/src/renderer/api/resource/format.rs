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

//! Texel formats for resources and views.

/// Specifies the memory format of the texels of a texture or of a typed view.
///
/// Buffers use [`Format::Undefined`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    /// No texel format. Used for buffers.
    #[default]
    Undefined,
    // 8-bit formats
    /// One 8-bit unsigned normalized component.
    R8Unorm,
    /// Two 8-bit unsigned normalized components.
    Rg8Unorm,
    /// Four 8-bit unsigned normalized components.
    Rgba8Unorm,
    /// Four 8-bit unsigned normalized components, sRGB encoded.
    Rgba8UnormSrgb,
    /// Four 8-bit unsigned normalized components in BGRA order.
    Bgra8Unorm,
    /// Four 8-bit unsigned normalized components in BGRA order, sRGB encoded.
    Bgra8UnormSrgb,
    // 16-bit float formats
    /// One 16-bit float component.
    R16Float,
    /// Two 16-bit float components.
    Rg16Float,
    /// Four 16-bit float components.
    Rgba16Float,
    // 32-bit formats
    /// One 32-bit float component.
    R32Float,
    /// Two 32-bit float components.
    Rg32Float,
    /// Four 32-bit float components.
    Rgba32Float,
    /// One 32-bit unsigned integer component.
    R32Uint,
    // Depth/stencil formats
    /// 16-bit depth.
    Depth16Unorm,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// 32-bit float depth.
    Depth32Float,
}

impl Format {
    /// Size in bytes of a single texel, or `0` for [`Format::Undefined`].
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::Rg8Unorm | Format::R16Float | Format::Depth16Unorm => 2,
            Format::Rgba8Unorm
            | Format::Rgba8UnormSrgb
            | Format::Bgra8Unorm
            | Format::Bgra8UnormSrgb
            | Format::Rg16Float
            | Format::R32Float
            | Format::R32Uint
            | Format::Depth24PlusStencil8
            | Format::Depth32Float => 4,
            Format::Rgba16Float | Format::Rg32Float => 8,
            Format::Rgba32Float => 16,
        }
    }

    /// Number of components per texel.
    pub const fn component_count(self) -> u32 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm
            | Format::R16Float
            | Format::R32Float
            | Format::R32Uint
            | Format::Depth16Unorm
            | Format::Depth32Float => 1,
            Format::Rg8Unorm | Format::Rg16Float | Format::Rg32Float => 2,
            Format::Depth24PlusStencil8 => 2,
            _ => 4,
        }
    }

    /// Returns `true` if this is a depth or depth/stencil format.
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Format::Depth16Unorm | Format::Depth24PlusStencil8 | Format::Depth32Float
        )
    }

    /// Returns `true` if this format has a stencil aspect.
    pub const fn has_stencil(self) -> bool {
        matches!(self, Format::Depth24PlusStencil8)
    }

    /// Returns `true` for color formats.
    pub const fn is_color(self) -> bool {
        !self.is_depth() && !matches!(self, Format::Undefined)
    }

    /// Returns `true` if this format stores sRGB encoded color.
    pub const fn is_srgb(self) -> bool {
        matches!(self, Format::Rgba8UnormSrgb | Format::Bgra8UnormSrgb)
    }

    /// Returns `true` if the format can be written through an unordered access view.
    pub const fn supports_storage(self) -> bool {
        matches!(
            self,
            Format::Rgba8Unorm
                | Format::Rgba16Float
                | Format::R32Float
                | Format::Rg32Float
                | Format::Rgba32Float
                | Format::R32Uint
        )
    }

    /// Returns the linear counterpart of an sRGB format, or the format itself.
    pub const fn linear(self) -> Self {
        match self {
            Format::Rgba8UnormSrgb => Format::Rgba8Unorm,
            Format::Bgra8UnormSrgb => Format::Bgra8Unorm,
            other => other,
        }
    }

    /// Returns `true` if a view of format `self` may reinterpret a resource of
    /// format `other`. Only sRGB/linear pairs are interchangeable.
    pub fn is_view_compatible(self, other: Format) -> bool {
        self == other || self.linear() == other.linear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_not_color() {
        assert!(Format::Depth32Float.is_depth());
        assert!(!Format::Depth32Float.is_color());
        assert!(Format::Depth24PlusStencil8.has_stencil());
        assert!(!Format::Undefined.is_color());
    }

    #[test]
    fn srgb_pairs_are_view_compatible() {
        assert!(Format::Rgba8UnormSrgb.is_view_compatible(Format::Rgba8Unorm));
        assert!(!Format::Rgba8Unorm.is_view_compatible(Format::Bgra8Unorm));
        assert_eq!(Format::Rgba16Float.bytes_per_texel(), 8);
    }
}
