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

//! The operations the software GPU executes on memory.
//!
//! Textures live in the packed layout of [`ResourceKind::footprint`], so initial data,
//! readback and every copy use one addressing scheme. Both software drivers translate
//! their native commands into these functions.

use super::texel;
use crate::graphics::common::DriverError;
use strata_core::renderer::{Format, ResourceKind, SubresourceRange};

/// How a texture is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub kind: ResourceKind,
    /// The format texels are read and written in. Views may use any format with the
    /// same texel size.
    pub format: Format,
}

/// A texel position inside one subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexelCoord {
    pub mip_level: u32,
    pub array_layer: u32,
    pub origin: [u32; 3],
}

impl ImageShape {
    pub fn new(kind: ResourceKind, format: Format) -> Self {
        Self { kind, format }
    }

    /// The same storage read through another format.
    pub fn viewed_as(self, format: Format) -> Self {
        Self { format, ..self }
    }

    pub fn byte_size(&self) -> u64 {
        self.kind.byte_size(self.format)
    }

    fn texel_size(&self) -> usize {
        self.format.bytes_per_texel() as usize * self.kind.sample_count() as usize
    }

    /// Byte segments covering `extent` texels from `coord`, one per row, in slice then
    /// row order.
    fn rows(&self, coord: TexelCoord, extent: [u32; 3]) -> Result<Vec<(usize, usize)>, DriverError> {
        let footprint = self
            .kind
            .footprint(self.format, coord.mip_level, coord.array_layer)
            .ok_or_else(|| {
                out_of_bounds(format!(
                    "subresource mip {} layer {}",
                    coord.mip_level, coord.array_layer
                ))
            })?;
        let size = [
            footprint.extent.width,
            footprint.extent.height,
            footprint.extent.depth_or_array_layers,
        ];
        for axis in 0..3 {
            if coord.origin[axis] as u64 + extent[axis] as u64 > size[axis] as u64 {
                return Err(out_of_bounds(format!(
                    "region {:?}+{:?} of a {:?} subresource",
                    coord.origin, extent, size
                )));
            }
        }
        let texel = self.texel_size() as u64;
        let row_len = (extent[0] as u64 * texel) as usize;
        let mut rows = Vec::with_capacity((extent[1] * extent[2]) as usize);
        for z in 0..extent[2] as u64 {
            for y in 0..extent[1] as u64 {
                let offset = footprint.offset
                    + (coord.origin[2] as u64 + z) * footprint.slice_pitch
                    + (coord.origin[1] as u64 + y) * footprint.row_pitch
                    + coord.origin[0] as u64 * texel;
                rows.push((offset as usize, row_len));
            }
        }
        Ok(rows)
    }

    /// Byte segments of every subresource in `range`.
    fn subresources(&self, range: SubresourceRange) -> Result<Vec<(usize, usize)>, DriverError> {
        let mut out = Vec::new();
        for layer in range.base_array_layer..range.base_array_layer + range.array_layer_count {
            for mip in range.base_mip_level..range.base_mip_level + range.mip_level_count {
                let footprint = self.kind.footprint(self.format, mip, layer).ok_or_else(|| {
                    out_of_bounds(format!("subresource mip {} layer {}", mip, layer))
                })?;
                out.push((footprint.offset as usize, footprint.size as usize));
            }
        }
        Ok(out)
    }
}

fn out_of_bounds(what: String) -> DriverError {
    DriverError::Unsupported(format!("out of bounds: {what}"))
}

fn segment<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], DriverError> {
    data.get(offset..offset + len)
        .ok_or_else(|| out_of_bounds(format!("{len} bytes at {offset} of {}", data.len())))
}

fn segment_mut<'a>(data: &'a mut [u8], offset: usize, len: usize) -> Result<&'a mut [u8], DriverError> {
    let total = data.len();
    data.get_mut(offset..offset + len)
        .ok_or_else(|| out_of_bounds(format!("{len} bytes at {offset} of {total}")))
}

/// Runs `f` on every texel (every sample of multisampled textures) in `range`.
fn for_each_texel(
    data: &mut [u8],
    shape: &ImageShape,
    range: SubresourceRange,
    mut f: impl FnMut(&mut [u8]),
) -> Result<(), DriverError> {
    let bpt = shape.format.bytes_per_texel() as usize;
    if bpt == 0 {
        return Ok(());
    }
    for (offset, len) in shape.subresources(range)? {
        for texel in segment_mut(data, offset, len)?.chunks_exact_mut(bpt) {
            f(texel);
        }
    }
    Ok(())
}

/// Writes `color` into every texel of `range`.
pub fn clear_color(
    data: &mut [u8],
    shape: &ImageShape,
    range: SubresourceRange,
    color: [f32; 4],
) -> Result<(), DriverError> {
    let packed = texel::encode(shape.format, color);
    for_each_texel(data, shape, range, |t| t.copy_from_slice(&packed))
}

/// Writes depth and/or stencil into every texel of `range`.
pub fn clear_depth_stencil(
    data: &mut [u8],
    shape: &ImageShape,
    range: SubresourceRange,
    depth: Option<f32>,
    stencil: Option<u8>,
) -> Result<(), DriverError> {
    for_each_texel(data, shape, range, |t| {
        texel::write_depth_stencil(shape.format, depth, stencil, t)
    })
}

/// Copies `extent` texels between two textures of equal texel size.
pub fn copy_texture(
    src: &[u8],
    src_shape: &ImageShape,
    src_coord: TexelCoord,
    dst: &mut [u8],
    dst_shape: &ImageShape,
    dst_coord: TexelCoord,
    extent: [u32; 3],
) -> Result<(), DriverError> {
    if src_shape.texel_size() != dst_shape.texel_size() {
        return Err(DriverError::Unsupported(format!(
            "copy between {:?} and {:?}",
            src_shape.format, dst_shape.format
        )));
    }
    let src_rows = src_shape.rows(src_coord, extent)?;
    let dst_rows = dst_shape.rows(dst_coord, extent)?;
    for ((src_offset, len), (dst_offset, _)) in src_rows.into_iter().zip(dst_rows) {
        segment_mut(dst, dst_offset, len)?.copy_from_slice(segment(src, src_offset, len)?);
    }
    Ok(())
}

/// Copies tightly packed rows starting at `offset` of `buffer` into a texture region.
pub fn copy_buffer_to_texture(
    buffer: &[u8],
    offset: u64,
    dst: &mut [u8],
    shape: &ImageShape,
    coord: TexelCoord,
    extent: [u32; 3],
) -> Result<(), DriverError> {
    let mut cursor = offset as usize;
    for (dst_offset, len) in shape.rows(coord, extent)? {
        segment_mut(dst, dst_offset, len)?.copy_from_slice(segment(buffer, cursor, len)?);
        cursor += len;
    }
    Ok(())
}

/// Copies a texture region into tightly packed rows starting at `offset` of `buffer`.
pub fn copy_texture_to_buffer(
    src: &[u8],
    shape: &ImageShape,
    coord: TexelCoord,
    extent: [u32; 3],
    buffer: &mut [u8],
    offset: u64,
) -> Result<(), DriverError> {
    let mut cursor = offset as usize;
    for (src_offset, len) in shape.rows(coord, extent)? {
        segment_mut(buffer, cursor, len)?.copy_from_slice(segment(src, src_offset, len)?);
        cursor += len;
    }
    Ok(())
}

/// Copies `size` bytes between two byte ranges.
pub fn copy_bytes(
    src: &[u8],
    src_offset: u64,
    dst: &mut [u8],
    dst_offset: u64,
    size: u64,
) -> Result<(), DriverError> {
    let size = size as usize;
    segment_mut(dst, dst_offset as usize, size)?
        .copy_from_slice(segment(src, src_offset as usize, size)?);
    Ok(())
}

// --- Blending ---

/// A blend factor, shared by both drivers' native enums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    Constant,
    OneMinusConstant,
}

/// A blend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// The output merger state a draw writes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendParams {
    pub enabled: bool,
    pub src_color: Factor,
    pub dst_color: Factor,
    pub color_op: Operation,
    pub src_alpha: Factor,
    pub dst_alpha: Factor,
    pub alpha_op: Operation,
    /// R 1, G 2, B 4, A 8.
    pub write_mask: u8,
}

impl Default for BlendParams {
    fn default() -> Self {
        Self {
            enabled: false,
            src_color: Factor::One,
            dst_color: Factor::Zero,
            color_op: Operation::Add,
            src_alpha: Factor::One,
            dst_alpha: Factor::Zero,
            alpha_op: Operation::Add,
            write_mask: 0xF,
        }
    }
}

impl BlendParams {
    fn factor(factor: Factor, channel: usize, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> f32 {
        match factor {
            Factor::Zero => 0.0,
            Factor::One => 1.0,
            Factor::SrcColor => src[channel],
            Factor::OneMinusSrcColor => 1.0 - src[channel],
            Factor::DstColor => dst[channel],
            Factor::OneMinusDstColor => 1.0 - dst[channel],
            Factor::SrcAlpha => src[3],
            Factor::OneMinusSrcAlpha => 1.0 - src[3],
            Factor::DstAlpha => dst[3],
            Factor::OneMinusDstAlpha => 1.0 - dst[3],
            Factor::Constant => constant[channel],
            Factor::OneMinusConstant => 1.0 - constant[channel],
        }
    }

    /// The color written when a fragment of color `src` lands on `dst`.
    pub fn apply(&self, src: [f32; 4], dst: [f32; 4], constant: [f32; 4]) -> [f32; 4] {
        let mut out = dst;
        for (channel, value) in out.iter_mut().enumerate() {
            if self.write_mask & (1 << channel) == 0 {
                continue;
            }
            if !self.enabled {
                *value = src[channel];
                continue;
            }
            let (src_factor, dst_factor, op) = if channel == 3 {
                (self.src_alpha, self.dst_alpha, self.alpha_op)
            } else {
                (self.src_color, self.dst_color, self.color_op)
            };
            let s = src[channel] * Self::factor(src_factor, channel, src, dst, constant);
            let d = dst[channel] * Self::factor(dst_factor, channel, src, dst, constant);
            *value = match op {
                Operation::Add => s + d,
                Operation::Subtract => s - d,
                Operation::ReverseSubtract => d - s,
                Operation::Min => src[channel].min(dst[channel]),
                Operation::Max => src[channel].max(dst[channel]),
            };
        }
        out
    }
}

/// Covers every texel of `range` with a fragment of `color`, blended by `blend`.
///
/// This is what a draw amounts to without shader execution: the fragment color is the
/// pipeline's constant, so identical techniques write identical texels.
pub fn draw_constant(
    data: &mut [u8],
    shape: &ImageShape,
    range: SubresourceRange,
    color: [f32; 4],
    blend: &BlendParams,
) -> Result<(), DriverError> {
    if !shape.format.is_color() {
        return Ok(());
    }
    if !blend.enabled && blend.write_mask & 0xF == 0xF {
        return clear_color(data, shape, range, color);
    }
    for_each_texel(data, shape, range, |t| {
        let dst = texel::decode(shape.format, t);
        let out = blend.apply(color, dst, color);
        t.copy_from_slice(&texel::encode(shape.format, out));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use strata_core::math::Extent3D;
    use strata_core::renderer::TextureDimension;

    fn subresource_origin(mip_level: u32, array_layer: u32) -> TexelCoord {
        TexelCoord {
            mip_level,
            array_layer,
            origin: [0; 3],
        }
    }

    fn shape(width: u32, height: u32, layers: u32, mips: u32) -> ImageShape {
        ImageShape::new(
            ResourceKind::Texture {
                dimension: TextureDimension::D2,
                extent: Extent3D {
                    width,
                    height,
                    depth_or_array_layers: layers,
                },
                mip_level_count: mips,
                sample_count: 1,
            },
            Format::Rgba8Unorm,
        )
    }

    fn whole(shape: &ImageShape) -> SubresourceRange {
        SubresourceRange {
            base_mip_level: 0,
            mip_level_count: shape.kind.mip_level_count(),
            base_array_layer: 0,
            array_layer_count: shape.kind.array_layer_count(),
        }
    }

    #[test]
    fn clear_touches_only_the_requested_layer() {
        // --- ARRANGE ---
        let shape = shape(2, 2, 2, 1);
        let mut data = vec![0u8; shape.byte_size() as usize];

        // --- ACT ---
        clear_color(
            &mut data,
            &shape,
            SubresourceRange::single(0, 1),
            [1.0, 0.0, 0.0, 1.0],
        )
        .expect("clear");

        // --- ASSERT ---
        assert!(data[..16].iter().all(|b| *b == 0));
        assert_eq!(&data[16..20], &[255, 0, 0, 255]);
        assert_eq!(&data[28..32], &[255, 0, 0, 255]);
    }

    #[test]
    fn region_copies_respect_row_pitch() {
        // --- ARRANGE ---
        let src_shape = shape(4, 4, 1, 1);
        let src: Vec<u8> = (0..src_shape.byte_size()).map(|b| b as u8).collect();
        let dst_shape = shape(2, 2, 1, 1);
        let mut dst = vec![0u8; dst_shape.byte_size() as usize];

        // --- ACT ---
        copy_texture(
            &src,
            &src_shape,
            TexelCoord {
                mip_level: 0,
                array_layer: 0,
                origin: [1, 2, 0],
            },
            &mut dst,
            &dst_shape,
            subresource_origin(0, 0),
            [2, 2, 1],
        )
        .expect("copy");

        // --- ASSERT ---
        // Texel (1, 2) of a 4-wide RGBA8 image starts at byte (2 * 4 + 1) * 4.
        assert_eq!(&dst[..8], &src[36..44]);
        assert_eq!(&dst[8..16], &src[52..60]);
    }

    #[test]
    fn out_of_bounds_regions_are_rejected() {
        let shape = shape(2, 2, 1, 2);
        let mut data = vec![0u8; shape.byte_size() as usize];
        let buffer = vec![0u8; 64];
        let result = copy_buffer_to_texture(&buffer, 0, &mut data, &shape, subresource_origin(1, 0), [2, 1, 1]);
        assert!(matches!(result, Err(DriverError::Unsupported(_))));
    }

    #[test]
    fn buffer_copies_round_trip_a_mip_level() {
        // --- ARRANGE ---
        let shape = shape(4, 4, 1, 3);
        let mut image = vec![0u8; shape.byte_size() as usize];
        let rows: Vec<u8> = (0..16).collect();

        // --- ACT ---
        copy_buffer_to_texture(&rows, 0, &mut image, &shape, subresource_origin(1, 0), [2, 2, 1])
            .expect("upload");
        let mut out = vec![0u8; 16];
        copy_texture_to_buffer(&image, &shape, subresource_origin(1, 0), [2, 2, 1], &mut out, 0)
            .expect("download");

        // --- ASSERT ---
        assert_eq!(out, rows);
        assert!(image[..64].iter().all(|b| *b == 0), "mip 0 is untouched");
    }

    #[test]
    fn draws_blend_over_the_destination() {
        // --- ARRANGE ---
        let shape = shape(1, 1, 1, 1);
        let mut data = texel::encode(Format::Rgba8Unorm, [0.0, 0.0, 1.0, 1.0]);
        let blend = BlendParams {
            enabled: true,
            src_color: Factor::SrcAlpha,
            dst_color: Factor::OneMinusSrcAlpha,
            src_alpha: Factor::One,
            dst_alpha: Factor::OneMinusSrcAlpha,
            ..BlendParams::default()
        };

        // --- ACT ---
        draw_constant(&mut data, &shape, whole(&shape), [1.0, 0.0, 0.0, 0.5], &blend)
            .expect("draw");

        // --- ASSERT ---
        let color = texel::decode(Format::Rgba8Unorm, &data);
        assert_relative_eq!(color[0], 0.5, epsilon = 0.01);
        assert_relative_eq!(color[2], 0.5, epsilon = 0.01);
        assert_relative_eq!(color[3], 1.0, epsilon = 0.01);
    }

    #[test]
    fn write_mask_keeps_masked_channels() {
        let shape = shape(1, 1, 1, 1);
        let mut data = vec![10, 20, 30, 40];
        let blend = BlendParams {
            write_mask: 0b0001,
            ..BlendParams::default()
        };
        draw_constant(&mut data, &shape, whole(&shape), [1.0, 1.0, 1.0, 1.0], &blend)
            .expect("draw");
        assert_eq!(data, vec![255, 20, 30, 40]);
    }
}
