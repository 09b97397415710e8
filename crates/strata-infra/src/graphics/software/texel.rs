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

//! Texel packing for every [`Format`] the software GPU stores.
//!
//! Colors travel as linear `[f32; 4]`. sRGB formats encode on write and decode on read;
//! BGRA formats swap red and blue in memory. Depth formats carry depth in the first
//! component and stencil in the second.

use half::f16;
use strata_core::math::color::{linear_to_srgb, srgb_to_linear};
use strata_core::renderer::Format;

fn unorm8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn unorm16(c: f32) -> u16 {
    (c.clamp(0.0, 1.0) * 65535.0).round() as u16
}

fn unorm24(c: f32) -> u32 {
    (c.clamp(0.0, 1.0) * 16_777_215.0).round() as u32
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn read_f32(bytes: &[u8]) -> f32 {
    bytemuck::pod_read_unaligned(&bytes[..4])
}

fn read_f16(bytes: &[u8]) -> f32 {
    f16::from_le_bytes([bytes[0], bytes[1]]).to_f32()
}

/// Packs a linear color into one texel of `format`.
///
/// Components the format lacks are dropped. Depth formats take depth from the first
/// component and stencil from the second.
pub fn encode(format: Format, color: [f32; 4]) -> Vec<u8> {
    let srgb = |c: [f32; 4]| {
        [
            linear_to_srgb(c[0]),
            linear_to_srgb(c[1]),
            linear_to_srgb(c[2]),
            c[3],
        ]
    };
    match format {
        Format::Undefined => Vec::new(),
        Format::R8Unorm => vec![unorm8(color[0])],
        Format::Rg8Unorm => vec![unorm8(color[0]), unorm8(color[1])],
        Format::Rgba8Unorm => color.iter().map(|c| unorm8(*c)).collect(),
        Format::Rgba8UnormSrgb => srgb(color).iter().map(|c| unorm8(*c)).collect(),
        Format::Bgra8Unorm => [color[2], color[1], color[0], color[3]]
            .iter()
            .map(|c| unorm8(*c))
            .collect(),
        Format::Bgra8UnormSrgb => {
            let c = srgb(color);
            [c[2], c[1], c[0], c[3]].iter().map(|c| unorm8(*c)).collect()
        }
        Format::R16Float | Format::Rg16Float | Format::Rgba16Float => color
            [..format.component_count() as usize]
            .iter()
            .flat_map(|c| f16::from_f32(*c).to_le_bytes())
            .collect(),
        Format::R32Float | Format::Rg32Float | Format::Rgba32Float => {
            bytemuck::cast_slice(&color[..format.component_count() as usize]).to_vec()
        }
        Format::R32Uint => (color[0].max(0.0).round() as u32).to_le_bytes().to_vec(),
        Format::Depth16Unorm | Format::Depth24PlusStencil8 | Format::Depth32Float => {
            let mut texel = vec![0; format.bytes_per_texel() as usize];
            write_depth_stencil(
                format,
                Some(color[0]),
                Some(color[1].max(0.0).round() as u8),
                &mut texel,
            );
            texel
        }
    }
}

/// Unpacks one texel of `format` into a linear color. Missing components read as
/// `0.0`, a missing alpha as `1.0`.
pub fn decode(format: Format, texel: &[u8]) -> [f32; 4] {
    let unorm = |b: u8| b as f32 / 255.0;
    let mut color = [0.0, 0.0, 0.0, 1.0];
    match format {
        Format::Undefined => {}
        Format::R8Unorm | Format::Rg8Unorm | Format::Rgba8Unorm => {
            for (c, b) in color.iter_mut().zip(texel) {
                *c = unorm(*b);
            }
        }
        Format::Rgba8UnormSrgb => {
            for (i, b) in texel.iter().take(4).enumerate() {
                color[i] = if i < 3 {
                    srgb_to_linear(unorm(*b))
                } else {
                    unorm(*b)
                };
            }
        }
        Format::Bgra8Unorm | Format::Bgra8UnormSrgb => {
            let convert = |b: u8| {
                if format.is_srgb() {
                    srgb_to_linear(unorm(b))
                } else {
                    unorm(b)
                }
            };
            color = [
                convert(texel[2]),
                convert(texel[1]),
                convert(texel[0]),
                unorm(texel[3]),
            ];
        }
        Format::R16Float | Format::Rg16Float | Format::Rgba16Float => {
            for (c, bytes) in color.iter_mut().zip(texel.chunks_exact(2)) {
                *c = read_f16(bytes);
            }
        }
        Format::R32Float | Format::Rg32Float | Format::Rgba32Float => {
            for (c, bytes) in color.iter_mut().zip(texel.chunks_exact(4)) {
                *c = read_f32(bytes);
            }
        }
        Format::R32Uint => color[0] = read_u32(texel) as f32,
        Format::Depth16Unorm | Format::Depth24PlusStencil8 | Format::Depth32Float => {
            let (depth, stencil) = read_depth_stencil(format, texel);
            color[0] = depth;
            color[1] = stencil as f32;
        }
    }
    color
}

/// Overwrites the depth and/or stencil part of a depth texel. A `None` part keeps
/// its value; stencil is ignored by formats without one.
///
/// `Depth24PlusStencil8` stores depth in the low 24 bits and stencil in the high 8.
pub fn write_depth_stencil(format: Format, depth: Option<f32>, stencil: Option<u8>, texel: &mut [u8]) {
    match format {
        Format::Depth16Unorm => {
            if let Some(depth) = depth {
                texel[..2].copy_from_slice(&unorm16(depth).to_le_bytes());
            }
        }
        Format::Depth24PlusStencil8 => {
            let mut packed = read_u32(texel);
            if let Some(depth) = depth {
                packed = (packed & 0xFF00_0000) | unorm24(depth);
            }
            if let Some(stencil) = stencil {
                packed = (packed & 0x00FF_FFFF) | ((stencil as u32) << 24);
            }
            texel[..4].copy_from_slice(&packed.to_le_bytes());
        }
        Format::Depth32Float => {
            if let Some(depth) = depth {
                texel[..4].copy_from_slice(bytemuck::bytes_of(&depth));
            }
        }
        _ => log::warn!("software GPU: depth write to color format {:?}", format),
    }
}

/// Reads depth and stencil out of a depth texel. Stencil is 0 for formats without one.
pub fn read_depth_stencil(format: Format, texel: &[u8]) -> (f32, u8) {
    match format {
        Format::Depth16Unorm => (
            u16::from_le_bytes([texel[0], texel[1]]) as f32 / 65535.0,
            0,
        ),
        Format::Depth24PlusStencil8 => {
            let packed = read_u32(texel);
            (
                (packed & 0x00FF_FFFF) as f32 / 16_777_215.0,
                (packed >> 24) as u8,
            )
        }
        Format::Depth32Float => (read_f32(texel), 0),
        _ => (0.0, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn unorm_formats_round_to_the_nearest_step() {
        assert_eq!(encode(Format::Rgba8Unorm, [1.0, 0.5, 0.0, 1.0]), vec![255, 128, 0, 255]);
        assert_eq!(encode(Format::R8Unorm, [2.0, 1.0, 1.0, 1.0]), vec![255]);
        assert_eq!(encode(Format::Rg8Unorm, [-1.0, 0.2, 0.0, 0.0]), vec![0, 51]);
    }

    #[test]
    fn bgra_swaps_red_and_blue_in_memory() {
        let texel = encode(Format::Bgra8Unorm, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(texel, vec![0, 0, 255, 255]);
        assert_eq!(decode(Format::Bgra8Unorm, &texel), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn srgb_formats_encode_linear_colors() {
        // --- ARRANGE ---
        let linear = [0.2, 0.5, 1.0, 0.5];

        // --- ACT ---
        let texel = encode(Format::Rgba8UnormSrgb, linear);
        let decoded = decode(Format::Rgba8UnormSrgb, &texel);

        // --- ASSERT ---
        assert_eq!(texel[2], 255);
        assert!(texel[0] > unorm8(0.2), "sRGB brightens dark components");
        for (a, b) in decoded.iter().zip(linear) {
            assert_relative_eq!(*a, b, epsilon = 0.01);
        }
    }

    #[test]
    fn float_formats_keep_their_component_count() {
        assert_eq!(encode(Format::R16Float, [1.0, 2.0, 3.0, 4.0]).len(), 2);
        assert_eq!(encode(Format::Rgba16Float, [1.0, 2.0, 3.0, 4.0]).len(), 8);
        assert_eq!(encode(Format::Rg32Float, [1.0, 2.0, 3.0, 4.0]).len(), 8);
        let texel = encode(Format::Rgba16Float, [0.25, -2.0, 3.5, 1.0]);
        assert_eq!(decode(Format::Rgba16Float, &texel), [0.25, -2.0, 3.5, 1.0]);
        let texel = encode(Format::R32Float, [0.1, 0.0, 0.0, 0.0]);
        assert_eq!(decode(Format::R32Float, &texel), [0.1, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn r32_uint_stores_whole_numbers() {
        let texel = encode(Format::R32Uint, [42.4, 0.0, 0.0, 0.0]);
        assert_eq!(texel, 42u32.to_le_bytes().to_vec());
        assert_eq!(decode(Format::R32Uint, &texel)[0], 42.0);
    }

    #[test]
    fn depth24_stencil8_packs_stencil_in_the_high_byte() {
        // --- ARRANGE ---
        let mut texel = encode(Format::Depth24PlusStencil8, [1.0, 7.0, 0.0, 0.0]);

        // --- ACT ---
        write_depth_stencil(Format::Depth24PlusStencil8, Some(0.0), None, &mut texel);

        // --- ASSERT ---
        assert_eq!(texel, vec![0, 0, 0, 7]);
        assert_eq!(read_depth_stencil(Format::Depth24PlusStencil8, &texel), (0.0, 7));
    }

    #[test]
    fn depth_formats_round_trip_depth() {
        for format in [Format::Depth16Unorm, Format::Depth32Float] {
            let texel = encode(format, [0.75, 0.0, 0.0, 0.0]);
            assert_eq!(texel.len(), format.bytes_per_texel() as usize);
            assert_relative_eq!(read_depth_stencil(format, &texel).0, 0.75, epsilon = 1e-4);
        }
    }
}
