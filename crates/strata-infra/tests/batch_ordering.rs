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

//! Commands execute in the order they were recorded.

mod common;

use common::*;
use strata_core::math::LinearRgba;
use strata_core::renderer::*;
use strata_infra::graphics::software::texel;

fn staging_buffer(harness: &Harness, size: u64) -> anyhow::Result<Resource> {
    Ok(harness.device.create_resource(&ResourceDescriptor::buffer(
        Some("staging"),
        size,
        ResourceUsage::COPY_DST | ResourceUsage::COPY_SRC,
    ))?)
}

#[test]
fn overlapping_updates_apply_in_recording_order() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let buffer = staging_buffer(&harness, 16)?;
        let mut batch = harness.device.create_transfer_batch()?;
        batch.insert(buffer.transition(ResourceState::CopyDst)?)?;

        // --- ACT ---
        batch.update_buffer(&buffer, 0, vec![1u8; 8])?;
        batch.update_buffer(&buffer, 4, vec![2u8; 8])?;
        batch.update_buffer(&buffer, 0, vec![3u8; 4])?;
        batch.finish()?;
        harness.device.submit(batch)?.wait(WAIT)?;
        let offsets = harness.last_update_offsets();
        let bytes = harness.device.read_resource(&buffer)?;

        // --- ASSERT ---
        let mut expected = vec![3u8; 4];
        expected.extend([2u8; 8]);
        expected.extend([0u8; 4]);
        assert_eq!(bytes, expected, "{}", harness.backend());
        assert_eq!(offsets, vec![0, 4, 0], "{}", harness.backend());
    }
    Ok(())
}

#[test]
fn a_copy_sees_the_update_recorded_before_it() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let source = staging_buffer(&harness, 16)?;
        let destination = staging_buffer(&harness, 16)?;
        let mut batch = harness.device.create_transfer_batch()?;
        batch.insert(source.transition(ResourceState::CopyDst)?)?;
        batch.insert(destination.transition(ResourceState::CopyDst)?)?;

        // --- ACT ---
        batch.update_buffer(&source, 0, (1u8..=16).collect::<Vec<_>>())?;
        batch.insert(source.transition(ResourceState::CopySrc)?)?;
        batch.copy_buffer(BufferCopy {
            src: source.clone(),
            src_offset: 8,
            dst: destination.clone(),
            dst_offset: 0,
            size: 8,
        })?;
        batch.update_buffer(&source, 0, vec![0u8; 16]).unwrap_err();
        batch.finish()?;
        harness.device.submit(batch)?.wait(WAIT)?;

        // --- ASSERT ---
        let copied = harness.device.read_resource(&destination)?;
        assert_eq!(&copied[..8], &[9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(&copied[8..], &[0u8; 8]);
    }
    Ok(())
}

#[test]
fn malformed_updates_are_rejected_before_recording() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        let buffer = staging_buffer(&harness, 16)?;
        let mut batch = harness.device.create_transfer_batch()?;
        batch.insert(buffer.transition(ResourceState::CopyDst)?)?;

        assert!(batch.update_buffer(&buffer, 0, Vec::<u8>::new()).is_err());
        assert!(batch.update_buffer(&buffer, 2, vec![0u8; 4]).is_err());
        assert!(batch.update_buffer(&buffer, 0, vec![0u8; 6]).is_err());
        assert!(batch.update_buffer(&buffer, 12, vec![0u8; 8]).is_err());
        assert_eq!(batch.len(), 1, "{}", harness.backend());
    }
    Ok(())
}

#[test]
fn a_transfer_between_draws_suspends_the_render_pass() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let constant = LinearRgba::rgb(0.0, 1.0, 0.0);
        let (target, view) = color_target(device, "rt", 16, 16, Format::Rgba8Unorm)?;
        let technique = device.create_technique(
            &constant_technique("fill", Format::Rgba8Unorm, constant),
            &empty_layout(device)?,
        )?;
        let pass = clearing_pass(device, "fill", &technique, view, LinearRgba::RED)?;
        let buffer = staging_buffer(&harness, 16)?;
        let mut batch = device.create_batch(&pass)?;
        batch.insert(target.transition(ResourceState::RenderTarget)?)?;

        // --- ACT ---
        batch.draw(0..3, 0..1)?;
        batch.insert(buffer.transition(ResourceState::CopyDst)?)?;
        batch.update_buffer(&buffer, 0, vec![7u8; 16])?;
        batch.draw(0..3, 0..1)?;
        batch.finish()?;
        device.submit(batch)?.wait(WAIT)?;
        let streams = harness.native_streams();

        // --- ASSERT ---
        let pixels = device.read_resource(&target)?;
        let expected = texel::encode(Format::Rgba8Unorm, constant.to_array());
        assert!(all_texels_are(&pixels, &expected), "{}", harness.backend());
        assert_eq!(device.read_resource(&buffer)?, vec![7u8; 16]);
        assert!(
            harness.validation_messages().is_empty(),
            "{:?}",
            harness.validation_messages()
        );

        if harness.backend() == BackendType::Vulkan {
            let stream = streams.last().map(Vec::as_slice).unwrap_or_default();
            let update = stream
                .iter()
                .position(|name| *name == "vkCmdUpdateBuffer")
                .expect("the update was translated");
            let last_begin_before = stream[..update]
                .iter()
                .rposition(|name| *name == "vkCmdBeginRendering")
                .expect("rendering began before the update");
            assert!(stream[last_begin_before..update].contains(&"vkCmdEndRendering"));
            assert!(stream[update..].contains(&"vkCmdBeginRendering"));
            assert_eq!(
                stream.iter().filter(|name| **name == "vkCmdDraw").count(),
                2
            );
        }
    }
    Ok(())
}
