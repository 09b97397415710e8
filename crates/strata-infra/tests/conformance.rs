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

//! Behavior both backends must share, exercised through the `Device` trait only.

mod common;

use common::*;
use strata_core::math::LinearRgba;
use strata_core::renderer::*;
use strata_core::RhiError;
use strata_infra::graphics::create_device;
use strata_infra::graphics::software::{texel, SoftwareConfig, SoftwareGpu};

#[test]
fn clear_then_read_back_returns_the_clear_color() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let clear = LinearRgba::new(0.25, 0.5, 0.75, 1.0);
        let (target, view) = color_target(device, "target", 256, 256, Format::Rgba8Unorm)?;
        let layout = empty_layout(device)?;
        let technique = device.create_technique(
            &constant_technique("clear", Format::Rgba8Unorm, LinearRgba::BLACK),
            &layout,
        )?;
        let pass = clearing_pass(device, "clear", &technique, view, clear)?;

        // --- ACT ---
        let mut batch = device.create_batch(&pass)?;
        batch.insert(target.transition(ResourceState::RenderTarget)?)?;
        batch.bind(&pass)?;
        batch.finish()?;
        let token = device.submit(batch)?;
        let status = token.wait(WAIT)?;
        let bytes = device.read_resource(&target)?;

        // --- ASSERT ---
        assert_eq!(status, WaitStatus::Signaled, "{}", harness.backend());
        assert_eq!(bytes.len(), 256 * 256 * 4);
        let expected = texel::encode(Format::Rgba8Unorm, clear.to_array());
        assert!(
            all_texels_are(&bytes, &expected),
            "{}: first texel {:?}, expected {:?}",
            harness.backend(),
            &bytes[..4],
            expected
        );
        assert_eq!(target.current_state(), ResourceState::RenderTarget);
        assert!(
            harness.validation_messages().is_empty(),
            "{:?}",
            harness.validation_messages()
        );
    }
    Ok(())
}

#[test]
fn a_layout_with_a_gap_in_its_slots_is_rejected() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let descriptor = LayoutDescriptor {
            label: Some("gap".into()),
            slots: vec![
                SlotDescriptor::new(0, SlotKind::UniformBuffer, ShaderStageFlags::VERTEX),
                SlotDescriptor::new(2, SlotKind::SampledTexture, ShaderStageFlags::FRAGMENT),
            ],
        };

        // --- ACT ---
        let result = harness.device.create_layout(&descriptor);

        // --- ASSERT ---
        assert!(
            matches!(
                result,
                Err(RhiError::Validation(ValidationError::NonContiguousSlots {
                    expected: 1,
                    found: 2
                }))
            ),
            "{}: {:?}",
            harness.backend(),
            result
        );
        assert_eq!(harness.device.stats().layouts, 0);
    }
    Ok(())
}

#[test]
fn slots_given_out_of_order_are_stored_sorted() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        let layout = harness.device.create_layout(&LayoutDescriptor {
            label: None,
            slots: vec![
                SlotDescriptor::new(1, SlotKind::SampledTexture, ShaderStageFlags::FRAGMENT),
                SlotDescriptor::new(0, SlotKind::UniformBuffer, ShaderStageFlags::VERTEX),
            ],
        })?;

        assert_eq!(layout.slot_count(), 2);
        assert_eq!(
            layout.slot_at(1).map(|slot| slot.kind),
            Some(SlotKind::SampledTexture)
        );
    }
    Ok(())
}

#[test]
fn transitions_round_trip_through_the_current_state() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let (target, _) = color_target(harness.device.as_ref(), "rt", 4, 4, Format::Rgba8Unorm)?;
        assert_eq!(target.current_state(), ResourceState::Undefined);

        // --- ACT ---
        let first = target.transition(ResourceState::RenderTarget)?;
        let second = target.transition(ResourceState::CopySrc)?;
        let rejected = target.transition(ResourceState::ShaderWrite);

        // --- ASSERT ---
        assert_eq!(first.before(), ResourceState::Undefined);
        assert_eq!(first.after(), ResourceState::RenderTarget);
        assert_eq!(second.before(), ResourceState::RenderTarget);
        assert_eq!(target.current_state(), ResourceState::CopySrc);
        assert!(matches!(
            rejected,
            Err(RhiError::Validation(ValidationError::StateNotAllowed { .. }))
        ));
        assert_eq!(target.current_state(), ResourceState::CopySrc);
        assert!(target.transition(ResourceState::Undefined).is_err());
    }
    Ok(())
}

#[test]
fn initial_data_starts_in_copy_dst_and_reads_back() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        let data: Vec<u8> = (0..16).collect();
        let buffer = harness.device.create_resource(
            &ResourceDescriptor::buffer(
                Some("seeded"),
                16,
                ResourceUsage::COPY_DST | ResourceUsage::COPY_SRC,
            )
            .with_initial_data(data.clone()),
        )?;

        assert_eq!(buffer.current_state(), ResourceState::CopyDst);
        assert_eq!(harness.device.read_resource(&buffer)?, data, "{}", harness.backend());
    }
    Ok(())
}

fn sampling_technique(device: &dyn strata_core::Device) -> anyhow::Result<Technique> {
    let layout = device.create_layout(&LayoutDescriptor {
        label: Some("one texture".into()),
        slots: vec![SlotDescriptor::new(
            0,
            SlotKind::SampledTexture,
            ShaderStageFlags::FRAGMENT,
        )],
    })?;
    let descriptor = TechniqueDescriptor {
        label: Some("sample".into()),
        stages: vec![
            program(ShaderStage::Vertex, StageInterface::default()),
            program(
                ShaderStage::Fragment,
                StageInterface {
                    slots: vec![SlotRequirement {
                        index: 0,
                        kind: SlotKind::SampledTexture,
                    }],
                    color_outputs: 1,
                    ..Default::default()
                },
            ),
        ],
        blend: BlendState {
            constant: LinearRgba::BLUE,
            ..Default::default()
        },
        color_formats: vec![Format::Rgba8Unorm],
        ..Default::default()
    };
    Ok(device.create_technique(&descriptor, &layout)?)
}

#[test]
fn a_pass_reading_its_own_target_is_a_feedback_loop() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let technique = sampling_technique(device)?;
        let usage = ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_READ;
        let texture = device.create_resource(&ResourceDescriptor::texture_2d(
            Some("loop"),
            8,
            8,
            Format::Rgba8Unorm,
            usage,
        ))?;
        let other = device.create_resource(&ResourceDescriptor::texture_2d(
            Some("source"),
            8,
            8,
            Format::Rgba8Unorm,
            usage,
        ))?;
        let targets = PassTargets::color(ColorTarget::loaded(View::whole(
            &texture,
            ViewKind::RenderTarget,
        )?));
        let descriptor = PassDescriptor::new(Some("feedback"), &technique);

        // --- ACT ---
        let looped = device.create_pass(
            &descriptor,
            &targets,
            &[PassInput::view(0, View::whole(&texture, ViewKind::ShaderResource)?)],
        );
        let separate = device.create_pass(
            &descriptor,
            &targets,
            &[PassInput::view(0, View::whole(&other, ViewKind::ShaderResource)?)],
        );

        // --- ASSERT ---
        match looped {
            Err(RhiError::Validation(ValidationError::FeedbackLoop(id))) => {
                assert_eq!(id, texture.id())
            }
            other => panic!("{}: expected a feedback loop, got {:?}", harness.backend(), other),
        }
        assert!(separate.is_ok(), "{}: {:?}", harness.backend(), separate.err());
    }
    Ok(())
}

#[test]
fn a_later_pass_draws_while_sampling_the_cleared_target() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let cleared = device.create_resource(&ResourceDescriptor::texture_2d(
            Some("cleared"),
            256,
            256,
            Format::Rgba8Unorm,
            ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_READ | ResourceUsage::COPY_SRC,
        ))?;
        let clear_technique = device.create_technique(
            &constant_technique("clear", Format::Rgba8Unorm, LinearRgba::BLACK),
            &empty_layout(device)?,
        )?;
        let clear_pass = clearing_pass(
            device,
            "clear",
            &clear_technique,
            View::whole(&cleared, ViewKind::RenderTarget)?,
            LinearRgba::RED,
        )?;
        let (output, output_view) = color_target(device, "output", 256, 256, Format::Rgba8Unorm)?;
        let sample_pass = device.create_pass(
            &PassDescriptor::new(Some("sample"), &sampling_technique(device)?),
            &PassTargets::color(ColorTarget::loaded(output_view)),
            &[PassInput::view(0, View::whole(&cleared, ViewKind::ShaderResource)?)],
        )?;

        // --- ACT ---
        let mut first = device.create_batch(&clear_pass)?;
        first.insert(cleared.transition(ResourceState::RenderTarget)?)?;
        first.bind(&clear_pass)?;
        first.finish()?;
        let token = device.submit(first)?;
        assert_eq!(token.wait(WAIT)?, WaitStatus::Signaled);

        let mut second = device.create_batch(&sample_pass)?;
        second.insert(cleared.transition(ResourceState::ShaderRead)?)?;
        second.insert(output.transition(ResourceState::RenderTarget)?)?;
        second.draw(0..3, 0..1)?;
        second.finish()?;
        device.submit(second)?.wait(WAIT)?;

        // --- ASSERT ---
        let red = texel::encode(Format::Rgba8Unorm, LinearRgba::RED.to_array());
        assert!(
            all_texels_are(&device.read_resource(&cleared)?, &red),
            "{}",
            harness.backend()
        );
        let blue = texel::encode(Format::Rgba8Unorm, LinearRgba::BLUE.to_array());
        assert!(
            all_texels_are(&device.read_resource(&output)?, &blue),
            "{}",
            harness.backend()
        );
        assert_eq!(cleared.current_state(), ResourceState::ShaderRead);
        assert!(
            harness.validation_messages().is_empty(),
            "{:?}",
            harness.validation_messages()
        );
    }
    Ok(())
}

#[test]
fn appending_after_finish_fails() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let (target, view) = color_target(device, "rt", 4, 4, Format::Rgba8Unorm)?;
        let technique = device.create_technique(
            &constant_technique("draw", Format::Rgba8Unorm, LinearRgba::WHITE),
            &empty_layout(device)?,
        )?;
        let pass = clearing_pass(device, "draw", &technique, view, LinearRgba::BLACK)?;
        let mut batch = device.create_batch(&pass)?;
        batch.insert(target.transition(ResourceState::RenderTarget)?)?;
        batch.draw(0..3, 0..1)?;
        batch.finish()?;
        let recorded = batch.len();

        // --- ACT ---
        let draw = batch.draw(0..3, 0..1);
        let barrier = batch.insert(target.observe());
        let finish = batch.finish();

        // --- ASSERT ---
        assert!(matches!(draw, Err(RhiError::AppendAfterFinish)));
        assert!(matches!(barrier, Err(RhiError::AppendAfterFinish)));
        assert!(matches!(finish, Err(RhiError::AppendAfterFinish)));
        assert_eq!(batch.len(), recorded);
        device.submit(batch)?.wait(WAIT)?;
    }
    Ok(())
}

#[test]
fn commands_need_states_established_in_the_batch() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let (target, view) = color_target(device, "rt", 4, 4, Format::Rgba8Unorm)?;
        let technique = device.create_technique(
            &constant_technique("draw", Format::Rgba8Unorm, LinearRgba::WHITE),
            &empty_layout(device)?,
        )?;
        let pass = clearing_pass(device, "draw", &technique, view, LinearRgba::BLACK)?;
        let mut batch = device.create_batch(&pass)?;

        // --- ACT ---
        let unestablished = batch.bind(&pass);
        batch.insert(target.transition(ResourceState::CopySrc)?)?;
        let following = batch.insert(target.transition(ResourceState::RenderTarget)?);

        // --- ASSERT ---
        match unestablished {
            Err(RhiError::StateConflict(conflict)) => {
                assert_eq!(conflict.resource, target.id());
                assert_eq!(conflict.required, ResourceState::RenderTarget);
                assert_eq!(conflict.established, None);
            }
            other => panic!("{}: expected a state conflict, got {:?}", harness.backend(), other),
        }
        assert!(
            following.is_ok(),
            "the barrier starts from the established CopySrc state"
        );
        // Recorded elsewhere: its `before` is the CopySrc state this batch already left.
        let _skipped = target.transition(ResourceState::CopySrc)?;
        let stale = batch.insert(target.transition(ResourceState::RenderTarget)?);
        assert!(matches!(
            stale,
            Err(RhiError::StateConflict(StateConflictError {
                required: ResourceState::CopySrc,
                established: Some(ResourceState::RenderTarget),
                ..
            }))
        ));
    }
    Ok(())
}

#[test]
fn create_device_opens_the_requested_backend() -> anyhow::Result<()> {
    init_logging();
    let gpu = SoftwareGpu::new(SoftwareConfig::default());
    for backend in [BackendType::D3D11, BackendType::Vulkan] {
        let device = create_device(&DeviceDescriptor::new(backend).with_label("selected"), &gpu)?;

        assert_eq!(device.backend(), backend);
        device.shutdown()?;
        assert!(matches!(
            device.create_layout(&LayoutDescriptor::default()),
            Err(RhiError::DeviceShutDown)
        ));
    }
    Ok(())
}
