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

//! Techniques with identical descriptions share one native pipeline.

mod common;

use common::*;
use strata_core::math::LinearRgba;
use strata_core::renderer::*;
use strata_core::Device;
use strata_infra::graphics::software::texel;

/// Draws `technique` over a fresh target and reads it back.
fn render(device: &dyn Device, technique: &Technique) -> anyhow::Result<Vec<u8>> {
    let (target, view) = color_target(device, "rt", 32, 32, Format::Rgba8Unorm)?;
    let pass = clearing_pass(device, "draw", technique, view, LinearRgba::BLACK)?;
    let mut batch = device.create_batch(&pass)?;
    batch.insert(target.transition(ResourceState::RenderTarget)?)?;
    batch.draw(0..3, 0..1)?;
    batch.finish()?;
    device.submit(batch)?.wait(WAIT)?;
    Ok(device.read_resource(&target)?)
}

#[test]
fn identical_descriptions_share_a_pipeline() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let constant = LinearRgba::new(0.2, 0.4, 0.6, 1.0);
        let layout = empty_layout(device)?;

        // --- ACT ---
        let first = device.create_technique(
            &constant_technique("first", Format::Rgba8Unorm, constant),
            &layout,
        )?;
        let second = device.create_technique(
            &constant_technique("second", Format::Rgba8Unorm, constant),
            &layout,
        )?;

        // --- ASSERT ---
        assert_ne!(first.id(), second.id());
        assert_eq!(first.fingerprint(), second.fingerprint());
        let stats = device.stats();
        assert_eq!(stats.techniques, 2, "{}", harness.backend());
        assert_eq!(stats.cached_pipelines, 1, "{}", harness.backend());

        let expected = texel::encode(Format::Rgba8Unorm, constant.to_array());
        let from_first = render(device, &first)?;
        let from_second = render(device, &second)?;
        assert!(all_texels_are(&from_first, &expected), "{}", harness.backend());
        assert_eq!(from_first, from_second);
    }
    Ok(())
}

#[test]
fn any_state_difference_builds_another_pipeline() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let constant = LinearRgba::rgb(1.0, 0.0, 1.0);
        let layout = empty_layout(device)?;
        let opaque = constant_technique("opaque", Format::Rgba8Unorm, constant);
        let mut blended = opaque.clone();
        blended.label = Some("blended".into());
        blended.blend.equation = Some(BlendEquation::ALPHA_BLENDING);

        // --- ACT ---
        let opaque = device.create_technique(&opaque, &layout)?;
        let blended = device.create_technique(&blended, &layout)?;
        let other_constant = device.create_technique(
            &constant_technique("blue", Format::Rgba8Unorm, LinearRgba::BLUE),
            &layout,
        )?;

        // --- ASSERT ---
        assert_ne!(opaque.fingerprint(), blended.fingerprint());
        assert_eq!(device.stats().cached_pipelines, 3, "{}", harness.backend());

        // An opaque constant blended over anything is the constant.
        let expected = texel::encode(Format::Rgba8Unorm, constant.to_array());
        assert!(all_texels_are(&render(device, &blended)?, &expected));
        let blue = texel::encode(Format::Rgba8Unorm, LinearRgba::BLUE.to_array());
        assert!(all_texels_are(&render(device, &other_constant)?, &blue));
    }
    Ok(())
}

#[test]
fn a_technique_that_does_not_fit_its_layout_is_rejected() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let layout = empty_layout(device)?;
        let mut descriptor = constant_technique("needs a slot", Format::Rgba8Unorm, LinearRgba::WHITE);
        descriptor.stages[1].interface.slots.push(SlotRequirement {
            index: 0,
            kind: SlotKind::UniformBuffer,
        });

        // --- ACT ---
        let result = device.create_technique(&descriptor, &layout);

        // --- ASSERT ---
        assert!(
            matches!(result, Err(RhiError::LayoutMismatch(_))),
            "{}: {:?}",
            harness.backend(),
            result
        );
        assert_eq!(device.stats().cached_pipelines, 0);
    }
    Ok(())
}
