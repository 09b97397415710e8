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

//! Destroyed entities stay alive natively until the GPU is done with them.

mod common;

use common::*;
use std::thread;
use std::time::Duration;
use strata_core::renderer::*;
use strata_core::RhiError;
use strata_infra::graphics::software::SoftwareConfig;

fn updated_buffer(harness: &Harness) -> anyhow::Result<(Resource, CompletionToken)> {
    let buffer = harness.device.create_resource(&ResourceDescriptor::buffer(
        Some("in flight"),
        64,
        ResourceUsage::COPY_DST | ResourceUsage::COPY_SRC,
    ))?;
    let mut batch = harness.device.create_transfer_batch()?;
    batch.insert(buffer.transition(ResourceState::CopyDst)?)?;
    batch.update_buffer(&buffer, 0, vec![0xABu8; 64])?;
    batch.finish()?;
    let token = harness.device.submit(batch)?;
    Ok((buffer, token))
}

#[test]
fn a_resource_in_flight_is_released_after_its_batch_completes() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        // --- ARRANGE ---
        let (buffer, token) = updated_buffer(&harness)?;
        assert_eq!(token.poll()?, PollStatus::Pending);
        let live_before = harness.live_native_objects();

        // --- ACT ---
        harness.device.destroy(buffer.id().into())?;
        let released_early = harness.device.maintain()?;
        let stats_in_flight = harness.device.stats();
        let live_in_flight = harness.live_native_objects();

        harness.gpu.complete_all();
        let released = harness.device.maintain()?;

        // --- ASSERT ---
        assert_eq!(released_early, 0, "{}", harness.backend());
        assert!(buffer.is_released());
        assert_eq!(stats_in_flight.resources, 0);
        assert!(stats_in_flight.pending_releases >= 1);
        assert_eq!(live_in_flight, live_before);

        assert!(released >= 1, "{}", harness.backend());
        assert_eq!(harness.device.stats().pending_releases, 0);
        assert!(harness.live_native_objects() < live_before);
        assert_eq!(token.poll()?, PollStatus::Signaled);
    }
    Ok(())
}

#[test]
fn an_unused_resource_is_released_on_the_next_maintain() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        let idle = harness.device.create_resource(&ResourceDescriptor::buffer(
            Some("idle"),
            16,
            ResourceUsage::COPY_SRC,
        ))?;
        let live_before = harness.live_native_objects();

        harness.device.destroy(idle.id().into())?;
        let released = harness.device.maintain()?;

        assert_eq!(released, 1, "{}", harness.backend());
        assert!(harness.live_native_objects() < live_before);
    }
    Ok(())
}

#[test]
fn destroying_twice_reports_not_found() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let (buffer, token) = updated_buffer(&harness)?;
        token.wait(WAIT)?;
        let entity: Entity = buffer.id().into();
        harness.device.destroy(entity)?;

        // --- ACT ---
        let second = harness.device.destroy(entity);
        let read = harness.device.read_resource(&buffer);
        let transition = buffer.transition(ResourceState::CopySrc);

        // --- ASSERT ---
        assert_eq!(second, Err(RhiError::NotFound(entity)));
        assert_eq!(read, Err(RhiError::NotFound(entity)));
        assert!(matches!(
            transition,
            Err(RhiError::Validation(ValidationError::ReleasedResource(_)))
        ));
    }
    Ok(())
}

#[test]
fn a_batch_naming_a_destroyed_entity_is_rejected() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        let buffer = harness.device.create_resource(&ResourceDescriptor::buffer(
            Some("doomed"),
            16,
            ResourceUsage::COPY_DST,
        ))?;
        let mut batch = harness.device.create_transfer_batch()?;
        batch.insert(buffer.transition(ResourceState::CopyDst)?)?;
        batch.update_buffer(&buffer, 0, vec![1u8; 16])?;
        batch.finish()?;

        harness.device.destroy(buffer.id().into())?;

        assert_eq!(
            harness.device.submit(batch).err(),
            Some(RhiError::NotFound(buffer.id().into())),
            "{}",
            harness.backend()
        );
    }
    Ok(())
}

#[test]
fn waiting_on_unfinished_work_times_out_until_the_queue_advances() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        // --- ARRANGE ---
        let (_buffer, token) = updated_buffer(&harness)?;

        // --- ACT ---
        let early = token.wait(Duration::from_millis(10))?;
        let idle_early = harness.device.wait_idle(Duration::from_millis(10))?;
        harness.gpu.complete_all();
        let late = token.wait(WAIT)?;

        // --- ASSERT ---
        assert_eq!(early, WaitStatus::TimedOut, "{}", harness.backend());
        assert_eq!(idle_early, WaitStatus::TimedOut);
        assert_eq!(late, WaitStatus::Signaled);
        assert_eq!(harness.gpu.pending(), 0);
        assert_eq!(harness.device.stats().completed_submission, token.value());
    }
    Ok(())
}

#[test]
fn destroying_a_technique_keeps_its_shared_pipeline_for_the_twin() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let device = harness.device.as_ref();
        let layout = empty_layout(device)?;
        let descriptor = constant_technique(
            "twin",
            Format::Rgba8Unorm,
            strata_core::math::LinearRgba::WHITE,
        );
        let first = device.create_technique(&descriptor, &layout)?;
        let second = device.create_technique(&descriptor, &layout)?;

        // --- ACT ---
        device.destroy(first.id().into())?;
        device.maintain()?;

        // --- ASSERT ---
        assert_eq!(device.stats().cached_pipelines, 1, "{}", harness.backend());
        device.destroy(second.id().into())?;
        device.maintain()?;
        assert_eq!(device.stats().cached_pipelines, 0);
    }
    Ok(())
}

#[test]
fn dropping_the_device_waits_for_the_gpu_before_releasing() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        // --- ARRANGE ---
        let (buffer, _token) = updated_buffer(&harness)?;
        let backend = harness.backend();
        let Harness { gpu, device, .. } = harness;
        let completer = {
            let gpu = gpu.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                gpu.complete_all();
            })
        };

        // --- ACT ---
        drop(device);
        completer.join().expect("the completing thread panicked");

        // --- ASSERT ---
        assert_eq!(gpu.pending(), 0, "{}", backend);
        assert!(!gpu.is_lost(), "{}", backend);
        assert_eq!(gpu.allocated_bytes(), 0, "{}", backend);
        assert!(buffer.is_released());
    }
    Ok(())
}

#[test]
fn shutdown_keeps_everything_while_work_is_in_flight() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        // --- ARRANGE ---
        let (buffer, token) = updated_buffer(&harness)?;
        let live_before = harness.live_native_objects();

        // --- ACT ---
        let refused = harness.device.shutdown();
        let live_after_refusal = harness.live_native_objects();
        harness.gpu.complete_all();
        let signaled = token.wait(WAIT)?;
        let accepted = harness.device.shutdown();

        // --- ASSERT ---
        assert!(
            matches!(refused, Err(RhiError::SubmissionsPending { .. })),
            "{}: {:?}",
            harness.backend(),
            refused
        );
        assert_eq!(live_after_refusal, live_before);
        assert!(!harness.gpu.is_lost(), "{}", harness.backend());
        assert_eq!(signaled, WaitStatus::Signaled);
        assert_eq!(accepted, Ok(()));
        assert!(buffer.is_released());
        assert_eq!(harness.gpu.allocated_bytes(), 0);
    }
    Ok(())
}
