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

//! Unrecoverable and recoverable GPU failures.

mod common;

use common::*;
use strata_core::renderer::*;
use strata_core::RhiError;
use strata_infra::graphics::software::SoftwareConfig;

fn update_batch(harness: &Harness) -> anyhow::Result<Batch> {
    let buffer = harness.device.create_resource(&ResourceDescriptor::buffer(
        Some("victim"),
        32,
        ResourceUsage::COPY_DST | ResourceUsage::COPY_SRC,
    ))?;
    let mut batch = harness.device.create_transfer_batch()?;
    batch.insert(buffer.transition(ResourceState::CopyDst)?)?;
    batch.update_buffer(&buffer, 0, vec![5u8; 32])?;
    batch.finish()?;
    Ok(batch)
}

#[test]
fn a_hang_during_submission_loses_the_device() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        // --- ARRANGE ---
        let batch = update_batch(&harness)?;
        harness.gpu.fault_next_submission();

        // --- ACT ---
        let token = harness.device.submit(batch)?;

        // --- ASSERT ---
        assert_eq!(token.poll(), Err(RhiError::DeviceLost), "{}", harness.backend());
        assert_eq!(token.wait(WAIT), Err(RhiError::DeviceLost));
        assert!(harness.device.is_lost());
        assert!(matches!(
            harness.device.create_transfer_batch(),
            Err(RhiError::DeviceLost)
        ));
        assert!(matches!(
            harness.device.create_layout(&LayoutDescriptor::default()),
            Err(RhiError::DeviceLost)
        ));
        assert_eq!(harness.device.maintain(), Err(RhiError::DeviceLost));
    }
    Ok(())
}

#[test]
fn waiting_on_a_token_reports_a_loss_that_happened_in_flight() -> anyhow::Result<()> {
    for harness in Harness::each_with(SoftwareConfig::manual)? {
        // --- ARRANGE ---
        let token = harness.device.submit(update_batch(&harness)?)?;
        assert!(!harness.device.is_lost());

        // --- ACT ---
        harness.gpu.inject_device_lost();
        let waited = token.wait(WAIT);
        let polled = token.poll();

        // --- ASSERT ---
        assert_eq!(waited, Err(RhiError::DeviceLost), "{}", harness.backend());
        assert_eq!(polled, Err(RhiError::DeviceLost));
        assert!(harness.device.is_lost());
        assert_eq!(
            harness.device.wait_idle(WAIT),
            Err(RhiError::DeviceLost)
        );
    }
    Ok(())
}

#[test]
fn stats_stay_readable_after_the_device_is_lost() -> anyhow::Result<()> {
    for harness in Harness::each()? {
        let batch = update_batch(&harness)?;
        let submissions = harness.device.stats().submissions;
        harness.gpu.fault_next_submission();
        let _token = harness.device.submit(batch)?;

        let stats = harness.device.stats();

        assert_eq!(stats.submissions, submissions + 1, "{}", harness.backend());
        assert_eq!(stats.resources, 1);
    }
    Ok(())
}

#[test]
fn running_out_of_memory_is_recoverable() -> anyhow::Result<()> {
    let config = || SoftwareConfig {
        memory_budget: 1 << 20,
        ..SoftwareConfig::default()
    };
    for harness in Harness::each_with(config)? {
        // --- ARRANGE ---
        let buffer = |label: &str, size: u64| {
            harness.device.create_resource(&ResourceDescriptor::buffer(
                Some(label),
                size,
                ResourceUsage::COPY_SRC,
            ))
        };
        let half = buffer("half", 1 << 19)?;

        // --- ACT ---
        let too_big = buffer("whole", 1 << 20);
        harness.device.destroy(half.id().into())?;
        harness.device.maintain()?;
        let retried = buffer("whole", 1 << 20);

        // --- ASSERT ---
        assert!(
            matches!(too_big, Err(RhiError::OutOfMemory { requested }) if requested >= 1 << 20),
            "{}: {:?}",
            harness.backend(),
            too_big
        );
        assert!(!harness.device.is_lost());
        assert!(retried.is_ok(), "{}: {:?}", harness.backend(), retried.err());
        assert_eq!(harness.device.stats().resources, 1);
    }
    Ok(())
}
