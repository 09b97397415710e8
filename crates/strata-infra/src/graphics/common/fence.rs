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

use super::backend::NativeBackend;
use super::device::DeviceShared;
use std::sync::Weak;
use std::time::Duration;
use strata_core::renderer::SubmissionFence;
use strata_core::RhiError;

/// The completion source behind every token a device hands out.
///
/// Polling through the fence also releases the objects whose submissions it observes
/// as complete. The fence does not keep its device alive; once the device is dropped,
/// pending tokens report [`RhiError::DeviceShutDown`].
#[derive(Debug)]
pub struct DeviceFence<B: NativeBackend> {
    shared: Weak<DeviceShared<B>>,
}

impl<B: NativeBackend> DeviceFence<B> {
    pub(crate) fn new(shared: Weak<DeviceShared<B>>) -> Self {
        Self { shared }
    }
}

impl<B: NativeBackend> SubmissionFence for DeviceFence<B> {
    fn is_complete(&self, value: u64) -> Result<bool, RhiError> {
        let shared = self.shared.upgrade().ok_or(RhiError::DeviceShutDown)?;
        Ok(shared.refresh_completed()? >= value)
    }

    fn wait(&self, value: u64, timeout: Duration) -> Result<bool, RhiError> {
        let shared = self.shared.upgrade().ok_or(RhiError::DeviceShutDown)?;
        shared.wait_value(value, timeout)
    }
}
