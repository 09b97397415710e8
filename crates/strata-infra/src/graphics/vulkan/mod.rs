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

//! The Vulkan style backend.

mod backend;
pub mod command;
pub mod conversions;
mod descriptor;
pub mod driver;
mod memory;

pub use self::backend::VulkanBackend;
pub use self::command::{VkCommand, VkCommandBuffer};
pub use self::driver::{VkHandle, VulkanDriver};

use super::common::RhiDevice;
use std::sync::Arc;
use strata_core::renderer::{BackendType, DeviceDescriptor};
use strata_core::RhiError;

/// A device translating the Strata model to Vulkan.
pub type VlkDevice = RhiDevice<VulkanBackend>;

impl RhiDevice<VulkanBackend> {
    /// Opens a Vulkan device on `driver`.
    ///
    /// `descriptor.debug_validation` enables reporting of validation messages after
    /// every submission.
    pub fn new(
        descriptor: &DeviceDescriptor,
        driver: Arc<dyn VulkanDriver>,
    ) -> Result<Self, RhiError> {
        if descriptor.backend != BackendType::Vulkan {
            return Err(RhiError::Backend(format!(
                "a Vulkan device cannot be opened for the {} backend",
                descriptor.backend
            )));
        }
        let backend = VulkanBackend::new(driver, descriptor.debug_validation);
        Ok(Self::with_backend(descriptor, backend))
    }
}
