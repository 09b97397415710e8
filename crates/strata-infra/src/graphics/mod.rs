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

//! Device construction and the two backends.

pub mod common;
pub mod d3d11;
pub mod software;
pub mod vulkan;

pub use self::common::{DriverError, NativeBackend, RhiDevice};
pub use self::d3d11::{D11Device, D3D11Backend, D3D11Driver};
pub use self::vulkan::{VlkDevice, VulkanBackend, VulkanDriver};

use std::sync::Arc;
use strata_core::renderer::{BackendType, DeviceDescriptor};
use strata_core::{Device, RhiError};

/// A source of native drivers, one per backend.
///
/// Applications hand the real D3D11 or Vulkan loader here; tests hand a
/// [`software::SoftwareGpu`].
pub trait DriverProvider {
    /// Opens a D3D11 style driver.
    fn d3d11(&self) -> Result<Arc<dyn D3D11Driver>, RhiError>;

    /// Opens a Vulkan style driver.
    fn vulkan(&self) -> Result<Arc<dyn VulkanDriver>, RhiError>;
}

/// Creates a device for the backend named by `descriptor`.
///
/// This is the only place where a backend is selected; the returned device never mixes
/// backends.
/// ## Errors
/// * [`RhiError::Backend`] - If the provider cannot open the requested driver.
pub fn create_device(
    descriptor: &DeviceDescriptor,
    provider: &dyn DriverProvider,
) -> Result<Arc<dyn Device>, RhiError> {
    let device: Arc<dyn Device> = match descriptor.backend {
        BackendType::D3D11 => Arc::new(D11Device::new(descriptor, provider.d3d11()?)?),
        BackendType::Vulkan => Arc::new(VlkDevice::new(descriptor, provider.vulkan()?)?),
    };
    Ok(device)
}
