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

//! A software GPU implementing both driver seams on CPU memory.
//!
//! Shaders never run: clears, copies and updates change memory exactly, and a draw
//! covers its targets with the blend constant. That is enough to observe load
//! operations, ordering, readback and state tracking on either backend.

mod d3d11;
mod executor;
mod gpu;
pub mod texel;
mod vulkan;

pub use self::d3d11::SoftwareD3D11;
pub use self::gpu::{CompletionMode, SoftwareConfig, SoftwareGpu};
pub use self::vulkan::SoftwareVulkan;

use super::{D3D11Driver, DriverProvider, VulkanDriver};
use std::sync::Arc;
use strata_core::RhiError;

impl DriverProvider for SoftwareGpu {
    fn d3d11(&self) -> Result<Arc<dyn D3D11Driver>, RhiError> {
        Ok(Arc::new(SoftwareD3D11::new(self.clone())))
    }

    fn vulkan(&self) -> Result<Arc<dyn VulkanDriver>, RhiError> {
        Ok(Arc::new(SoftwareVulkan::new(self.clone())))
    }
}
