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

//! The D3D11 style backend.

mod backend;
pub mod context;
pub mod conversions;
pub mod driver;
mod state_objects;

pub use self::backend::D3D11Backend;
pub use self::context::{D3D11Call, D3D11CommandList};
pub use self::driver::{D3D11Driver, D3D11Handle};

use super::common::RhiDevice;
use std::sync::Arc;
use strata_core::renderer::{BackendType, DeviceDescriptor};
use strata_core::RhiError;

/// A device translating the Strata model to D3D11.
pub type D11Device = RhiDevice<D3D11Backend>;

impl RhiDevice<D3D11Backend> {
    /// Opens a D3D11 device on `driver`.
    ///
    /// `descriptor.debug_validation` enables logging of every translated call list.
    pub fn new(
        descriptor: &DeviceDescriptor,
        driver: Arc<dyn D3D11Driver>,
    ) -> Result<Self, RhiError> {
        if descriptor.backend != BackendType::D3D11 {
            return Err(RhiError::Backend(format!(
                "a D3D11 device cannot be opened for the {} backend",
                descriptor.backend
            )));
        }
        let backend = D3D11Backend::new(driver, descriptor.debug_validation);
        Ok(Self::with_backend(descriptor, backend))
    }
}
